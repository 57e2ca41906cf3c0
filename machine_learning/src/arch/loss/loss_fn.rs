use ndarray::{Array2, ArrayView2};

use crate::Result;

/// A loss over a batch of predictions and their integer labels.
pub trait LossFn {
    /// The mean loss of the batch.
    fn loss(&self, y_pred: ArrayView2<f32>, labels: &[usize]) -> Result<f32>;

    /// The gradient of `loss` with respect to `y_pred`.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, labels: &[usize]) -> Result<Array2<f32>>;

    /// The gradient of `loss` with respect to the logits, when `y_pred` is their softmax.
    ///
    /// Returns `None` for losses without a closed form through the softmax, in which case
    /// `loss_prime` is backpropagated through it instead.
    fn softmax_loss_prime(
        &self,
        _y_pred: ArrayView2<f32>,
        _labels: &[usize],
    ) -> Result<Option<Array2<f32>>> {
        Ok(None)
    }
}
