use ndarray::ArrayD;
use serde::Serialize;

use crate::Result;

pub trait Model {
    /// Returns the amount of parameters in the model, trainable or not.
    fn size(&self) -> usize;

    /// Computes the output of the model for a batch.
    ///
    /// # Arguments
    /// * `x` - The input batch.
    /// * `training` - Whether layers with a training behaviour (batch normalization) should use it.
    fn forward(&mut self, x: ArrayD<f32>, training: bool) -> Result<ArrayD<f32>>;

    /// Backpropagates the gradient of the loss with respect to the output of the last
    /// `forward` call, storing the gradients of every trainable weight.
    ///
    /// # Returns
    /// The gradient with respect to the model's input.
    fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// Whether the output of the model is a softmax over its last axis.
    fn ends_in_softmax(&self) -> bool;

    /// Like `backward`, but `d` is the gradient with respect to the logits fed to the final
    /// softmax, which is skipped.
    ///
    /// # Errors
    /// If the model does not end in a softmax.
    fn backward_from_logits(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// Consumes the stored gradients, handing each one to `update` together with the
    /// weight it belongs to. `update` also gets the position of the weight in the whole
    /// model, so that per weight optimizer state can be kept by the caller.
    ///
    /// Constraints are applied to each weight right after it is updated.
    fn apply_gradients<F>(&mut self, update: F) -> Result<()>
    where
        F: FnMut(usize, &[f32], &mut [f32]) -> Result<()>;

    /// Describes every layer for a given input shape.
    fn summary(&self, input_shape: &[usize]) -> Result<Vec<LayerSummary>>;
}

/// The description of a layer, as written to the graph of a training log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSummary {
    pub name: String,
    pub kind: &'static str,
    pub output_shape: Vec<usize>,
    pub trainable: bool,
    pub weights: Vec<WeightSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightSummary {
    pub name: &'static str,
    pub shape: Vec<usize>,
    pub trainable: bool,
}
