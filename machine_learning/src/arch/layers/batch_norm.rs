use ndarray::prelude::*;

use crate::{MlErr, Result, arch::Weight};

const BETA: usize = 0;
const MOVING_MEAN: usize = 1;
const MOVING_VARIANCE: usize = 2;

/// Batch normalization over the last axis, without a learned scale.
///
/// Holds `[beta, moving_mean, moving_variance]`; only `beta` is trainable. In training mode
/// the batch statistics are used and the moving ones are updated, otherwise the moving
/// statistics are used. Inputs are always normalized with the biased batch variance, while
/// the moving variance of 4D inputs accumulates the unbiased one. A non-trainable layer always behaves as in inference mode.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    channels: usize,
    momentum: f32,
    epsilon: f32,
    trainable: bool,
    weights: Vec<Weight>,
    grads: Vec<Option<ArrayD<f32>>>,

    // Forward metadata
    input_shape: Vec<usize>,
    x_hat: Array2<f32>,
    inv_std: Array1<f32>,
    batch_stats: bool,
}

impl BatchNorm {
    /// Creates a new `BatchNorm` with the usual momentum (0.99) and epsilon (1e-3).
    ///
    /// # Arguments
    /// * `channels` - The size of the normalized (last) axis.
    /// * `trainable` - Whether `beta` is trained and batch statistics are used while training.
    pub fn new(channels: usize, trainable: bool) -> Self {
        Self::with_params(channels, 0.99, 1e-3, trainable)
    }

    pub fn with_params(channels: usize, momentum: f32, epsilon: f32, trainable: bool) -> Self {
        let weights = vec![
            Weight::new("beta", ArrayD::zeros(IxDyn(&[channels])), trainable),
            Weight::new("moving_mean", ArrayD::zeros(IxDyn(&[channels])), false),
            Weight::new("moving_variance", ArrayD::ones(IxDyn(&[channels])), false),
        ];

        Self {
            channels,
            momentum,
            epsilon,
            trainable,
            weights,
            grads: vec![None; 3],
            input_shape: vec![],
            x_hat: Array2::zeros((0, channels)),
            inv_std: Array1::zeros(channels),
            batch_stats: false,
        }
    }

    pub fn trainable(&self) -> bool {
        self.trainable
    }

    pub fn weights(&self) -> &[Weight] {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut [Weight] {
        &mut self.weights
    }

    pub(crate) fn params_and_grads(&mut self) -> (&mut [Weight], &mut [Option<ArrayD<f32>>]) {
        (&mut self.weights, &mut self.grads)
    }

    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        match input.last() {
            Some(&c) if c == self.channels && input.len() >= 2 => Ok(input.to_vec()),
            _ => Err(MlErr::ShapeMismatch {
                what: "batch_normalization input".into(),
                got: input.to_vec(),
                expected: vec![0, self.channels],
            }),
        }
    }

    pub fn forward(&mut self, x: ArrayD<f32>, training: bool) -> Result<ArrayD<f32>> {
        self.output_shape(x.shape())?;
        let rows = x.len() / self.channels;
        let x2 = x.to_shape((rows, self.channels))?;

        self.batch_stats = training && self.trainable;

        let (mean, var) = if self.batch_stats {
            let mean = x2.mean_axis(Axis(0)).ok_or(MlErr::EmptyDataset)?;
            let var = (&x2 - &mean)
                .mapv(|v| v * v)
                .mean_axis(Axis(0))
                .ok_or(MlErr::EmptyDataset)?;

            // Image batches follow the fused kernel, which tracks the unbiased variance
            let moving_var = match x.ndim() {
                4 if rows > 1 => &var * (rows as f32 / (rows - 1) as f32),
                _ => var.clone(),
            };

            self.update_moving(MOVING_MEAN, &mean)?;
            self.update_moving(MOVING_VARIANCE, &moving_var)?;
            (mean, var)
        } else {
            (self.param(MOVING_MEAN)?, self.param(MOVING_VARIANCE)?)
        };

        let eps = self.epsilon;
        self.inv_std = var.mapv(|v| 1. / (v + eps).sqrt());
        self.x_hat = (&x2 - &mean) * &self.inv_std;
        self.input_shape = x.shape().to_vec();

        let beta = self.param(BETA)?;
        let y = &self.x_hat + &beta;

        Ok(y.into_shape_with_order(IxDyn(&self.input_shape))?)
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        if d.shape() != self.input_shape.as_slice() {
            return Err(MlErr::MissingForwardPass {
                layer: "batch_normalization".into(),
            });
        }

        let rows = self.x_hat.nrows();
        let d = d.to_shape((rows, self.channels))?;
        let sum_d = d.sum_axis(Axis(0));

        if self.trainable {
            self.grads[BETA] = Some(sum_d.clone().into_dyn());
        }

        let dx = if self.batch_stats {
            let m = rows as f32;
            let sum_d_xhat = (&d * &self.x_hat).sum_axis(Axis(0));
            ((&d * m) - &sum_d - &self.x_hat * &sum_d_xhat) * &self.inv_std / m
        } else {
            &d * &self.inv_std
        };

        Ok(dx.into_shape_with_order(IxDyn(&self.input_shape))?)
    }

    fn param(&self, idx: usize) -> Result<Array1<f32>> {
        Ok(self.weights[idx]
            .value()
            .clone()
            .into_dimensionality::<Ix1>()?)
    }

    fn update_moving(&mut self, idx: usize, batch: &Array1<f32>) -> Result<()> {
        let momentum = self.momentum;
        let moving = self.weights[idx].value_mut();

        if moving.len() != batch.len() {
            return Err(MlErr::SizeMismatch {
                what: "batch_normalization statistics",
                got: batch.len(),
                expected: moving.len(),
            });
        }

        moving
            .iter_mut()
            .zip(batch)
            .for_each(|(m, &b)| *m = *m * momentum + b * (1. - momentum));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> ArrayD<f32> {
        array![[1., 10.], [3., 20.], [5., 30.], [7., 40.]].into_dyn()
    }

    #[test]
    fn training_normalizes_with_batch_statistics() {
        let mut bn = BatchNorm::with_params(2, 0.99, 0.0, true);
        let y = bn.forward(batch(), true).unwrap();

        for c in 0..2 {
            let col = y.index_axis(Axis(1), c);
            let mean = col.mean().unwrap();
            let var = col.mapv(|v| (v - mean).powi(2)).mean().unwrap();
            assert!(mean.abs() < 1e-6);
            assert!((var - 1.).abs() < 1e-5);
        }
    }

    #[test]
    fn moving_statistics_follow_momentum() {
        let mut bn = BatchNorm::new(2, true);
        bn.forward(batch(), true).unwrap();

        // batch mean = [4, 25], batch variance = [5, 125]
        let mean = bn.weights()[MOVING_MEAN].value();
        let var = bn.weights()[MOVING_VARIANCE].value();
        assert!((mean[[0]] - 0.04).abs() < 1e-6);
        assert!((mean[[1]] - 0.25).abs() < 1e-6);
        assert!((var[[0]] - (0.99 + 0.05)).abs() < 1e-5);
        assert!((var[[1]] - (0.99 + 1.25)).abs() < 1e-5);
    }

    #[test]
    fn image_batches_track_the_unbiased_variance() {
        let mut bn = BatchNorm::new(1, true);
        let x = Array::from_shape_vec((2, 1, 2, 1), vec![1., 3., 5., 7.])
            .unwrap()
            .into_dyn();
        bn.forward(x, true).unwrap();

        // biased variance = 5, unbiased over 4 rows = 20 / 3
        let var = bn.weights()[MOVING_VARIANCE].value();
        assert!((var[[0]] - (0.99 + 0.01 * 20. / 3.)).abs() < 1e-5);
    }

    #[test]
    fn inference_uses_moving_statistics_and_leaves_them_untouched() {
        let mut bn = BatchNorm::new(2, true);
        let x = batch();
        let y = bn.forward(x.clone(), false).unwrap();

        let expected = x.mapv(|v| v / (1f32 + 1e-3).sqrt());
        assert!(y.iter().zip(&expected).all(|(a, b)| (a - b).abs() < 1e-5));
        assert_eq!(bn.weights()[MOVING_MEAN].value().sum(), 0.);
    }

    #[test]
    fn frozen_layer_does_not_update_statistics_nor_beta() {
        let mut bn = BatchNorm::new(2, false);
        bn.forward(batch(), true).unwrap();
        bn.backward(ArrayD::ones(IxDyn(&[4, 2]))).unwrap();

        assert_eq!(bn.weights()[MOVING_MEAN].value().sum(), 0.);
        assert!(bn.grads.iter().all(Option::is_none));
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let x = batch();
        let upstream = array![[0.3, -1.], [2., 0.5], [-0.7, 0.1], [1.1, 0.9]].into_dyn();
        let loss = |x: ArrayD<f32>| {
            let mut bn = BatchNorm::with_params(2, 0.99, 1e-3, true);
            let y = bn.forward(x, true).unwrap();
            (&y * &upstream).sum()
        };

        let mut bn = BatchNorm::with_params(2, 0.99, 1e-3, true);
        bn.forward(x.clone(), true).unwrap();
        let dx = bn.backward(upstream.clone()).unwrap();

        let h = 1e-2;
        for idx in [[0usize, 0], [2, 1], [3, 0]] {
            let mut plus = x.clone();
            plus[&idx[..]] += h;
            let mut minus = x.clone();
            minus[&idx[..]] -= h;

            let numeric = (loss(plus) - loss(minus)) / (2. * h);
            assert!((numeric - dx[&idx[..]]).abs() < 1e-2, "{numeric} vs {}", dx[&idx[..]]);
        }

        let beta_grad = bn.grads[BETA].as_ref().unwrap();
        assert!((beta_grad[[0]] - 2.7).abs() < 1e-5);
        assert!((beta_grad[[1]] - 0.5).abs() < 1e-5);
    }
}
