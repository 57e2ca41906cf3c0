use ndarray::{linalg, prelude::*};
use rand::Rng;

use super::QuantOptions;
use crate::{
    MlErr, Result,
    arch::{Weight, quantizers::quantize},
    initialization::Initializer,
};

/// A fully connected layer without bias whose inputs and kernel can be quantized.
#[derive(Debug, Clone)]
pub struct QuantDense {
    dim: (usize, usize),
    options: QuantOptions,
    weights: Vec<Weight>,
    grads: Vec<Option<ArrayD<f32>>>,

    // Forward metadata
    x: Option<Array2<f32>>,
    xq: Array2<f32>,
    kernel_q: Array2<f32>,
}

impl QuantDense {
    /// Creates a new `QuantDense` with a Glorot uniform initialized kernel.
    ///
    /// # Arguments
    /// * `dim` - The input and output sizes.
    /// * `options` - Quantizers, constraint and trainability.
    /// * `rng` - A random number generator for the kernel initialization.
    pub fn new<R: Rng>(dim: (usize, usize), options: QuantOptions, rng: &mut R) -> Result<Self> {
        let kernel = Initializer::GlorotUniform.sample(&[dim.0, dim.1], rng)?;
        let kernel =
            Weight::new("kernel", kernel, options.trainable).with_constraint(options.kernel_constraint);
        let zeros = Array2::zeros((0, 0));

        Ok(Self {
            dim,
            options,
            weights: vec![kernel],
            grads: vec![None],
            x: None,
            xq: zeros.clone(),
            kernel_q: zeros,
        })
    }

    pub fn options(&self) -> &QuantOptions {
        &self.options
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
        match *input {
            [n, m] if m == self.dim.0 => Ok(vec![n, self.dim.1]),
            _ => Err(MlErr::ShapeMismatch {
                what: "quant_dense input".into(),
                got: input.to_vec(),
                expected: vec![0, self.dim.0],
            }),
        }
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        self.output_shape(x.shape())?;
        let x = x.into_dimensionality::<Ix2>()?;

        self.xq = quantize(self.options.input_quantizer.as_ref(), x.view().into_dyn())
            .into_dimensionality::<Ix2>()?;
        self.kernel_q = quantize(
            self.options.kernel_quantizer.as_ref(),
            self.weights[0].value().view(),
        )
        .into_dimensionality::<Ix2>()?;

        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &self.xq, &self.kernel_q, 0.0, &mut z);

        self.x = self.options.input_quantizer.map(|_| x);
        Ok(z.into_dyn())
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        if self.xq.nrows() != d.shape()[0] {
            return Err(MlErr::MissingForwardPass {
                layer: "quant_dense".into(),
            });
        }

        let d = d.into_dimensionality::<Ix2>()?;

        if self.options.trainable {
            let mut dk = Array2::zeros(self.dim);
            linalg::general_mat_mul(1.0, &self.xq.t(), &d, 0.0, &mut dk);

            let mut dk = dk.into_dyn();
            if let Some(q) = &self.options.kernel_quantizer {
                q.backprop(&mut dk, self.weights[0].value().view());
            }

            self.grads[0] = Some(dk);
        }

        let mut dx = Array2::zeros((d.nrows(), self.dim.0));
        linalg::general_mat_mul(1.0, &d, &self.kernel_q.t(), 0.0, &mut dx);

        let mut dx = dx.into_dyn();
        if let (Some(q), Some(x)) = (&self.options.input_quantizer, self.x.take()) {
            q.backprop(&mut dx, x.view().into_dyn());
        }

        Ok(dx)
    }
}
