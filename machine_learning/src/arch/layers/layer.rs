use ndarray::ArrayD;
use rand::Rng;

use super::{BatchNorm, Flatten, MaxPool2d, QuantConv2d, QuantDense, QuantOptions, Softmax};
use crate::{Result, arch::Weight};

/// A layer of a `Sequential` model.
#[derive(Debug, Clone)]
pub enum Layer {
    QuantConv2d(QuantConv2d),
    MaxPool2d(MaxPool2d),
    BatchNorm(BatchNorm),
    Flatten(Flatten),
    QuantDense(QuantDense),
    Softmax(Softmax),
}

impl Layer {
    pub fn quant_conv2d<R: Rng>(
        in_channels: usize,
        filters: usize,
        kernel_size: (usize, usize),
        options: QuantOptions,
        rng: &mut R,
    ) -> Result<Self> {
        QuantConv2d::new(in_channels, filters, kernel_size, options, rng).map(Self::QuantConv2d)
    }

    pub fn max_pool2d(pool: (usize, usize)) -> Self {
        Self::MaxPool2d(MaxPool2d::new(pool))
    }

    pub fn batch_norm(channels: usize, trainable: bool) -> Self {
        Self::BatchNorm(BatchNorm::new(channels, trainable))
    }

    pub fn flatten() -> Self {
        Self::Flatten(Flatten::new())
    }

    pub fn quant_dense<R: Rng>(
        dim: (usize, usize),
        options: QuantOptions,
        rng: &mut R,
    ) -> Result<Self> {
        QuantDense::new(dim, options, rng).map(Self::QuantDense)
    }

    pub fn softmax() -> Self {
        Self::Softmax(Softmax::new())
    }

    /// The base name of the layer, from which unique names are derived.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QuantConv2d(_) => "quant_conv2d",
            Self::MaxPool2d(_) => "max_pooling2d",
            Self::BatchNorm(_) => "batch_normalization",
            Self::Flatten(_) => "flatten",
            Self::QuantDense(_) => "quant_dense",
            Self::Softmax(_) => "activation",
        }
    }

    pub fn is_batch_norm(&self) -> bool {
        matches!(self, Self::BatchNorm(_))
    }

    pub fn is_softmax(&self) -> bool {
        matches!(self, Self::Softmax(_))
    }

    pub fn trainable(&self) -> bool {
        match self {
            Self::QuantConv2d(l) => l.options().trainable,
            Self::QuantDense(l) => l.options().trainable,
            Self::BatchNorm(l) => l.trainable(),
            Self::MaxPool2d(_) | Self::Flatten(_) | Self::Softmax(_) => true,
        }
    }

    /// The weights of the layer in declaration order, trainable or not.
    pub fn weights(&self) -> &[Weight] {
        match self {
            Self::QuantConv2d(l) => l.weights(),
            Self::QuantDense(l) => l.weights(),
            Self::BatchNorm(l) => l.weights(),
            Self::MaxPool2d(_) | Self::Flatten(_) | Self::Softmax(_) => &[],
        }
    }

    pub fn weights_mut(&mut self) -> &mut [Weight] {
        match self {
            Self::QuantConv2d(l) => l.weights_mut(),
            Self::QuantDense(l) => l.weights_mut(),
            Self::BatchNorm(l) => l.weights_mut(),
            Self::MaxPool2d(_) | Self::Flatten(_) | Self::Softmax(_) => &mut [],
        }
    }

    pub(crate) fn params_and_grads(&mut self) -> (&mut [Weight], &mut [Option<ArrayD<f32>>]) {
        match self {
            Self::QuantConv2d(l) => l.params_and_grads(),
            Self::QuantDense(l) => l.params_and_grads(),
            Self::BatchNorm(l) => l.params_and_grads(),
            Self::MaxPool2d(_) | Self::Flatten(_) | Self::Softmax(_) => (&mut [], &mut []),
        }
    }

    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        match self {
            Self::QuantConv2d(l) => l.output_shape(input),
            Self::MaxPool2d(l) => l.output_shape(input),
            Self::BatchNorm(l) => l.output_shape(input),
            Self::Flatten(l) => l.output_shape(input),
            Self::QuantDense(l) => l.output_shape(input),
            Self::Softmax(l) => l.output_shape(input),
        }
    }

    pub fn forward(&mut self, x: ArrayD<f32>, training: bool) -> Result<ArrayD<f32>> {
        match self {
            Self::QuantConv2d(l) => l.forward(x),
            Self::MaxPool2d(l) => l.forward(x),
            Self::BatchNorm(l) => l.forward(x, training),
            Self::Flatten(l) => l.forward(x),
            Self::QuantDense(l) => l.forward(x),
            Self::Softmax(l) => l.forward(x),
        }
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        match self {
            Self::QuantConv2d(l) => l.backward(d),
            Self::MaxPool2d(l) => l.backward(d),
            Self::BatchNorm(l) => l.backward(d),
            Self::Flatten(l) => l.backward(d),
            Self::QuantDense(l) => l.backward(d),
            Self::Softmax(l) => l.backward(d),
        }
    }
}
