use ndarray::{parallel::prelude::*, prelude::*};
use rand::Rng;

use super::QuantOptions;
use crate::{
    MlErr, Result,
    arch::{Weight, quantizers::quantize},
    initialization::Initializer,
};

/// A 2D convolution over NHWC inputs with optionally quantized inputs and kernel.
///
/// Valid padding, unit strides and no bias. The kernel has shape
/// `[kh, kw, in_channels, filters]`.
///
/// The convolution is lowered to a matrix product: every receptive field of the input is
/// unrolled into a row (`im2col`), so the forward pass is `cols · kernel` and the backward
/// pass scatters `d · kernelᵀ` back onto the input (`col2im`). Both transformations run in
/// parallel over the samples of the batch.
#[derive(Debug, Clone)]
pub struct QuantConv2d {
    kernel_size: (usize, usize),
    in_channels: usize,
    filters: usize,
    options: QuantOptions,
    weights: Vec<Weight>,
    grads: Vec<Option<ArrayD<f32>>>,

    // Forward metadata
    input_shape: Vec<usize>,
    x: Option<ArrayD<f32>>,
    cols: Option<Array2<f32>>,
    kernel_q: Option<Array2<f32>>,
}

impl QuantConv2d {
    /// Creates a new `QuantConv2d` with a Glorot uniform initialized kernel.
    ///
    /// # Arguments
    /// * `in_channels` - The amount of channels of the input.
    /// * `filters` - The amount of output channels.
    /// * `kernel_size` - The height and width of the kernel.
    /// * `options` - Quantizers, constraint and trainability.
    /// * `rng` - A random number generator for the kernel initialization.
    pub fn new<R: Rng>(
        in_channels: usize,
        filters: usize,
        kernel_size: (usize, usize),
        options: QuantOptions,
        rng: &mut R,
    ) -> Result<Self> {
        let (kh, kw) = kernel_size;
        let kernel = Initializer::GlorotUniform.sample(&[kh, kw, in_channels, filters], rng)?;
        let kernel =
            Weight::new("kernel", kernel, options.trainable).with_constraint(options.kernel_constraint);

        Ok(Self {
            kernel_size,
            in_channels,
            filters,
            options,
            weights: vec![kernel],
            grads: vec![None],
            input_shape: vec![],
            x: None,
            cols: None,
            kernel_q: None,
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

    /// The output shape for a given input shape.
    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        let (kh, kw) = self.kernel_size;

        match *input {
            [n, h, w, c] if c == self.in_channels && h >= kh && w >= kw => {
                Ok(vec![n, h - kh + 1, w - kw + 1, self.filters])
            }
            _ => Err(self.shape_err(input)),
        }
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let out_shape = self.output_shape(x.shape())?;
        let (kh, kw) = self.kernel_size;

        let xq = quantize(self.options.input_quantizer.as_ref(), x.view());
        let cols = im2col(xq.view().into_dimensionality::<Ix4>()?, self.kernel_size);

        let kernel = self.weights[0].value();
        let kernel_q = quantize(self.options.kernel_quantizer.as_ref(), kernel.view())
            .into_shape_with_order((kh * kw * self.in_channels, self.filters))?;

        let out = cols.dot(&kernel_q).into_shape_with_order(IxDyn(&out_shape))?;

        self.input_shape = x.shape().to_vec();
        self.x = self.options.input_quantizer.map(|_| x);
        self.cols = Some(cols);
        self.kernel_q = Some(kernel_q);

        Ok(out)
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let (Some(cols), Some(kernel_q)) = (self.cols.take(), self.kernel_q.take()) else {
            return Err(MlErr::MissingForwardPass {
                layer: "quant_conv2d".into(),
            });
        };

        let rows = cols.nrows();
        let d = d.to_shape((rows, self.filters))?;

        if self.options.trainable {
            let kernel = self.weights[0].value();
            let mut dk = cols.t().dot(&d).into_shape_with_order(kernel.raw_dim())?;
            if let Some(q) = &self.options.kernel_quantizer {
                q.backprop(&mut dk, kernel.view());
            }

            self.grads[0] = Some(dk);
        }

        let dcols = d.dot(&kernel_q.t());
        let mut dx = col2im(dcols.view(), &self.input_shape, self.kernel_size)?;

        if let (Some(q), Some(x)) = (&self.options.input_quantizer, self.x.take()) {
            q.backprop(&mut dx, x.view());
        }

        Ok(dx)
    }

    fn shape_err(&self, input: &[usize]) -> MlErr {
        MlErr::ShapeMismatch {
            what: "quant_conv2d input".into(),
            got: input.to_vec(),
            expected: vec![0, self.kernel_size.0, self.kernel_size.1, self.in_channels],
        }
    }
}

/// Unrolls every `kh x kw` receptive field of `x` into a row.
///
/// # Returns
/// A matrix of shape `[n * oh * ow, kh * kw * c]` whose columns follow the `(i, j, c)`
/// ordering of a standard layout kernel.
pub(crate) fn im2col(x: ArrayView4<f32>, (kh, kw): (usize, usize)) -> Array2<f32> {
    let (n, h, w, c) = x.dim();
    let (oh, ow) = (h - kh + 1, w - kw + 1);
    let mut cols = Array2::zeros((n * oh * ow, kh * kw * c));

    cols.axis_chunks_iter_mut(Axis(0), oh * ow)
        .into_par_iter()
        .zip(x.axis_iter(Axis(0)))
        .for_each(|(mut rows, sample)| {
            for i in 0..oh {
                for j in 0..ow {
                    let patch = sample.slice(s![i..i + kh, j..j + kw, ..]);
                    rows.row_mut(i * ow + j)
                        .iter_mut()
                        .zip(patch.iter())
                        .for_each(|(r, &p)| *r = p);
                }
            }
        });

    cols
}

/// Scatters the unrolled rows back onto an input shaped tensor, accumulating overlaps.
pub(crate) fn col2im(
    cols: ArrayView2<f32>,
    input_shape: &[usize],
    (kh, kw): (usize, usize),
) -> Result<ArrayD<f32>> {
    let &[n, h, w, c] = input_shape else {
        return Err(MlErr::ShapeMismatch {
            what: "col2im target".into(),
            got: input_shape.to_vec(),
            expected: vec![0, kh, kw, 0],
        });
    };

    let (oh, ow) = (h - kh + 1, w - kw + 1);
    if cols.dim() != (n * oh * ow, kh * kw * c) {
        return Err(MlErr::SizeMismatch {
            what: "col2im rows",
            got: cols.nrows(),
            expected: n * oh * ow,
        });
    }

    let mut dx = Array4::<f32>::zeros((n, h, w, c));

    dx.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(cols.axis_chunks_iter(Axis(0), oh * ow))
        .for_each(|(mut sample, rows)| {
            for i in 0..oh {
                for j in 0..ow {
                    sample
                        .slice_mut(s![i..i + kh, j..j + kw, ..])
                        .iter_mut()
                        .zip(rows.row(i * ow + j))
                        .for_each(|(x, &r)| *x += r);
                }
            }
        });

    Ok(dx.into_dyn())
}
