use ndarray::{ArrayD, IxDyn};

use crate::{MlErr, Result};

/// Flattens every sample of the batch: `[n, ...] -> [n, prod(...)]`.
#[derive(Debug, Clone, Default)]
pub struct Flatten {
    input_shape: Vec<usize>,
}

impl Flatten {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        match input {
            [n, rest @ ..] if !rest.is_empty() => Ok(vec![*n, rest.iter().product()]),
            _ => Err(MlErr::ShapeMismatch {
                what: "flatten input".into(),
                got: input.to_vec(),
                expected: vec![0, 0],
            }),
        }
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let out_shape = self.output_shape(x.shape())?;
        self.input_shape = x.shape().to_vec();

        Ok(x.as_standard_layout()
            .into_owned()
            .into_shape_with_order(IxDyn(&out_shape))?)
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        Ok(d.as_standard_layout()
            .into_owned()
            .into_shape_with_order(IxDyn(&self.input_shape))?)
    }
}
