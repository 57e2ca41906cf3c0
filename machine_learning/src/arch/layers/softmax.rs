use ndarray::{Zip, prelude::*};

use crate::{MlErr, Result};

/// Softmax activation over the last axis of a `[n, classes]` input.
#[derive(Debug, Clone)]
pub struct Softmax {
    // Forward metadata
    a: Array2<f32>,
}

impl Default for Softmax {
    fn default() -> Self {
        Self::new()
    }
}

impl Softmax {
    pub fn new() -> Self {
        Self {
            a: Array2::zeros((0, 0)),
        }
    }

    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        match input {
            [_, _] => Ok(input.to_vec()),
            _ => Err(MlErr::ShapeMismatch {
                what: "softmax input".into(),
                got: input.to_vec(),
                expected: vec![0, 0],
            }),
        }
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        self.output_shape(x.shape())?;
        let mut a = x.into_dimensionality::<Ix2>()?;

        for mut row in a.rows_mut() {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row /= sum;
        }

        self.a = a;
        Ok(self.a.clone().into_dyn())
    }

    /// `dx = a * (d - sum(d * a))` row-wise.
    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let mut d = d.into_dimensionality::<Ix2>()?;
        if d.dim() != self.a.dim() {
            return Err(MlErr::MissingForwardPass {
                layer: "softmax".into(),
            });
        }

        Zip::from(d.rows_mut())
            .and(self.a.rows())
            .for_each(|mut d, a| {
                let dot = d.dot(&a);
                d.zip_mut_with(&a, |d, &a| *d = a * (*d - dot));
            });

        Ok(d.into_dyn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_sum_to_one_and_preserve_order() {
        let mut softmax = Softmax::new();
        let y = softmax
            .forward(array![[1., 2., 3.], [1000., 0., -1000.]].into_dyn())
            .unwrap();

        for row in y.rows() {
            assert!((row.sum() - 1.).abs() < 1e-6);
        }
        assert!(y[[0, 2]] > y[[0, 1]] && y[[0, 1]] > y[[0, 0]]);
        assert!((y[[1, 0]] - 1.).abs() < 1e-6);
    }

    #[test]
    fn gradient_of_a_uniform_upstream_vanishes() {
        let mut softmax = Softmax::new();
        softmax.forward(array![[0.5, -0.2, 1.3]].into_dyn()).unwrap();
        let dx = softmax.backward(ArrayD::ones(IxDyn(&[1, 3]))).unwrap();

        assert!(dx.iter().all(|d| d.abs() < 1e-6));
    }
}
