use ndarray::{Zip, prelude::*};

use crate::{MlErr, Result};

/// 2D max pooling over NHWC inputs, with strides equal to the pool size and valid padding.
#[derive(Debug, Clone)]
pub struct MaxPool2d {
    pool: (usize, usize),

    // Forward metadata
    input_shape: Vec<usize>,
    argmax: Array4<(usize, usize)>,
}

impl MaxPool2d {
    pub fn new(pool: (usize, usize)) -> Self {
        Self {
            pool,
            input_shape: vec![],
            argmax: Array4::from_elem((0, 0, 0, 0), (0, 0)),
        }
    }

    pub fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        let (ph, pw) = self.pool;

        match *input {
            [n, h, w, c] if h >= ph && w >= pw => Ok(vec![n, h / ph, w / pw, c]),
            _ => Err(MlErr::ShapeMismatch {
                what: "max_pooling2d input".into(),
                got: input.to_vec(),
                expected: vec![0, ph, pw, 0],
            }),
        }
    }

    pub fn forward(&mut self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let out_shape = self.output_shape(x.shape())?;
        let (ph, pw) = self.pool;
        let x = x.into_dimensionality::<Ix4>()?;
        let dim = (out_shape[0], out_shape[1], out_shape[2], out_shape[3]);

        let mut out = Array4::<f32>::zeros(dim);
        let mut argmax = Array4::from_elem(dim, (0, 0));

        Zip::from(out.outer_iter_mut())
            .and(argmax.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut out, mut argmax, x| {
                for ((i, j, c), o) in out.indexed_iter_mut() {
                    let (mut best, mut at) = (f32::NEG_INFINITY, (i * ph, j * pw));

                    for di in 0..ph {
                        for dj in 0..pw {
                            let (r, s) = (i * ph + di, j * pw + dj);
                            if x[(r, s, c)] > best {
                                best = x[(r, s, c)];
                                at = (r, s);
                            }
                        }
                    }

                    *o = best;
                    argmax[(i, j, c)] = at;
                }
            });

        self.input_shape = x.shape().to_vec();
        self.argmax = argmax;
        Ok(out.into_dyn())
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        if d.shape() != self.argmax.shape() {
            return Err(MlErr::ShapeMismatch {
                what: "max_pooling2d gradient".into(),
                got: d.shape().to_vec(),
                expected: self.argmax.shape().to_vec(),
            });
        }

        let d = d.into_dimensionality::<Ix4>()?;
        let mut dx = ArrayD::<f32>::zeros(IxDyn(&self.input_shape)).into_dimensionality::<Ix4>()?;

        Zip::from(dx.outer_iter_mut())
            .and(d.outer_iter())
            .and(self.argmax.outer_iter())
            .par_for_each(|mut dx, d, argmax| {
                Zip::indexed(&d).and(&argmax).for_each(|(_, _, c), &d, &(r, s)| {
                    dx[(r, s, c)] += d;
                });
            });

        Ok(dx.into_dyn())
    }
}
