use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{Optimizer, OptimizerFactory};
use crate::{MlErr, Result};

#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    beta1_t: f32,
    beta2_t: f32,
    v: Box<[f32]>,
    s: Box<[f32]>,
    epsilon: f32,
}

impl Adam {
    pub fn new(len: usize, learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            beta1_t: 1.,
            beta2_t: 1.,
            v: vec![0.; len].into_boxed_slice(),
            s: vec![0.; len].into_boxed_slice(),
            epsilon,
        }
    }
}

impl Optimizer for Adam {
    fn update_weights(&mut self, grad: &[f32], weights: &mut [f32]) -> Result<()> {
        for (what, len) in [("gradient", grad.len()), ("weights", weights.len())] {
            if len != self.v.len() {
                return Err(MlErr::SizeMismatch {
                    what,
                    got: len,
                    expected: self.v.len(),
                });
            }
        }

        let Self {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            ..
        } = *self;

        self.beta1_t *= b1;
        self.beta2_t *= b2;

        let bc1 = 1. - self.beta1_t;
        let bc2 = 1. - self.beta2_t;
        let step_size = lr * (bc2.sqrt() / bc1);

        weights
            .par_iter_mut()
            .zip(grad.par_iter())
            .zip(self.v.par_iter_mut())
            .zip(self.s.par_iter_mut())
            .for_each(|(((w, g), v), s)| {
                *v = b1 * *v + (1. - b1) * g;
                *s = b2 * *s + (1. - b2) * g.powi(2);
                *w -= step_size * *v / (s.sqrt() + eps);
            });

        Ok(())
    }
}

/// The hyperparameters of `Adam`, defaulting to the usual ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

impl OptimizerFactory for AdamConfig {
    type Optimizer = Adam;

    fn build(&self, len: usize) -> Adam {
        Adam::new(len, self.learning_rate, self.beta1, self.beta2, self.epsilon)
    }
}
