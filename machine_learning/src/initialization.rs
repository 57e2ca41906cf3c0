use ndarray::{ArrayD, IxDyn};
use ndarray_rand::{RandomExt, rand_distr::Uniform};
use rand::Rng;

use crate::{MlErr, Result};

/// Generates the initial value of a weight tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Initializer {
    /// Xavier uniform initialization, sampling from `[-limit, limit)` where
    /// `limit = sqrt(6 / (fan_in + fan_out))`.
    GlorotUniform,
}

impl Initializer {
    /// Samples a tensor of the given shape.
    ///
    /// # Arguments
    /// * `shape` - The shape of the weight tensor. For kernels, the last axis holds the output
    ///   units and the second to last the input units; any leading axes form the receptive field.
    /// * `rng` - A random number generator.
    ///
    /// # Returns
    /// The sampled tensor or an error if the computed range is invalid.
    pub fn sample<R: Rng>(&self, shape: &[usize], rng: &mut R) -> Result<ArrayD<f32>> {
        let tensor = match self {
            Initializer::GlorotUniform => {
                let (fan_in, fan_out) = fans(shape);
                let limit = (6. / (fan_in + fan_out).max(1) as f32).sqrt();
                let distribution = Uniform::new(-limit, limit).map_err(|_| MlErr::SizeMismatch {
                    what: "glorot fans",
                    got: fan_in + fan_out,
                    expected: 1,
                })?;

                ArrayD::random_using(IxDyn(shape), distribution, rng)
            }
        };

        Ok(tensor)
    }
}

/// Computes the fan-in and fan-out of a kernel shape.
fn fans(shape: &[usize]) -> (usize, usize) {
    match shape {
        [] => (1, 1),
        [n] => (*n, *n),
        [.., fan_in, fan_out] => {
            let receptive_field: usize = shape[..shape.len() - 2].iter().product();
            (fan_in * receptive_field, fan_out * receptive_field)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn fans_of_conv_kernel_include_receptive_field() {
        assert_eq!(fans(&[3, 3, 32, 64]), (288, 576));
        assert_eq!(fans(&[1024, 64]), (1024, 64));
    }

    #[test]
    fn glorot_uniform_stays_within_limit() {
        let mut rng = StdRng::seed_from_u64(42);
        let w = Initializer::GlorotUniform
            .sample(&[3, 3, 3, 32], &mut rng)
            .unwrap();
        let limit = (6f32 / (27 + 288) as f32).sqrt();

        assert_eq!(w.shape(), &[3, 3, 3, 32]);
        assert!(w.iter().all(|&w| w >= -limit && w < limit));
    }

    #[test]
    fn same_seed_same_weights() {
        let a = Initializer::GlorotUniform
            .sample(&[4, 5], &mut StdRng::seed_from_u64(7))
            .unwrap();
        let b = Initializer::GlorotUniform
            .sample(&[4, 5], &mut StdRng::seed_from_u64(7))
            .unwrap();

        assert_eq!(a, b);
    }
}
