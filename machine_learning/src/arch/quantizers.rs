use ndarray::{ArrayD, ArrayViewD, Zip};
use serde::{Deserialize, Serialize};

/// Maps real values to a constrained discrete set during the forward pass, and
/// provides the surrogate derivative used during the backward pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantizer {
    /// Sign quantizer with a straight-through estimator.
    SteSign { clip_value: f32 },
}
use Quantizer::*;

impl Quantizer {
    /// A `SteSign` quantizer whose gradient is cancelled outside of `[-1, 1]`.
    pub fn ste_sign() -> Self {
        SteSign { clip_value: 1.0 }
    }

    /// Quantizes a single value.
    ///
    /// The sign of zero is taken as `+1` so that the output is always binary.
    pub fn f(&self, x: f32) -> f32 {
        match self {
            SteSign { .. } => {
                if x >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }

    /// The surrogate derivative of the quantizer at `x`.
    pub fn df(&self, x: f32) -> f32 {
        match *self {
            SteSign { clip_value } => {
                if x.abs() <= clip_value {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Quantizes a whole tensor.
    pub fn apply(&self, x: ArrayViewD<f32>) -> ArrayD<f32> {
        x.mapv(|x| self.f(x))
    }

    /// Multiplies the incoming gradient `d` by the surrogate derivative evaluated on
    /// the quantizer's original input `x`.
    pub fn backprop(&self, d: &mut ArrayD<f32>, x: ArrayViewD<f32>) {
        Zip::from(d).and(&x).for_each(|d, &x| *d *= self.df(x));
    }
}

/// Applies an optional quantizer, returning an owned tensor either way.
pub(crate) fn quantize(quantizer: Option<&Quantizer>, x: ArrayViewD<f32>) -> ArrayD<f32> {
    match quantizer {
        Some(q) => q.apply(x),
        None => x.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn, arr1};

    #[test]
    fn ste_sign_is_binary_and_maps_zero_to_one() {
        let q = Quantizer::ste_sign();
        let x = arr1(&[-2.0, -0.3, 0.0, 0.4, 7.0]).into_dyn();
        let y = q.apply(x.view());

        assert_eq!(y, arr1(&[-1.0, -1.0, 1.0, 1.0, 1.0]).into_dyn());
    }

    #[test]
    fn ste_sign_gradient_is_cancelled_outside_the_clip_range() {
        let q = Quantizer::ste_sign();
        let x = arr1(&[-1.5, -1.0, 0.2, 1.0, 1.01]).into_dyn();
        let mut d = ArrayD::from_elem(IxDyn(&[5]), 3.0);

        q.backprop(&mut d, x.view());

        assert_eq!(d, arr1(&[0.0, 3.0, 3.0, 3.0, 0.0]).into_dyn());
    }
}
