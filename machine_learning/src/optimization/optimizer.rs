use crate::Result;

pub trait Optimizer {
    /// Takes a step over `weights` given their gradient.
    ///
    /// # Errors
    /// If `grad`, `weights` and the optimizer state differ in length.
    fn update_weights(&mut self, grad: &[f32], weights: &mut [f32]) -> Result<()>;
}

/// Builds one optimizer per weight tensor, each one owning the state of its tensor.
pub trait OptimizerFactory {
    type Optimizer: Optimizer;

    /// Builds an optimizer for a tensor of `len` elements.
    fn build(&self, len: usize) -> Self::Optimizer;
}
