use crate::arch::{Constraint, Quantizer};

/// Options shared by the quantized layers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantOptions {
    pub input_quantizer: Option<Quantizer>,
    pub kernel_quantizer: Option<Quantizer>,
    pub kernel_constraint: Option<Constraint>,
    pub trainable: bool,
}

impl Default for QuantOptions {
    /// A plain, trainable layer: no quantizers and no constraint.
    fn default() -> Self {
        Self {
            input_quantizer: None,
            kernel_quantizer: None,
            kernel_constraint: None,
            trainable: true,
        }
    }
}
