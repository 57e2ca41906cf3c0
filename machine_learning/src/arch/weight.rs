use ndarray::ArrayD;

use super::Constraint;

/// A named weight tensor owned by a layer.
#[derive(Debug, Clone)]
pub struct Weight {
    name: &'static str,
    value: ArrayD<f32>,
    trainable: bool,
    constraint: Option<Constraint>,
}

impl Weight {
    /// Creates a new `Weight`.
    ///
    /// # Arguments
    /// * `name` - The name of the tensor inside its layer (e.g. `kernel`).
    /// * `value` - The initial value.
    /// * `trainable` - Whether the optimizer is allowed to update it.
    pub fn new(name: &'static str, value: ArrayD<f32>, trainable: bool) -> Self {
        Self {
            name,
            value: value.as_standard_layout().into_owned(),
            trainable,
            constraint: None,
        }
    }

    /// Attaches a constraint applied after every optimizer update.
    pub fn with_constraint(mut self, constraint: Option<Constraint>) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value(&self) -> &ArrayD<f32> {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.value
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    pub fn trainable(&self) -> bool {
        self.trainable
    }

    pub fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_ref()
    }

    /// Overwrites the value, keeping the tensor in standard layout.
    pub(crate) fn assign(&mut self, value: &ArrayD<f32>) {
        self.value = value.as_standard_layout().into_owned();
    }
}
