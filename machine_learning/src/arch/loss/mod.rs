mod loss_fn;
mod sparse_categorical_crossentropy;

pub use loss_fn::LossFn;
pub use sparse_categorical_crossentropy::{SparseCategoricalCrossentropy, accuracy};
