mod constraints;
pub mod layers;
pub mod loss;
mod model;
pub(crate) mod quantizers;
mod sequential;
mod weight;

pub use constraints::Constraint;
pub use model::{LayerSummary, Model, WeightSummary};
pub use quantizers::Quantizer;
pub use sequential::Sequential;
pub use weight::Weight;
