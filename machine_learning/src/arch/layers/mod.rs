mod batch_norm;
mod conv;
mod dense;
mod flatten;
mod layer;
mod max_pool;
mod options;
mod softmax;

pub use batch_norm::BatchNorm;
pub use conv::QuantConv2d;
pub use dense::QuantDense;
pub use flatten::Flatten;
pub use layer::Layer;
pub use max_pool::MaxPool2d;
pub use options::QuantOptions;
pub use softmax::Softmax;
