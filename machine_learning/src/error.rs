use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use ndarray::ShapeError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        what: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    WeightCountMismatch {
        got: usize,
        expected: usize,
    },
    MissingForwardPass {
        layer: String,
    },
    NonContiguous {
        what: &'static str,
    },
    NoSoftmaxOutput,
    EmptyDataset,
    InvalidLabel {
        label: usize,
        classes: usize,
    },
    Shape(ShapeError),
    Io(io::Error),
    Json(serde_json::Error),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => format!("There's a size mismatch for {what}, got {got} and expected {expected}"),
            MlErr::ShapeMismatch {
                what,
                got,
                expected,
            } => format!("The shape of {what} is {got:?} but {expected:?} was expected"),
            MlErr::WeightCountMismatch { got, expected } => format!(
                "Tried to set {got} weight tensors on a model that holds {expected} of them"
            ),
            MlErr::MissingForwardPass { layer } => {
                format!("Layer {layer} was asked for a backward pass before any forward pass")
            }
            MlErr::NonContiguous { what } => {
                format!("The buffer of {what} is not contiguous in memory")
            }
            MlErr::NoSoftmaxOutput => "The model does not end in a softmax layer".to_string(),
            MlErr::EmptyDataset => "The dataset has no samples".to_string(),
            MlErr::InvalidLabel { label, classes } => {
                format!("Label {label} is out of range for {classes} classes")
            }
            MlErr::Shape(e) => format!("shape error: {e}"),
            MlErr::Io(e) => format!("io error: {e}"),
            MlErr::Json(e) => format!("json error: {e}"),
        };

        write!(f, "{s}")
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            MlErr::Io(e) => Some(e),
            MlErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for MlErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
