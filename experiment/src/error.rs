use std::{fmt, io, path::PathBuf};

use machine_learning::MlErr;

/// All errors that can occur while running the experiment.
#[derive(Debug)]
pub enum ExperimentError {
    /// Invalid configuration, caught before doing any work.
    InvalidConfig(String),
    /// A dataset or results file could not be read.
    FileAccess { path: PathBuf, source: io::Error },
    /// A dataset file has an unexpected layout.
    InvalidDataset { path: PathBuf, msg: String },
    /// The statistics can't be computed over the given samples.
    Stats(String),
    /// An error from the training library.
    Ml(MlErr),
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for ExperimentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::FileAccess { path, source } => {
                write!(f, "couldn't read {}: {source}", path.display())
            }
            Self::InvalidDataset { path, msg } => {
                write!(f, "invalid dataset file {}: {msg}", path.display())
            }
            Self::Stats(msg) => write!(f, "statistics error: {msg}"),
            Self::Ml(e) => write!(f, "training error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl std::error::Error for ExperimentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FileAccess { source, .. } => Some(source),
            Self::Ml(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for ExperimentError {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}

impl From<io::Error> for ExperimentError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for ExperimentError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}
