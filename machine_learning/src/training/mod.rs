mod callback;
mod log_dir;
mod trainer;

pub use callback::Callback;
pub use log_dir::LogDirWriter;
pub use trainer::{EpochLogs, Evaluation, History, Trainer};
