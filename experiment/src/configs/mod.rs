mod experiment;

pub use experiment::{CONFIG_ENV, ExperimentConfig, Mode, ResultsSource};
