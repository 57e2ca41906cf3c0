use std::{env, fs, num::NonZeroUsize, path::PathBuf};

use machine_learning::optimization::AdamConfig;
use serde::{Deserialize, Serialize};

use crate::ExperimentError;

/// The environment variable holding the path of a JSON configuration file.
pub const CONFIG_ENV: &str = "EXPERIMENT_CONFIG";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Only compute the statistics over previously obtained results.
    #[default]
    Stats,
    /// Train and compare the models, writing the results file.
    Experiment,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultsSource {
    /// The results table shipped with the binary.
    #[default]
    Builtin,
    /// The results file written by a previous experiment.
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub mode: Mode,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub results_path: PathBuf,
    pub results_source: ResultsSource,
    pub runs: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub eval_batch_size: usize,
    pub with_bn: bool,
    pub seed: Option<u64>,
    pub train_limit: Option<usize>,
    pub test_limit: Option<usize>,
    pub optimizer: AdamConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            data_dir: "data/cifar-10-batches-bin".into(),
            log_dir: "approx_mnist".into(),
            results_path: "approx_cifar/results.txt".into(),
            results_source: ResultsSource::default(),
            runs: 10,
            epochs: 6,
            batch_size: 64,
            eval_batch_size: 32,
            with_bn: true,
            seed: None,
            train_limit: None,
            test_limit: None,
            optimizer: AdamConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Loads the configuration from the file named by `EXPERIMENT_CONFIG`, or the defaults if
    /// the variable isn't set.
    pub fn from_env() -> Result<Self, ExperimentError> {
        let Some(path) = env::var_os(CONFIG_ENV) else {
            return Self::default().validated();
        };

        let path = PathBuf::from(path);
        let json = fs::read_to_string(&path)
            .map_err(|source| ExperimentError::FileAccess { path, source })?;

        Self::from_json(&json)
    }

    /// Parses and validates a JSON configuration. Missing fields take their default value.
    pub fn from_json(json: &str) -> Result<Self, ExperimentError> {
        serde_json::from_str::<Self>(json)?.validated()
    }

    pub fn batch_size(&self) -> Result<NonZeroUsize, ExperimentError> {
        non_zero("batch_size", self.batch_size)
    }

    pub fn eval_batch_size(&self) -> Result<NonZeroUsize, ExperimentError> {
        non_zero("eval_batch_size", self.eval_batch_size)
    }

    fn validated(self) -> Result<Self, ExperimentError> {
        non_zero("runs", self.runs)?;
        non_zero("epochs", self.epochs)?;
        self.batch_size()?;
        self.eval_batch_size()?;

        Ok(self)
    }
}

fn non_zero(field: &str, value: usize) -> Result<NonZeroUsize, ExperimentError> {
    NonZeroUsize::new(value)
        .ok_or_else(|| ExperimentError::InvalidConfig(format!("{field} must be greater than zero")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = ExperimentConfig::from_json(r#"{ "mode": "experiment", "runs": 2 }"#).unwrap();

        assert_eq!(config.mode, Mode::Experiment);
        assert_eq!(config.runs, 2);
        assert_eq!(config.epochs, 6);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.eval_batch_size, 32);
        assert_eq!(config.results_path, PathBuf::from("approx_cifar/results.txt"));
        assert_eq!(config.optimizer, AdamConfig::default());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let err = ExperimentConfig::from_json(r#"{ "epochs": 0 }"#);
        assert!(matches!(err, Err(ExperimentError::InvalidConfig(_))));

        let err = ExperimentConfig::from_json(r#"{ "eval_batch_size": 0 }"#);
        assert!(matches!(err, Err(ExperimentError::InvalidConfig(_))));
    }

    #[test]
    fn unknown_modes_fail_to_parse() {
        let err = ExperimentConfig::from_json(r#"{ "mode": "train" }"#);
        assert!(matches!(err, Err(ExperimentError::Json(_))));
    }
}
