pub mod cifar;
pub mod compare;
pub mod configs;
pub mod error;
pub mod factory;
pub mod runner;
pub mod stats;

use log::info;
use rand::{SeedableRng, rngs::StdRng};

pub use error::ExperimentError;

use crate::configs::{ExperimentConfig, Mode, ResultsSource};

/// Runs the mode selected by the configuration, printing its summary to standard output.
///
/// # Errors
/// Returns an `ExperimentError` if reading the data, training or computing the statistics
/// fails.
pub fn run(config: &ExperimentConfig) -> Result<(), ExperimentError> {
    match config.mode {
        Mode::Stats => {
            let results = match config.results_source {
                ResultsSource::Builtin => stats::RESULTS.to_vec(),
                ResultsSource::File => runner::load_results(&config.results_path)?,
            };

            info!("computing statistics over {} runs", results.len());
            let report = stats::result_stats(&results)?;
            print!("{report}");
        }
        Mode::Experiment => {
            let mut data = cifar::load(&config.data_dir, config.train_limit, config.test_limit)?;
            let mut rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };

            runner::run_many(config, &mut data, &mut rng)?;
        }
    }

    Ok(())
}
