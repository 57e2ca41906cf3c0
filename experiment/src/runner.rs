use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use log::{debug, info};
use machine_learning::{
    arch::{Sequential, loss::SparseCategoricalCrossentropy},
    dataset::Dataset,
    optimization::AdamConfig,
    training::{Evaluation, LogDirWriter, Trainer},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    ExperimentError,
    cifar::Cifar10,
    compare::are_layers_equal,
    configs::ExperimentConfig,
    factory::{ModelFlags, build_model},
};

type ModelTrainer = Trainer<AdamConfig, SparseCategoricalCrossentropy, StdRng>;

/// The test accuracies of one run of the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// The model trained with binary weights.
    pub binary: f64,
    /// The real valued model holding the binary model's latent weights.
    pub real: f64,
    /// The real valued model after retraining its batch normalization layers.
    pub real_retrained: f64,
}

/// Runs the experiment once:
///
/// 1. trains a model with binary weights;
/// 2. copies its latent weights into a real valued model whose only trainable layers are the
///    batch normalization ones;
/// 3. evaluates both;
/// 4. retrains the real valued model and evaluates it again;
/// 5. copies the retrained weights back into the binary model and evaluates it.
pub fn run_once<R: Rng>(
    config: &ExperimentConfig,
    data: &mut Cifar10,
    rng: &mut R,
) -> Result<RunResult, ExperimentError> {
    let eval_batch_size = config.eval_batch_size()?;

    let binary_flags = ModelFlags {
        use_binary_weights: true,
        only_train_bn_layers: false,
        use_bn_layers: config.with_bn,
    };
    let mut binary_model = build_model(binary_flags, rng)?;
    let mut binary_trainer = trainer(config, rng)?;

    info!("training binary model");
    train_model(config, &mut binary_trainer, &mut binary_model, &mut data.train)?;

    let real_flags = ModelFlags {
        use_binary_weights: false,
        only_train_bn_layers: true,
        use_bn_layers: config.with_bn,
    };
    let mut real_model = build_model(real_flags, rng)?;
    let mut real_trainer = trainer(config, rng)?;

    real_model.set_weights(&binary_model.get_weights())?;
    debug!("copied binary model weights into the real valued model");
    println!(
        "models have same weight: {}",
        are_layers_equal(&binary_model, &real_model, true)
    );

    let binary = binary_trainer
        .evaluate(&mut binary_model, &data.test, eval_batch_size)?
        .accuracy;
    let real = real_trainer
        .evaluate(&mut real_model, &data.test, eval_batch_size)?
        .accuracy;

    info!("retraining the batch normalization layers of the real valued model");
    train_model(config, &mut real_trainer, &mut real_model, &mut data.train)?;

    println!(
        "models have same weight after retraining: {}",
        are_layers_equal(&binary_model, &real_model, true)
    );

    let real_retrained = real_trainer
        .evaluate(&mut real_model, &data.test, eval_batch_size)?
        .accuracy;

    binary_model.set_weights(&real_model.get_weights())?;
    let binary_retrained =
        binary_trainer.evaluate(&mut binary_model, &data.test, eval_batch_size)?;

    println!("binary model accuracy: {binary:.2}");
    println!("real model accuracy: {real:.2}");
    println!("real model retrained accuracy: {real_retrained:.2}");
    println!(
        "binary model retrained accuracy: {}",
        accuracy_and_loss(&binary_retrained)
    );

    Ok(RunResult {
        binary: f64::from(binary),
        real: f64::from(real),
        real_retrained: f64::from(real_retrained),
    })
}

/// Runs the experiment `config.runs` times and writes every result to `config.results_path`.
pub fn run_many<R: Rng>(
    config: &ExperimentConfig,
    data: &mut Cifar10,
    rng: &mut R,
) -> Result<Vec<RunResult>, ExperimentError> {
    let mut results = Vec::with_capacity(config.runs);

    for run in 0..config.runs {
        info!("starting run {}/{}", run + 1, config.runs);
        results.push(run_once(config, data, rng)?);
    }

    println!("{results:?}");
    save_results(&config.results_path, &results)?;

    Ok(results)
}

/// Writes the results as a JSON array, creating the parent directory if needed.
pub fn save_results<P: AsRef<Path>>(path: P, results: &[RunResult]) -> Result<(), ExperimentError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut file, results)?;
    file.flush()?;

    info!("results written to {}", path.display());
    Ok(())
}

pub fn load_results<P: AsRef<Path>>(path: P) -> Result<Vec<RunResult>, ExperimentError> {
    let path = path.as_ref();
    let json = fs::read_to_string(path).map_err(|source| ExperimentError::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(serde_json::from_str(&json)?)
}

fn trainer<R: Rng>(config: &ExperimentConfig, rng: &mut R) -> Result<ModelTrainer, ExperimentError> {
    Ok(Trainer::new(
        config.optimizer,
        SparseCategoricalCrossentropy::new(),
        config.batch_size()?,
        StdRng::from_rng(rng),
    ))
}

fn train_model(
    config: &ExperimentConfig,
    trainer: &mut ModelTrainer,
    model: &mut Sequential,
    train: &mut Dataset,
) -> Result<(), ExperimentError> {
    let mut log_dir = LogDirWriter::new(experiment_dir(&config.log_dir), true);
    trainer.fit(model, train, config.epochs, &mut [&mut log_dir])?;

    Ok(())
}

fn experiment_dir(log_dir: &Path) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();

    log_dir.join(format!("experiment__{now}"))
}

/// Formats an evaluation as an unrounded `(accuracy, loss)` pair.
fn accuracy_and_loss(eval: &Evaluation) -> String {
    format!("({}, {})", eval.accuracy, eval.loss)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrained_binary_evaluation_reports_accuracy_then_loss() {
        let eval = Evaluation {
            accuracy: 0.5,
            loss: 1.25,
        };
        assert_eq!(accuracy_and_loss(&eval), "(0.5, 1.25)");
    }

    #[test]
    fn results_survive_a_round_trip_through_the_file() {
        let path = std::env::temp_dir()
            .join(format!("results_{}", std::process::id()))
            .join("results.txt");
        let results = [RunResult {
            binary: 0.5922,
            real: 0.1013,
            real_retrained: 0.5976,
        }];

        save_results(&path, &results).unwrap();
        assert_eq!(load_results(&path).unwrap(), results);

        fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn log_dirs_are_timestamped() {
        let dir = experiment_dir(Path::new("approx_mnist"));
        let name = dir.file_name().unwrap().to_str().unwrap();

        assert!(dir.starts_with("approx_mnist"));
        assert!(name.starts_with("experiment__"));
        assert!(name["experiment__".len()..].parse::<f64>().unwrap() > 0.);
    }
}
