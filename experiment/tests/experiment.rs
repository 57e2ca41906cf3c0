use std::{fs, num::NonZeroUsize, path::PathBuf};

use experiment::{
    cifar::{CHANNELS, Cifar10, IMAGE_SIZE},
    compare::are_layers_equal,
    configs::ExperimentConfig,
    factory::{ModelFlags, build_model},
    runner::{load_results, run_many},
};
use machine_learning::{
    arch::{Sequential, loss::SparseCategoricalCrossentropy},
    dataset::Dataset,
    optimization::AdamConfig,
    training::Trainer,
};
use ndarray::{Array, IxDyn};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn random_split(n: usize, rng: &mut StdRng) -> Dataset {
    let images = Array::from_shape_simple_fn(IxDyn(&[n, IMAGE_SIZE, IMAGE_SIZE, CHANNELS]), || {
        rng.random_range(-1.0..=1.0)
    });
    Dataset::new(images, (0..n).map(|i| i % 10).collect()).unwrap()
}

fn synthetic_cifar(seed: u64) -> Cifar10 {
    let mut rng = StdRng::seed_from_u64(seed);
    Cifar10 {
        train: random_split(16, &mut rng),
        test: random_split(8, &mut rng),
    }
}

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("experiment_{name}_{}", std::process::id()))
}

fn fit(model: &mut Sequential, data: &mut Dataset, seed: u64) {
    let mut trainer = Trainer::new(
        AdamConfig::default(),
        SparseCategoricalCrossentropy,
        NonZeroUsize::new(8).unwrap(),
        StdRng::seed_from_u64(seed),
    );

    trainer.fit(model, data, 1, &mut []).unwrap();
}

#[test]
fn retraining_batch_norm_layers_keeps_every_other_weight() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut data = synthetic_cifar(1);

    let binary_flags = ModelFlags {
        use_binary_weights: true,
        only_train_bn_layers: false,
        use_bn_layers: true,
    };
    let mut binary = build_model(binary_flags, &mut rng).unwrap();
    fit(&mut binary, &mut data.train, 2);

    let real_flags = ModelFlags {
        use_binary_weights: false,
        only_train_bn_layers: true,
        use_bn_layers: true,
    };
    let mut real = build_model(real_flags, &mut rng).unwrap();
    assert!(!are_layers_equal(&binary, &real, true));

    real.set_weights(&binary.get_weights()).unwrap();
    assert!(are_layers_equal(&binary, &real, false));

    fit(&mut real, &mut data.train, 3);
    assert!(are_layers_equal(&binary, &real, true));
    assert!(!are_layers_equal(&binary, &real, false));
}

#[test]
fn experiment_runs_write_results_and_training_logs() {
    let log_dir = temp_dir("logs");
    let results_path = temp_dir("results").join("results.txt");

    let config = ExperimentConfig {
        log_dir: log_dir.clone(),
        results_path: results_path.clone(),
        runs: 2,
        epochs: 1,
        batch_size: 8,
        eval_batch_size: 8,
        ..Default::default()
    };

    let mut data = synthetic_cifar(4);
    let results = run_many(&config, &mut data, &mut StdRng::seed_from_u64(5)).unwrap();

    assert_eq!(results.len(), 2);
    for r in &results {
        for acc in [r.binary, r.real, r.real_retrained] {
            assert!((0.0..=1.0).contains(&acc));
        }
    }
    assert_eq!(load_results(&results_path).unwrap(), results);

    let runs: Vec<_> = fs::read_dir(&log_dir).unwrap().map(|e| e.unwrap().path()).collect();
    assert!(!runs.is_empty());
    assert!(runs.iter().all(|dir| dir.join("train.jsonl").exists()));
    assert!(runs.iter().all(|dir| dir.join("graph.json").exists()));

    fs::remove_dir_all(log_dir).unwrap();
    fs::remove_dir_all(results_path.parent().unwrap()).unwrap();
}
