//! Reader for the binary distribution of CIFAR-10.
//!
//! Every file is a sequence of records made of a label byte followed by the 32x32 pixels of
//! the red, green and blue channels, in that order.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};
use machine_learning::{MlErr, dataset::Dataset};
use ndarray::Array4;

use crate::ExperimentError;

pub const TRAIN_FILES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
pub const TEST_FILE: &str = "test_batch.bin";

pub const IMAGE_SIZE: usize = 32;
pub const CHANNELS: usize = 3;
pub const CLASSES: usize = 10;
const PIXELS: usize = IMAGE_SIZE * IMAGE_SIZE * CHANNELS;
const RECORD_LEN: usize = 1 + PIXELS;

/// The train and test splits, as NHWC images scaled into `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct Cifar10 {
    pub train: Dataset,
    pub test: Dataset,
}

/// Loads both splits from a directory holding the binary distribution.
///
/// # Arguments
/// * `dir` - The directory with the `data_batch_*.bin` and `test_batch.bin` files.
/// * `train_limit` - The maximum amount of training samples to keep.
/// * `test_limit` - The maximum amount of test samples to keep.
pub fn load<P: AsRef<Path>>(
    dir: P,
    train_limit: Option<usize>,
    test_limit: Option<usize>,
) -> Result<Cifar10, ExperimentError> {
    let dir = dir.as_ref();
    let train_paths: Vec<_> = TRAIN_FILES.iter().map(|f| dir.join(f)).collect();

    let train = read_batches(&train_paths, train_limit)?;
    let test = read_batches(&[dir.join(TEST_FILE)], test_limit)?;
    info!(
        "loaded cifar-10 from {}: {} train and {} test images",
        dir.display(),
        train.len(),
        test.len()
    );

    Ok(Cifar10 { train, test })
}

/// Reads the records of several files into a single dataset, stopping once `limit` samples
/// have been read.
pub fn read_batches(paths: &[PathBuf], limit: Option<usize>) -> Result<Dataset, ExperimentError> {
    let limit = limit.unwrap_or(usize::MAX);
    let mut pixels = Vec::new();
    let mut labels = Vec::new();

    for path in paths {
        if labels.len() >= limit {
            break;
        }

        let bytes = fs::read(path).map_err(|source| ExperimentError::FileAccess {
            path: path.clone(),
            source,
        })?;

        let read = parse_records(&bytes, limit - labels.len(), &mut pixels, &mut labels)
            .map_err(|msg| ExperimentError::InvalidDataset {
                path: path.clone(),
                msg,
            })?;
        debug!("read {read} records from {}", path.display());
    }

    let n = labels.len();
    let images = Array4::from_shape_vec((n, CHANNELS, IMAGE_SIZE, IMAGE_SIZE), pixels)
        .map_err(MlErr::from)?
        .permuted_axes([0, 2, 3, 1])
        .mapv(|p| f32::from(p) / 127.5 - 1.)
        .as_standard_layout()
        .into_owned()
        .into_dyn();

    Ok(Dataset::new(images, labels)?)
}

/// Appends up to `max` records of `bytes`, returning how many were read.
fn parse_records(
    bytes: &[u8],
    max: usize,
    pixels: &mut Vec<u8>,
    labels: &mut Vec<usize>,
) -> Result<usize, String> {
    if bytes.len() % RECORD_LEN != 0 {
        return Err(format!(
            "truncated record: {} bytes is not a multiple of {RECORD_LEN}",
            bytes.len()
        ));
    }

    let mut read = 0;
    for (i, record) in bytes.chunks_exact(RECORD_LEN).take(max).enumerate() {
        let label = usize::from(record[0]);
        if label >= CLASSES {
            return Err(format!("record {i} has label {label}"));
        }

        labels.push(label);
        pixels.extend_from_slice(&record[1..]);
        read += 1;
    }

    Ok(read)
}
