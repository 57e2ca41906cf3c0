use ndarray::{Array2, ArrayView2, Axis};

use super::LossFn;
use crate::{MlErr, Result};

const EPSILON: f32 = 1e-7;

/// Cross-entropy between predicted class probabilities and integer labels.
///
/// The probabilities are clipped into `[EPSILON, 1 - EPSILON]` before taking the logarithm,
/// and `loss_prime` vanishes wherever the clipping was active. When the probabilities come
/// from a softmax, `softmax_loss_prime` gives the gradient with respect to the logits,
/// `(p - onehot) / n`, which never vanishes on a confident mistake.
#[derive(Debug, Default, Clone, Copy)]
pub struct SparseCategoricalCrossentropy;

impl SparseCategoricalCrossentropy {
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for SparseCategoricalCrossentropy {
    fn loss(&self, y_pred: ArrayView2<f32>, labels: &[usize]) -> Result<f32> {
        check(y_pred, labels)?;

        let total: f32 = y_pred
            .axis_iter(Axis(0))
            .zip(labels)
            .map(|(row, &label)| -row[label].clamp(EPSILON, 1. - EPSILON).ln())
            .sum();

        Ok(total / labels.len() as f32)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, labels: &[usize]) -> Result<Array2<f32>> {
        check(y_pred, labels)?;

        let n = labels.len() as f32;
        let mut d = Array2::zeros(y_pred.raw_dim());

        let rows = d.axis_iter_mut(Axis(0)).zip(y_pred.axis_iter(Axis(0)));
        for ((mut d, row), &label) in rows.zip(labels) {
            let p = row[label];
            if (EPSILON..=1. - EPSILON).contains(&p) {
                d[label] = -1. / (p * n);
            }
        }

        Ok(d)
    }

    fn softmax_loss_prime(
        &self,
        y_pred: ArrayView2<f32>,
        labels: &[usize],
    ) -> Result<Option<Array2<f32>>> {
        check(y_pred, labels)?;

        let n = labels.len() as f32;
        let mut d = y_pred.to_owned();

        for (mut row, &label) in d.axis_iter_mut(Axis(0)).zip(labels) {
            row[label] -= 1.;
            row /= n;
        }

        Ok(Some(d))
    }
}

fn check(y_pred: ArrayView2<f32>, labels: &[usize]) -> Result<()> {
    let (rows, classes) = y_pred.dim();

    if rows != labels.len() {
        return Err(MlErr::SizeMismatch {
            what: "labels",
            got: labels.len(),
            expected: rows,
        });
    }

    if rows == 0 {
        return Err(MlErr::EmptyDataset);
    }

    match labels.iter().find(|&&label| label >= classes) {
        Some(&label) => Err(MlErr::InvalidLabel { label, classes }),
        None => Ok(()),
    }
}

/// The fraction of rows whose highest prediction is at the label's position.
///
/// Ties resolve to the first maximum.
pub fn accuracy(y_pred: ArrayView2<f32>, labels: &[usize]) -> f32 {
    if labels.is_empty() {
        return 0.;
    }

    let hits = y_pred
        .axis_iter(Axis(0))
        .zip(labels)
        .filter(|(row, label)| argmax(row.iter().copied()) == Some(**label))
        .count();

    hits as f32 / labels.len() as f32
}

fn argmax<I: Iterator<Item = f32>>(values: I) -> Option<usize> {
    values
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}
