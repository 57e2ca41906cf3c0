use std::num::NonZeroUsize;

use log::{info, trace};
use ndarray::{ArrayD, Ix2};
use rand::Rng;
use serde::Serialize;

use super::Callback;
use crate::{
    MlErr, Result,
    arch::{
        Model,
        loss::{LossFn, accuracy},
    },
    dataset::Dataset,
    optimization::{Optimizer, OptimizerFactory},
};

/// The metrics of one training epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochLogs {
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
}

/// The metrics of every epoch of a `fit` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct History {
    pub epochs: Vec<EpochLogs>,
}

impl History {
    pub fn loss(&self) -> Vec<f32> {
        self.epochs.iter().map(|e| e.loss).collect()
    }

    pub fn accuracy(&self) -> Vec<f32> {
        self.epochs.iter().map(|e| e.accuracy).collect()
    }
}

/// The result of evaluating a model over a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub loss: f32,
    pub accuracy: f32,
}

/// A model `Trainer`. Holds everything needed to train a model except the model itself and
/// its data, including the optimizer state of every weight tensor, which survives between
/// `fit` calls.
pub struct Trainer<F, L, R>
where
    F: OptimizerFactory,
    L: LossFn,
    R: Rng,
{
    optimizer_config: F,
    optimizers: Vec<Option<F::Optimizer>>,
    loss_fn: L,
    batch_size: NonZeroUsize,
    rng: R,
}

impl<F, L, R> Trainer<F, L, R>
where
    F: OptimizerFactory,
    L: LossFn,
    R: Rng,
{
    /// Returns a new `Trainer`.
    ///
    /// # Arguments
    /// * `optimizer_config` - Builds the optimizer of each weight tensor on its first update.
    /// * `loss_fn` - The loss function used to measure the difference between a model's output and the expected one.
    /// * `batch_size` - The amount of samples per optimizer step.
    /// * `rng` - A random number generator, used to shuffle the dataset on every epoch.
    pub fn new(optimizer_config: F, loss_fn: L, batch_size: NonZeroUsize, rng: R) -> Self {
        Self {
            optimizer_config,
            optimizers: Vec::new(),
            loss_fn,
            batch_size,
            rng,
        }
    }

    /// Trains `model` for `epochs` epochs over `dataset`.
    ///
    /// # Arguments
    /// * `model` - The model to train.
    /// * `dataset` - The training data, shuffled at the start of every epoch.
    /// * `epochs` - The amount of passes over the dataset.
    /// * `callbacks` - Notified at the start of training, after every epoch and at the end.
    ///
    /// # Returns
    /// The loss and accuracy of every epoch, averaged over its samples.
    pub fn fit<M: Model>(
        &mut self,
        model: &mut M,
        dataset: &mut Dataset,
        epochs: usize,
        callbacks: &mut [&mut dyn Callback],
    ) -> Result<History> {
        if dataset.is_empty() {
            return Err(MlErr::EmptyDataset);
        }

        let mut input_shape = vec![self.batch_size.get()];
        input_shape.extend_from_slice(dataset.sample_shape());
        let graph = model.summary(&input_shape)?;

        for callback in callbacks.iter_mut() {
            callback.on_train_begin(&graph)?;
        }

        let mut history = History::default();

        for epoch in 0..epochs {
            dataset.shuffle(&mut self.rng);

            let mut total_loss = 0.0;
            let mut hits = 0.0;

            for (i, (x, y)) in dataset.batches(self.batch_size).enumerate() {
                let (loss, acc) = self.train_step(model, x, &y)?;
                trace!("epoch {epoch} batch {i}: loss={loss} accuracy={acc}");

                total_loss += loss * y.len() as f32;
                hits += acc * y.len() as f32;
            }

            let logs = EpochLogs {
                epoch,
                loss: total_loss / dataset.len() as f32,
                accuracy: hits / dataset.len() as f32,
            };
            info!(
                "epoch {}/{epochs}: loss={:.4} accuracy={:.4}",
                epoch + 1,
                logs.loss,
                logs.accuracy
            );

            for callback in callbacks.iter_mut() {
                callback.on_epoch_end(epoch, &logs)?;
            }

            history.epochs.push(logs);
        }

        for callback in callbacks.iter_mut() {
            callback.on_train_end()?;
        }

        Ok(history)
    }

    /// Computes the loss and accuracy of `model` over `dataset` without training it.
    ///
    /// # Arguments
    /// * `model` - The model to evaluate, run in inference mode.
    /// * `dataset` - The evaluation data, visited in its current order.
    /// * `batch_size` - The amount of samples per forward pass.
    pub fn evaluate<M: Model>(
        &self,
        model: &mut M,
        dataset: &Dataset,
        batch_size: NonZeroUsize,
    ) -> Result<Evaluation> {
        if dataset.is_empty() {
            return Err(MlErr::EmptyDataset);
        }

        let mut total_loss = 0.0;
        let mut hits = 0.0;

        for (x, y) in dataset.batches(batch_size) {
            let y_pred = model.forward(x, false)?.into_dimensionality::<Ix2>()?;

            total_loss += self.loss_fn.loss(y_pred.view(), &y)? * y.len() as f32;
            hits += accuracy(y_pred.view(), &y) * y.len() as f32;
        }

        let n = dataset.len() as f32;
        Ok(Evaluation {
            loss: total_loss / n,
            accuracy: hits / n,
        })
    }

    fn train_step<M: Model>(
        &mut self,
        model: &mut M,
        x: ArrayD<f32>,
        y: &[usize],
    ) -> Result<(f32, f32)> {
        let y_pred = model.forward(x, true)?.into_dimensionality::<Ix2>()?;

        let loss = self.loss_fn.loss(y_pred.view(), y)?;
        let acc = accuracy(y_pred.view(), y);

        match self.loss_fn.softmax_loss_prime(y_pred.view(), y)? {
            Some(d) if model.ends_in_softmax() => model.backward_from_logits(d.into_dyn())?,
            _ => {
                let d = self.loss_fn.loss_prime(y_pred.view(), y)?;
                model.backward(d.into_dyn())?
            }
        };

        let Self {
            optimizer_config,
            optimizers,
            ..
        } = self;

        model.apply_gradients(|i, grad, weights| {
            if optimizers.len() <= i {
                optimizers.resize_with(i + 1, || None);
            }

            let len = weights.len();
            optimizers[i]
                .get_or_insert_with(|| optimizer_config.build(len))
                .update_weights(grad, weights)
        })?;

        Ok((loss, acc))
    }
}
