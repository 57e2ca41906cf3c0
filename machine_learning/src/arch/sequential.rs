use std::collections::HashMap;

use log::debug;
use ndarray::ArrayD;

use super::{LayerSummary, Model, WeightSummary, layers::Layer};
use crate::{MlErr, Result};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the gradients of its layers.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
    names: Vec<String>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// Every layer gets a unique name derived from its kind: the first one of a kind keeps the
    /// bare kind (`quant_conv2d`) and the following ones get a counter (`quant_conv2d_1`).
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        let layers: Vec<_> = layers.into_iter().collect();
        let mut seen: HashMap<&'static str, usize> = HashMap::new();

        let names = layers
            .iter()
            .map(|layer| {
                let kind = layer.kind();
                let count = seen.entry(kind).or_default();
                let name = match *count {
                    0 => kind.to_string(),
                    n => format!("{kind}_{n}"),
                };

                *count += 1;
                name
            })
            .collect();

        Self { layers, names }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns a copy of every weight tensor of every layer, in layer order.
    pub fn get_weights(&self) -> Vec<ArrayD<f32>> {
        self.layers
            .iter()
            .flat_map(|layer| layer.weights())
            .map(|w| w.value().clone())
            .collect()
    }

    /// Overwrites every weight tensor of the model.
    ///
    /// # Arguments
    /// * `weights` - The new values, in the order given by `get_weights`.
    ///
    /// # Returns
    /// An error if the amount of tensors or any of their shapes differ from the model's, in
    /// which case no weight is modified.
    pub fn set_weights(&mut self, weights: &[ArrayD<f32>]) -> Result<()> {
        let expected = self.layers.iter().map(|l| l.weights().len()).sum();
        if weights.len() != expected {
            return Err(MlErr::WeightCountMismatch {
                got: weights.len(),
                expected,
            });
        }

        let targets = self.layers.iter().zip(&self.names).flat_map(|(layer, name)| {
            layer.weights().iter().map(move |w| (name, w))
        });

        for ((layer, w), new) in targets.zip(weights) {
            if w.shape() != new.shape() {
                return Err(MlErr::ShapeMismatch {
                    what: format!("{layer}/{}", w.name()),
                    got: new.shape().to_vec(),
                    expected: w.shape().to_vec(),
                });
            }
        }

        self.layers
            .iter_mut()
            .flat_map(|layer| layer.weights_mut())
            .zip(weights)
            .for_each(|(w, new)| w.assign(new));

        debug!(tensors = weights.len(); "weights set");
        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.layers
            .iter()
            .flat_map(|layer| layer.weights())
            .map(|w| w.value().len())
            .sum()
    }

    fn forward(&mut self, mut x: ArrayD<f32>, training: bool) -> Result<ArrayD<f32>> {
        for layer in self.layers.iter_mut() {
            x = layer.forward(x, training)?;
        }

        Ok(x)
    }

    fn backward(&mut self, mut d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        for layer in self.layers.iter_mut().rev() {
            d = layer.backward(d)?;
        }

        Ok(d)
    }

    fn ends_in_softmax(&self) -> bool {
        self.layers.last().is_some_and(Layer::is_softmax)
    }

    fn backward_from_logits(&mut self, mut d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let rest = match self.layers.split_last_mut() {
            Some((last, rest)) if last.is_softmax() => rest,
            _ => return Err(MlErr::NoSoftmaxOutput),
        };

        for layer in rest.iter_mut().rev() {
            d = layer.backward(d)?;
        }

        Ok(d)
    }

    fn apply_gradients<F>(&mut self, mut update: F) -> Result<()>
    where
        F: FnMut(usize, &[f32], &mut [f32]) -> Result<()>,
    {
        let mut idx = 0;

        for layer in self.layers.iter_mut() {
            let (weights, grads) = layer.params_and_grads();

            for (w, grad) in weights.iter_mut().zip(grads.iter_mut()) {
                let i = idx;
                idx += 1;

                let Some(grad) = grad.take() else {
                    continue;
                };

                if !w.trainable() {
                    continue;
                }

                if grad.len() != w.value().len() {
                    return Err(MlErr::SizeMismatch {
                        what: "gradient",
                        got: grad.len(),
                        expected: w.value().len(),
                    });
                }

                let grad = grad.as_standard_layout();
                let grad = grad.as_slice().ok_or(MlErr::NonContiguous { what: "gradient" })?;
                let value = w
                    .value_mut()
                    .as_slice_mut()
                    .ok_or(MlErr::NonContiguous { what: "weight" })?;

                update(i, grad, value)?;

                if let Some(constraint) = w.constraint().copied() {
                    constraint.apply(w.value_mut());
                }
            }
        }

        Ok(())
    }

    fn summary(&self, input_shape: &[usize]) -> Result<Vec<LayerSummary>> {
        let mut shape = input_shape.to_vec();
        let mut summary = Vec::with_capacity(self.layers.len());

        for (layer, name) in self.layers.iter().zip(&self.names) {
            shape = layer.output_shape(&shape)?;

            let weights = layer
                .weights()
                .iter()
                .map(|w| WeightSummary {
                    name: w.name(),
                    shape: w.shape().to_vec(),
                    trainable: w.trainable(),
                })
                .collect();

            summary.push(LayerSummary {
                name: name.clone(),
                kind: layer.kind(),
                output_shape: shape.clone(),
                trainable: layer.trainable(),
                weights,
            });
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{IxDyn, array};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::arch::{Constraint, layers::QuantOptions};

    fn model(rng: &mut StdRng) -> Sequential {
        let options = QuantOptions {
            kernel_constraint: Some(Constraint::weight_clip()),
            ..Default::default()
        };

        Sequential::new([
            Layer::quant_conv2d(1, 2, (2, 2), options, rng).unwrap(),
            Layer::max_pool2d((2, 2)),
            Layer::batch_norm(2, true),
            Layer::flatten(),
            Layer::quant_dense((2, 3), options, rng).unwrap(),
            Layer::batch_norm(3, true),
            Layer::softmax(),
        ])
    }

    #[test]
    fn names_are_unique_per_kind() {
        let model = model(&mut StdRng::seed_from_u64(0));

        assert_eq!(
            model.names(),
            [
                "quant_conv2d",
                "max_pooling2d",
                "batch_normalization",
                "flatten",
                "quant_dense",
                "batch_normalization_1",
                "activation"
            ]
        );
    }

    #[test]
    fn get_weights_includes_non_trainable_tensors() {
        let model = model(&mut StdRng::seed_from_u64(0));
        let weights = model.get_weights();

        assert_eq!(weights.len(), 1 + 3 + 1 + 3);
        assert_eq!(weights[0].shape(), &[2, 2, 1, 2]);
        assert_eq!(weights[3].shape(), &[2]);
        assert_eq!(model.size(), 8 + 6 + 6 + 9);
    }

    #[test]
    fn set_weights_copies_every_tensor() {
        let src = model(&mut StdRng::seed_from_u64(1));
        let mut dst = model(&mut StdRng::seed_from_u64(2));
        assert_ne!(src.get_weights(), dst.get_weights());

        dst.set_weights(&src.get_weights()).unwrap();
        assert_eq!(src.get_weights(), dst.get_weights());
    }

    #[test]
    fn set_weights_rejects_mismatches_without_modifying() {
        let mut model = model(&mut StdRng::seed_from_u64(0));
        let before = model.get_weights();

        let err = model.set_weights(&before[1..]);
        assert!(matches!(err, Err(MlErr::WeightCountMismatch { got: 7, expected: 8 })));

        let mut wrong = before.clone();
        wrong[4] = ArrayD::zeros(IxDyn(&[3, 2]));
        wrong[0] = ArrayD::zeros(IxDyn(&[2, 2, 1, 2]));
        let err = model.set_weights(&wrong);
        assert!(matches!(err, Err(MlErr::ShapeMismatch { .. })));
        assert_eq!(model.get_weights(), before);
    }

    #[test]
    fn forward_and_summary_agree_on_shapes() {
        let mut model = model(&mut StdRng::seed_from_u64(0));
        let x = ArrayD::ones(IxDyn(&[4, 3, 3, 1]));

        let y = model.forward(x, true).unwrap();
        let summary = model.summary(&[4, 3, 3, 1]).unwrap();

        assert_eq!(y.shape(), &[4, 3]);
        assert_eq!(summary.last().unwrap().output_shape, [4, 3]);
        assert_eq!(summary[3].output_shape, [4, 2]);
    }

    #[test]
    fn logit_gradients_skip_the_final_softmax() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut model = Sequential::new([
            Layer::quant_dense((2, 2), QuantOptions::default(), &mut rng).unwrap(),
            Layer::softmax(),
        ]);
        model
            .set_weights(&[array![[1., 0.], [0., 1.]].into_dyn()])
            .unwrap();
        assert!(model.ends_in_softmax());

        model.forward(array![[3., -2.]].into_dyn(), true).unwrap();
        let dx = model.backward_from_logits(array![[0.5, -0.5]].into_dyn()).unwrap();
        assert_eq!(dx, array![[0.5, -0.5]].into_dyn());

        let mut headless = Sequential::new([Layer::flatten()]);
        assert!(!headless.ends_in_softmax());
        let err = headless.backward_from_logits(array![[1.]].into_dyn());
        assert!(matches!(err, Err(MlErr::NoSoftmaxOutput)));
    }

    #[test]
    fn apply_gradients_skips_frozen_weights_and_clips_kernels() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut model = Sequential::new([
            Layer::quant_dense(
                (2, 1),
                QuantOptions {
                    kernel_constraint: Some(Constraint::weight_clip()),
                    ..Default::default()
                },
                &mut rng,
            )
            .unwrap(),
            Layer::batch_norm(1, false),
        ]);

        model.forward(array![[1., 1.], [2., 3.]].into_dyn(), true).unwrap();
        model.backward(array![[1.], [1.]].into_dyn()).unwrap();

        let mut visited = vec![];
        model
            .apply_gradients(|i, _grad, weights| {
                visited.push(i);
                weights.iter_mut().for_each(|w| *w -= 10.);
                Ok(())
            })
            .unwrap();

        assert_eq!(visited, [0]);
        assert!(model.get_weights()[0].iter().all(|&w| w == -1.));
    }
}
