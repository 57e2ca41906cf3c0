use log::debug;
use machine_learning::{
    MlErr,
    arch::{
        Constraint, Model, Quantizer, Sequential,
        layers::{Layer, QuantOptions},
    },
};
use rand::Rng;

use crate::cifar::{CHANNELS, CLASSES, IMAGE_SIZE};

/// The switches of the model built by `build_model`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelFlags {
    /// Whether the kernels past the first convolution are binarized.
    pub use_binary_weights: bool,
    /// Freezes every layer but the batch normalization ones.
    pub only_train_bn_layers: bool,
    /// Whether to add a batch normalization after every pooling, convolution and dense block.
    pub use_bn_layers: bool,
}

impl Default for ModelFlags {
    fn default() -> Self {
        Self {
            use_binary_weights: true,
            only_train_bn_layers: false,
            use_bn_layers: false,
        }
    }
}

/// Builds the convolutional network of the experiment for 32x32 RGB images and 10 classes.
///
/// The first convolution always binarizes its kernel and sees the raw input; the following
/// quantized layers binarize their inputs and, if `use_binary_weights`, their kernels. All
/// kernels are clipped into `[-1, 1]` after every update.
pub fn build_model<R: Rng>(flags: ModelFlags, rng: &mut R) -> Result<Sequential, MlErr> {
    let ModelFlags {
        use_binary_weights,
        only_train_bn_layers,
        use_bn_layers,
    } = flags;

    let first = QuantOptions {
        input_quantizer: None,
        kernel_quantizer: Some(Quantizer::ste_sign()),
        kernel_constraint: Some(Constraint::weight_clip()),
        trainable: !only_train_bn_layers,
    };
    let options = QuantOptions {
        input_quantizer: Some(Quantizer::ste_sign()),
        kernel_quantizer: use_binary_weights.then(Quantizer::ste_sign),
        ..first
    };

    let bn = |channels| use_bn_layers.then(|| Layer::batch_norm(channels, true));
    let spatial = ((IMAGE_SIZE - 2) / 2 - 2) / 2 - 2;

    let layers = [
        Some(Layer::quant_conv2d(CHANNELS, 32, (3, 3), first, rng)?),
        Some(Layer::max_pool2d((2, 2))),
        bn(32),
        Some(Layer::quant_conv2d(32, 64, (3, 3), options, rng)?),
        Some(Layer::max_pool2d((2, 2))),
        bn(64),
        Some(Layer::quant_conv2d(64, 64, (3, 3), options, rng)?),
        bn(64),
        Some(Layer::flatten()),
        Some(Layer::quant_dense((spatial * spatial * 64, 64), options, rng)?),
        bn(64),
        Some(Layer::quant_dense((64, CLASSES), options, rng)?),
        bn(CLASSES),
        Some(Layer::softmax()),
    ];

    let model = Sequential::new(layers.into_iter().flatten());
    debug!(
        "built model with {} layers and {} parameters: {flags:?}",
        model.layers().len(),
        model.size()
    );

    Ok(model)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn build(
        use_binary_weights: bool,
        only_train_bn_layers: bool,
        use_bn_layers: bool,
    ) -> Sequential {
        let flags = ModelFlags {
            use_binary_weights,
            only_train_bn_layers,
            use_bn_layers,
        };
        build_model(flags, &mut StdRng::seed_from_u64(0)).unwrap()
    }

    #[test]
    fn batch_norm_layers_follow_the_flag() {
        let with = build(true, false, true);
        let without = build(true, false, false);

        assert_eq!(with.layers().len(), 14);
        assert_eq!(with.get_weights().len(), 5 + 5 * 3);
        assert_eq!(with.layers().iter().filter(|l| l.is_batch_norm()).count(), 5);

        assert_eq!(without.layers().len(), 9);
        assert_eq!(without.get_weights().len(), 5);
        assert!(without.layers().iter().all(|l| !l.is_batch_norm()));

        assert_eq!(
            without.names(),
            [
                "quant_conv2d",
                "max_pooling2d",
                "quant_conv2d_1",
                "max_pooling2d_1",
                "quant_conv2d_2",
                "flatten",
                "quant_dense",
                "quant_dense_1",
                "activation"
            ]
        );
    }

    #[test]
    fn only_batch_norm_layers_stay_trainable() {
        let model = build(false, true, true);

        for layer in model.layers() {
            if layer.is_batch_norm() {
                assert!(layer.trainable());
            } else if !layer.weights().is_empty() {
                assert!(!layer.trainable());
                assert!(layer.weights().iter().all(|w| !w.trainable()));
            }
        }
    }

    #[test]
    fn kernel_quantizers_follow_the_flag() {
        let kernel_quantizers = |model: &Sequential| -> Vec<Option<Quantizer>> {
            model
                .layers()
                .iter()
                .filter_map(|layer| match layer {
                    Layer::QuantConv2d(l) => Some(l.options().kernel_quantizer),
                    Layer::QuantDense(l) => Some(l.options().kernel_quantizer),
                    _ => None,
                })
                .collect()
        };

        let binary = kernel_quantizers(&build(true, false, false));
        assert!(binary.iter().all(Option::is_some));

        let real = kernel_quantizers(&build(false, true, false));
        assert!(real[0].is_some());
        assert!(real[1..].iter().all(Option::is_none));
    }

    #[test]
    fn shapes_chain_from_images_to_classes() {
        let model = build(true, false, true);
        let summary = model.summary(&[2, IMAGE_SIZE, IMAGE_SIZE, CHANNELS]).unwrap();

        let flatten = summary.iter().find(|l| l.kind == "flatten").unwrap();
        assert_eq!(flatten.output_shape, [2, 1024]);
        assert_eq!(summary.last().unwrap().output_shape, [2, CLASSES]);
    }
}
