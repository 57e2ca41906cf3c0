use log::warn;
use machine_learning::arch::Sequential;

/// Checks whether two models hold exactly the same weights, layer by layer.
///
/// A structural difference (amount of layers or of weight tensors in a layer) is reported and
/// makes the models unequal. The weight count of batch normalization layers is checked even
/// when `ignore_bn` skips their values.
pub fn are_layers_equal(m1: &Sequential, m2: &Sequential, ignore_bn: bool) -> bool {
    if m1.layers().len() != m2.layers().len() {
        warn!("models layer length not equal");
        return false;
    }

    for (l1, l2) in m1.layers().iter().zip(m2.layers()) {
        if l1.weights().len() != l2.weights().len() {
            warn!("model weight length not equal");
            return false;
        }

        if ignore_bn && l1.is_batch_norm() {
            continue;
        }

        for (w1, w2) in l1.weights().iter().zip(l2.weights()) {
            if w1.value() != w2.value() {
                warn!("weights not equal");
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::layers::{Layer, QuantOptions};
    use ndarray::ArrayD;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn model(seed: u64, with_bn: bool) -> Sequential {
        let mut rng = StdRng::seed_from_u64(seed);
        let dense = |rng: &mut StdRng| Layer::quant_dense((3, 3), QuantOptions::default(), rng).unwrap();

        let mut layers = vec![dense(&mut rng)];
        if with_bn {
            layers.push(Layer::batch_norm(3, true));
        }
        layers.push(dense(&mut rng));

        Sequential::new(layers)
    }

    #[test]
    fn identical_models_are_equal() {
        assert!(are_layers_equal(&model(1, true), &model(1, true), false));
    }

    #[test]
    fn any_weight_difference_is_detected() {
        let m1 = model(1, true);
        let mut m2 = model(1, true);
        let mut weights = m2.get_weights();
        weights[4][[2, 1]] += 1e-6;
        m2.set_weights(&weights).unwrap();

        assert!(!are_layers_equal(&m1, &m2, false));
        assert!(!are_layers_equal(&m1, &m2, true));
        assert!(!are_layers_equal(&m1, &model(2, true), true));
    }

    #[test]
    fn batch_norm_differences_can_be_ignored() {
        let m1 = model(1, true);
        let mut m2 = model(1, true);
        let mut weights = m2.get_weights();
        weights[2] = ArrayD::from_elem(weights[2].raw_dim(), 0.5);
        m2.set_weights(&weights).unwrap();

        assert!(!are_layers_equal(&m1, &m2, false));
        assert!(are_layers_equal(&m1, &m2, true));
    }

    #[test]
    fn structural_differences_make_models_unequal() {
        assert!(!are_layers_equal(&model(1, true), &model(1, false), true));
    }
}
