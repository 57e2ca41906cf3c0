use std::num::NonZeroUsize;

use ndarray::{ArrayD, Axis};
use rand::{Rng, seq::SliceRandom};

use crate::{MlErr, Result};

/// An in-memory labelled dataset. The first axis of `images` indexes the samples.
#[derive(Debug, Clone)]
pub struct Dataset {
    images: ArrayD<f32>,
    labels: Vec<usize>,
    order: Vec<usize>,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `images` - The samples, stacked along the first axis.
    /// * `labels` - One label per sample.
    ///
    /// # Returns
    /// The dataset or an error if the amount of labels differs from the amount of samples.
    pub fn new(images: ArrayD<f32>, labels: Vec<usize>) -> Result<Self> {
        let len = images.shape().first().copied().unwrap_or_default();

        if len != labels.len() {
            return Err(MlErr::SizeMismatch {
                what: "labels",
                got: labels.len(),
                expected: len,
            });
        }

        Ok(Self {
            images,
            labels,
            order: (0..len).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn images(&self) -> &ArrayD<f32> {
        &self.images
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// The shape of a single sample.
    pub fn sample_shape(&self) -> &[usize] {
        self.images.shape().get(1..).unwrap_or_default()
    }

    /// Shuffles the order in which `batches` yields the samples.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        self.order.shuffle(rng);
    }

    /// Iterates over the dataset in its current order. The last batch may be shorter.
    pub fn batches(
        &self,
        batch_size: NonZeroUsize,
    ) -> impl Iterator<Item = (ArrayD<f32>, Vec<usize>)> + '_ {
        self.order.chunks(batch_size.get()).map(|idx| {
            let x = self.images.select(Axis(0), idx);
            let y = idx.iter().map(|&i| self.labels[i]).collect();
            (x, y)
        })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array, IxDyn};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn dataset(n: usize) -> Dataset {
        let images = Array::from_shape_fn(IxDyn(&[n, 2]), |idx| (idx[0] * 10 + idx[1]) as f32);
        Dataset::new(images, (0..n).collect()).unwrap()
    }

    #[test]
    fn batches_cover_every_sample_once() {
        let mut ds = dataset(10);
        ds.shuffle(&mut StdRng::seed_from_u64(9));

        let batches: Vec<_> = ds.batches(NonZeroUsize::new(4).unwrap()).collect();
        assert_eq!(
            batches.iter().map(|(_, y)| y.len()).collect::<Vec<_>>(),
            [4, 4, 2]
        );

        let mut seen: Vec<_> = batches.iter().flat_map(|(_, y)| y.clone()).collect();
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());

        for (x, y) in &batches {
            for (row, &label) in x.axis_iter(Axis(0)).zip(y) {
                assert_eq!(row[[0]], (label * 10) as f32);
            }
        }
    }

    #[test]
    fn label_count_must_match() {
        let err = Dataset::new(ArrayD::zeros(IxDyn(&[3, 2])), vec![0, 1]);
        assert!(matches!(err, Err(MlErr::SizeMismatch { .. })));
    }
}
