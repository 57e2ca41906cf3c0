use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// A projection applied to a kernel after every optimizer step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// Clips every weight into `[-clip_value, clip_value]`.
    WeightClip { clip_value: f32 },
}

impl Constraint {
    pub fn weight_clip() -> Self {
        Self::WeightClip { clip_value: 1.0 }
    }

    pub fn apply(&self, w: &mut ArrayD<f32>) {
        match *self {
            Self::WeightClip { clip_value } => {
                w.mapv_inplace(|w| w.clamp(-clip_value, clip_value));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn weight_clip_projects_into_range() {
        let mut w = arr1(&[-3.0, -1.0, 0.5, 1.2]).into_dyn();
        Constraint::weight_clip().apply(&mut w);
        assert_eq!(w, arr1(&[-1.0, -1.0, 0.5, 1.0]).into_dyn());
    }
}
