use ndarray::{Array1, Array2, Axis};
use tracing::debug;

use super::{Gmm, VAR_CEILING, VAR_FLOOR};
use crate::error::{Result, VprError};
use crate::features::FeatureMatrix;

impl Gmm {
    /// Deterministic starting point for UBM training.
    ///
    /// Means are taken from frames spread evenly across `features`, every
    /// mixture shares the clamped global variance and weights are uniform.
    /// Run [`Gmm::em`] afterwards to refine it.
    pub fn from_features(features: &FeatureMatrix, mixtures: usize) -> Result<Self> {
        if mixtures == 0 {
            return Err(VprError::InvalidParam("mixture count must be positive".into()));
        }
        let frames = features.frames();
        if frames < mixtures {
            return Err(VprError::InsufficientFrames {
                frames,
                required: mixtures,
            });
        }
        let data = features.as_array().mapv(f64::from);
        let dim = features.dim();
        let variance = data
            .var_axis(Axis(0), 0.0)
            .mapv(|v| v.clamp(VAR_FLOOR, VAR_CEILING));

        let mut means = Array2::zeros((mixtures, dim));
        for (m, mut row) in means.outer_iter_mut().enumerate() {
            let frame = (2 * m + 1) * frames / (2 * mixtures);
            row.assign(&data.row(frame));
        }
        let variances = Array2::from_shape_fn((mixtures, dim), |(_, k)| variance[k]);
        let weights = Array1::from_elem(mixtures, 1.0 / mixtures as f64);
        debug!(mixtures, dim, frames, "seeded model from evenly spaced frames");
        Gmm::from_parts(weights, means, variances)
    }
}
