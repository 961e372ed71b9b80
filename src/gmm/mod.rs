//! Diagonal-covariance Gaussian mixture models.

mod adapt;
mod em;
mod init;
mod io;
mod topn;

use std::f64::consts::PI;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::Serialize;

use crate::error::{Result, VprError};
use crate::features::FeatureMatrix;
use crate::kernels::{log_add, LOGZERO};

pub use adapt::map_adapt_means;
pub use em::{EmReport, CONVERGENCE_THRESHOLD, MAX_ITERATIONS};

/// Lower clamp applied to every variance after re-estimation.
pub const VAR_FLOOR: f64 = 0.005;
/// Upper clamp applied to every variance after re-estimation.
pub const VAR_CEILING: f64 = 10.0;

/// Gaussian mixture with diagonal covariances.
///
/// All parameter arrays are allocated together and share the
/// `mixtures × dim` shape. `log_det` caches `Σ ln(variance)` per mixture and
/// is refreshed whenever variances change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gmm {
    weights: Array1<f64>,
    means: Array2<f64>,
    variances: Array2<f64>,
    log_det: Array1<f64>,
}

/// Serializable overview of a model, used by `voiceprint inspect`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub mixtures: usize,
    pub dim: usize,
    pub weight_sum: f64,
    pub min_weight: f64,
    pub max_weight: f64,
    pub min_variance: f64,
    pub max_variance: f64,
}

impl Gmm {
    /// Model with uniform weights, zero means and unit variances.
    pub fn new(mixtures: usize, dim: usize) -> Self {
        let weight = if mixtures == 0 {
            0.0
        } else {
            1.0 / mixtures as f64
        };
        Self {
            weights: Array1::from_elem(mixtures, weight),
            means: Array2::zeros((mixtures, dim)),
            variances: Array2::ones((mixtures, dim)),
            log_det: Array1::zeros(mixtures),
        }
    }

    pub fn from_parts(
        weights: Array1<f64>,
        means: Array2<f64>,
        variances: Array2<f64>,
    ) -> Result<Self> {
        let mixtures = weights.len();
        if means.dim() != variances.dim() || means.len_of(Axis(0)) != mixtures {
            return Err(VprError::ModelFormat(format!(
                "shape mismatch: {} weights, means {:?}, variances {:?}",
                mixtures,
                means.dim(),
                variances.dim()
            )));
        }
        if let Some(bad) = variances.iter().find(|v| v.is_nan() || **v <= 0.0) {
            return Err(VprError::ModelFormat(format!(
                "variances must be positive, found {bad}"
            )));
        }
        let mut gmm = Self {
            weights,
            means,
            variances,
            log_det: Array1::zeros(mixtures),
        };
        gmm.refresh_log_det();
        Ok(gmm)
    }

    /// Deep copy of `source`, used to obtain a trainable copy of the UBM.
    pub fn dup_model(source: &Gmm) -> Self {
        source.clone()
    }

    pub fn mixtures(&self) -> usize {
        self.weights.len()
    }

    pub fn dim(&self) -> usize {
        self.means.len_of(Axis(1))
    }

    pub fn is_loaded(&self) -> bool {
        self.mixtures() > 0 && self.dim() > 0
    }

    pub fn weights(&self) -> ArrayView1<'_, f64> {
        self.weights.view()
    }

    pub fn means(&self) -> ArrayView2<'_, f64> {
        self.means.view()
    }

    pub fn variances(&self) -> ArrayView2<'_, f64> {
        self.variances.view()
    }

    pub fn log_det(&self) -> ArrayView1<'_, f64> {
        self.log_det.view()
    }

    pub(crate) fn refresh_log_det(&mut self) {
        for (det, row) in self.log_det.iter_mut().zip(self.variances.outer_iter()) {
            *det = row.iter().map(|v| v.ln()).sum();
        }
    }

    pub(crate) fn log_weights(&self) -> Vec<f64> {
        self.weights
            .iter()
            .map(|&w| if w <= 0.0 { LOGZERO } else { w.ln() })
            .collect()
    }

    fn assert_loaded(&self) {
        assert!(self.is_loaded(), "gaussian mixture model not loaded");
    }

    /// Log density of `frame` under mixture `mixture`, without the weight.
    ///
    /// # Panics
    ///
    /// Panics when the model holds no parameters.
    pub fn log_likelihood_of_mixture(&self, frame: ArrayView1<'_, f32>, mixture: usize) -> f64 {
        self.assert_loaded();
        let mean = self.means.row(mixture);
        let variance = self.variances.row(mixture);
        let mahalanobis: f64 = frame
            .iter()
            .zip(mean.iter().zip(variance.iter()))
            .map(|(&x, (&m, &v))| {
                let diff = x as f64 - m;
                diff * diff / v
            })
            .sum();
        let dim = self.dim() as f64;
        let density = -0.5 * (dim * (2.0 * PI).ln() + self.log_det[mixture] + mahalanobis);
        density.max(LOGZERO)
    }

    /// Weighted log density of one frame, summed over every mixture.
    pub(crate) fn frame_log_likelihood(
        &self,
        frame: ArrayView1<'_, f32>,
        log_weights: &[f64],
    ) -> f64 {
        log_weights
            .iter()
            .enumerate()
            .fold(LOGZERO, |acc, (m, lw)| {
                log_add(self.log_likelihood_of_mixture(frame, m) + lw, acc)
            })
    }

    /// Total log-likelihood of frames `start..start + len`.
    ///
    /// # Panics
    ///
    /// Panics when the model holds no parameters, the feature width differs
    /// from the model, or the range exceeds the matrix.
    pub fn log_likelihood(&self, features: &FeatureMatrix, start: usize, len: usize) -> f64 {
        self.assert_loaded();
        assert_eq!(features.dim(), self.dim(), "feature width differs from model");
        assert!(start + len <= features.frames(), "frame range out of bounds");
        let log_weights = self.log_weights();
        (start..start + len)
            .map(|t| self.frame_log_likelihood(features.row(t), &log_weights))
            .sum()
    }

    pub fn summary(&self) -> ModelSummary {
        let fold_min = |a: f64, b: f64| a.min(b);
        let fold_max = |a: f64, b: f64| a.max(b);
        ModelSummary {
            mixtures: self.mixtures(),
            dim: self.dim(),
            weight_sum: self.weights.sum(),
            min_weight: self.weights.iter().copied().fold(f64::INFINITY, fold_min),
            max_weight: self.weights.iter().copied().fold(f64::NEG_INFINITY, fold_max),
            min_variance: self.variances.iter().copied().fold(f64::INFINITY, fold_min),
            max_variance: self.variances.iter().copied().fold(f64::NEG_INFINITY, fold_max),
        }
    }
}
