use ndarray::{Array1, Array2};
use serde::Serialize;
use tracing::debug;

use super::{Gmm, VAR_CEILING, VAR_FLOOR};
use crate::error::{Result, VprError};
use crate::features::FeatureMatrix;
use crate::kernels::{log_add, LOGZERO};

/// Upper bound on EM iterations.
pub const MAX_ITERATIONS: usize = 10;
/// Relative change in average log-likelihood below which EM stops.
pub const CONVERGENCE_THRESHOLD: f64 = 1e-5;

/// Outcome of an [`Gmm::em`] run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmReport {
    pub iterations: usize,
    /// Average per-frame log-likelihood measured in the last iteration,
    /// i.e. under the parameters that iteration started from.
    pub average_log_likelihood: f64,
    /// Average log-likelihood of every iteration, oldest first.
    pub history: Vec<f64>,
    pub converged: bool,
}

/// True once the relative change `|Δ / (previous + 0.01)|` is no longer
/// above [`CONVERGENCE_THRESHOLD`]. An undefined ratio (0/0) counts as
/// converged; an infinite one does not.
fn has_converged(previous: f64, current: f64) -> bool {
    let change = ((current - previous) / (previous + 0.01)).abs();
    !(change > CONVERGENCE_THRESHOLD)
}

/// Sufficient statistics gathered by one E-step.
struct Accumulators {
    occupancy: Array1<f64>,
    first: Array2<f64>,
    second: Array2<f64>,
    total_log_likelihood: f64,
}

impl Gmm {
    /// Re-estimates weights, means and variances on `features` until the
    /// average log-likelihood settles or [`MAX_ITERATIONS`] is reached.
    ///
    /// # Panics
    ///
    /// Panics when the model holds no parameters.
    pub fn em(&mut self, features: &FeatureMatrix, mixtures: usize) -> Result<EmReport> {
        assert!(self.is_loaded(), "gaussian mixture model not loaded");
        if mixtures != self.mixtures() {
            return Err(VprError::InvalidParam(format!(
                "em asked for {mixtures} mixtures, model has {}",
                self.mixtures()
            )));
        }
        if features.dim() != self.dim() {
            return Err(VprError::InvalidParam(format!(
                "feature dimension {} differs from model dimension {}",
                features.dim(),
                self.dim()
            )));
        }
        if features.is_empty() {
            return Err(VprError::NoAvailableData);
        }

        let mut iterations = 0;
        let mut average = 0.0;
        let mut history = Vec::with_capacity(MAX_ITERATIONS);
        let converged = loop {
            let previous = average;
            let stats = self.expectation(features);
            average = stats.total_log_likelihood / features.frames() as f64;
            self.maximisation(&stats, features.frames())?;
            iterations += 1;
            history.push(average);
            debug!(
                iteration = iterations,
                average_log_likelihood = average,
                increment = average - previous,
                "em iteration"
            );
            if has_converged(previous, average) {
                break true;
            }
            if iterations >= MAX_ITERATIONS {
                break false;
            }
        };

        if converged {
            debug!(iterations, "em converged");
        } else {
            debug!(iterations, "em stopped at iteration limit");
        }
        Ok(EmReport {
            iterations,
            average_log_likelihood: average,
            history,
            converged,
        })
    }

    fn expectation(&self, features: &FeatureMatrix) -> Accumulators {
        let mixtures = self.mixtures();
        let dim = self.dim();
        let log_weights = self.log_weights();
        let mut stats = Accumulators {
            occupancy: Array1::zeros(mixtures),
            first: Array2::zeros((mixtures, dim)),
            second: Array2::zeros((mixtures, dim)),
            total_log_likelihood: 0.0,
        };
        let mut gamma = vec![0.0; mixtures];
        for t in 0..features.frames() {
            let frame = features.row(t);
            let mut frame_log_likelihood = LOGZERO;
            for (m, g) in gamma.iter_mut().enumerate() {
                *g = self.log_likelihood_of_mixture(frame, m) + log_weights[m];
                frame_log_likelihood = log_add(*g, frame_log_likelihood);
            }
            stats.total_log_likelihood += frame_log_likelihood;

            for (m, g) in gamma.iter().enumerate() {
                let posterior = (g - frame_log_likelihood).exp();
                stats.occupancy[m] += posterior;
                let mut first = stats.first.row_mut(m);
                let mut second = stats.second.row_mut(m);
                for (k, &x) in frame.iter().enumerate() {
                    let x = x as f64;
                    first[k] += posterior * x;
                    second[k] += posterior * x * x;
                }
            }
        }
        stats
    }

    fn maximisation(&mut self, stats: &Accumulators, frames: usize) -> Result<()> {
        if let Some(mixture) = stats.occupancy.iter().position(|&occ| occ == 0.0) {
            return Err(VprError::EmptyMixture { mixture });
        }
        for m in 0..self.mixtures() {
            let occupancy = stats.occupancy[m];
            self.weights[m] = occupancy / frames as f64;
            for k in 0..self.dim() {
                let mean = stats.first[[m, k]] / occupancy;
                let variance = stats.second[[m, k]] / occupancy - mean * mean;
                self.means[[m, k]] = mean;
                self.variances[[m, k]] = variance.clamp(VAR_FLOOR, VAR_CEILING);
            }
        }
        self.refresh_log_det();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn zero_responsibility_mixture_fails() {
        // the second mixture sits so far away that its posterior underflows
        let mut gmm = Gmm::from_parts(
            array![0.5, 0.5],
            array![[0.0], [1.0e6]],
            array![[1.0], [0.005]],
        )
        .unwrap();
        let features = FeatureMatrix::from_rows(&[vec![0.1], vec![-0.2], vec![0.3]]).unwrap();
        let err = gmm.em(&features, 2).unwrap_err();
        assert!(matches!(err, VprError::EmptyMixture { mixture: 1 }));
    }

    #[test]
    fn mismatched_mixture_count_is_rejected() {
        let mut gmm = Gmm::new(2, 1);
        let features = FeatureMatrix::from_rows(&[vec![0.0]]).unwrap();
        assert!(matches!(
            gmm.em(&features, 3),
            Err(VprError::InvalidParam(_))
        ));
    }

    #[test]
    fn convergence_check_handles_zero_denominator() {
        assert!(has_converged(-0.01, -0.01));
        assert!(!has_converged(-0.01, 3.0));
        assert!(has_converged(-5.0, -5.0 + 1e-6));
        assert!(!has_converged(-5.0, -4.0));
    }

    #[test]
    fn single_gaussian_recovers_sample_moments() {
        let mut gmm = Gmm::new(1, 1);
        let rows: Vec<Vec<f32>> = [1.0f32, 2.0, 3.0, 4.0].iter().map(|v| vec![*v]).collect();
        let features = FeatureMatrix::from_rows(&rows).unwrap();
        let report = gmm.em(&features, 1).unwrap();
        assert!(report.converged);
        assert_eq!(report.history.len(), report.iterations);
        assert!((gmm.means()[[0, 0]] - 2.5).abs() < 1e-12);
        assert!((gmm.variances()[[0, 0]] - 1.25).abs() < 1e-12);
        assert!((gmm.weights()[0] - 1.0).abs() < 1e-12);
    }
}
