use std::cmp::Ordering;

use super::Gmm;
use crate::features::FeatureMatrix;
use crate::kernels::{log_add, LOGZERO};

/// A mixture index together with its weighted log density for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Ranked {
    index: usize,
    score: f64,
}

impl Ranked {
    /// Higher scores first; equal scores keep the lower index first.
    fn rank(&self, other: &Ranked) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then(self.index.cmp(&other.index))
    }
}

impl Gmm {
    /// Indices of the `top` best-scoring mixtures for every frame, best first.
    ///
    /// # Panics
    ///
    /// Panics when the model holds no parameters.
    pub fn top_mixtures(&self, features: &FeatureMatrix, top: usize) -> Vec<Vec<usize>> {
        assert!(self.is_loaded(), "gaussian mixture model not loaded");
        let log_weights = self.log_weights();
        let top = top.min(self.mixtures());
        (0..features.frames())
            .map(|t| {
                let frame = features.row(t);
                let mut ranked: Vec<Ranked> = log_weights
                    .iter()
                    .enumerate()
                    .map(|(index, lw)| Ranked {
                        index,
                        score: self.log_likelihood_of_mixture(frame, index) + lw,
                    })
                    .collect();
                ranked.sort_by(Ranked::rank);
                ranked.into_iter().take(top).map(|r| r.index).collect()
            })
            .collect()
    }

    /// Log-likelihood of every frame restricted to the mixtures in
    /// `selection[frame]`.
    ///
    /// # Panics
    ///
    /// Panics when the model holds no parameters or `selection` does not
    /// cover every frame.
    pub fn log_likelihood_top(&self, features: &FeatureMatrix, selection: &[Vec<usize>]) -> f64 {
        assert!(self.is_loaded(), "gaussian mixture model not loaded");
        assert_eq!(
            selection.len(),
            features.frames(),
            "mixture selection must cover every frame"
        );
        let log_weights = self.log_weights();
        selection
            .iter()
            .enumerate()
            .map(|(t, indices)| {
                let frame = features.row(t);
                indices.iter().fold(LOGZERO, |acc, &m| {
                    log_add(self.log_likelihood_of_mixture(frame, m) + log_weights[m], acc)
                })
            })
            .sum()
    }
}
