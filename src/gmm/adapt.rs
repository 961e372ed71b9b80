use super::Gmm;
use crate::error::{Result, VprError};

/// Relevance-MAP update of the speaker means.
///
/// `observed` is the UBM copy after EM on the enrollment frames; its weights
/// times `frames` give each mixture's soft count. Every speaker mean moves
/// towards the observed mean in proportion to that count against
/// `relevance`.
pub fn map_adapt_means(
    speaker: &mut Gmm,
    observed: &Gmm,
    frames: usize,
    relevance: f64,
) -> Result<()> {
    if speaker.means.dim() != observed.means.dim() {
        return Err(VprError::InvalidParam(format!(
            "speaker model {:?} and observed model {:?} differ in shape",
            speaker.means.dim(),
            observed.means.dim()
        )));
    }
    let frames = frames as f64;
    for (m, (mut speaker_mean, observed_mean)) in speaker
        .means
        .outer_iter_mut()
        .zip(observed.means.outer_iter())
        .enumerate()
    {
        let count = frames * observed.weights[m];
        let denominator = count + relevance;
        if denominator <= 0.0 {
            continue;
        }
        speaker_mean.zip_mut_with(&observed_mean, |prior, &data| {
            *prior = (count * data + relevance * *prior) / denominator;
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn blends_by_soft_count() {
        let mut speaker = Gmm::from_parts(
            array![0.5, 0.5],
            array![[0.0, 0.0], [1.0, 1.0]],
            array![[1.0, 1.0], [1.0, 1.0]],
        )
        .unwrap();
        let observed = Gmm::from_parts(
            array![0.8, 0.2],
            array![[2.0, -2.0], [3.0, 3.0]],
            array![[1.0, 1.0], [1.0, 1.0]],
        )
        .unwrap();
        map_adapt_means(&mut speaker, &observed, 100, 16.0).unwrap();
        // mixture 0: count 80, (80*2 + 16*0) / 96
        assert_abs_diff_eq!(speaker.means()[[0, 0]], 160.0 / 96.0, epsilon = 1e-12);
        // mixture 1: count 20, (20*3 + 16*1) / 36
        assert_abs_diff_eq!(speaker.means()[[1, 1]], 76.0 / 36.0, epsilon = 1e-12);
        // variances and weights stay with the prior
        assert_eq!(speaker.weights()[0], 0.5);
    }

    #[test]
    fn zero_relevance_copies_observed_means() {
        let mut speaker = Gmm::new(1, 2);
        let observed =
            Gmm::from_parts(array![1.0], array![[4.0, 5.0]], array![[1.0, 1.0]]).unwrap();
        map_adapt_means(&mut speaker, &observed, 10, 0.0).unwrap();
        assert_eq!(speaker.means(), observed.means());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let mut speaker = Gmm::new(2, 2);
        let observed = Gmm::new(2, 3);
        assert!(map_adapt_means(&mut speaker, &observed, 10, 16.0).is_err());
    }
}
