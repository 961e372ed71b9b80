use ndarray::{Array2, Axis};

use crate::config::DB_NORM_LEVEL;

const PCM_PEAK: f32 = 32_767.0;

/// Removes the DC offset and re-quantises the signal to the 16-bit grid.
pub(crate) fn zero_global_mean(signal: &mut [f32]) {
    if signal.is_empty() {
        return;
    }
    let mean = signal.iter().map(|&s| s as f64).sum::<f64>() / signal.len() as f64;
    for sample in signal.iter_mut() {
        let centred = (*sample as f64 - mean).clamp(-(PCM_PEAK as f64), PCM_PEAK as f64);
        *sample = centred.round() as i16 as f32;
    }
}

/// Scales the signal so its largest sample sits at [`DB_NORM_LEVEL`] dBFS.
///
/// Signals whose maximum is not positive (silence or all-negative input) are
/// left untouched.
pub(crate) fn db_norm(signal: &mut [f32]) {
    let peak = signal.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if peak <= 0.0 {
        return;
    }
    let gain = (10f64.powf(DB_NORM_LEVEL / 20.0) * PCM_PEAK as f64 / peak as f64) as f32;
    signal.iter_mut().for_each(|s| *s *= gain);
}

/// Cepstral mean subtraction and variance normalisation over the lower half
/// of the feature dimensions. The upper half is passed through unchanged.
pub(crate) fn cms_cvn(features: &mut Array2<f32>) {
    let frames = features.len_of(Axis(0));
    if frames == 0 {
        return;
    }
    let half = features.len_of(Axis(1)) / 2;
    for mut column in features.axis_iter_mut(Axis(1)).take(half) {
        let mean = column.iter().sum::<f32>() / frames as f32;
        let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / frames as f32;
        let std_dev = variance.sqrt();
        let std_dev = if std_dev > 0.0 { std_dev } else { 1.0 };
        column.mapv_inplace(|v| (v - mean) / std_dev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn zero_mean_recentres_and_rounds() {
        let mut signal = vec![10.0, 12.0, 15.0, 11.0];
        zero_global_mean(&mut signal);
        // mean 12: -2, 0, 3, -1
        assert_eq!(signal, vec![-2.0, 0.0, 3.0, -1.0]);
    }

    #[test]
    fn zero_mean_rounds_half_away_from_zero() {
        let mut signal = vec![0.0, 1.0];
        zero_global_mean(&mut signal);
        assert_eq!(signal, vec![-1.0, 1.0]);
    }

    #[test]
    fn db_norm_scales_peak_to_minus_three_db() {
        let mut signal = vec![100.0, -50.0, 200.0];
        db_norm(&mut signal);
        let target = 10f32.powf(-3.0 / 20.0) * PCM_PEAK;
        assert_abs_diff_eq!(signal[2], target, epsilon = 0.05);
        assert_abs_diff_eq!(signal[0], target / 2.0, epsilon = 0.05);
    }

    #[test]
    fn db_norm_ignores_silence() {
        let mut signal = vec![0.0; 16];
        db_norm(&mut signal);
        assert!(signal.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn cms_cvn_touches_only_lower_half() {
        let mut features = array![[1.0, 2.0, 5.0, 7.0], [3.0, 2.0, 9.0, 1.0]];
        cms_cvn(&mut features);
        assert_abs_diff_eq!(features[[0, 0]], -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(features[[1, 0]], 1.0, epsilon = 1e-6);
        // constant column keeps unit divisor
        assert_abs_diff_eq!(features[[0, 1]], 0.0, epsilon = 1e-6);
        assert_eq!(features[[0, 2]], 5.0);
        assert_eq!(features[[1, 3]], 1.0);
    }
}
