use ndarray::{s, Array2, Axis};

use crate::config::FeatureConfig;
use crate::error::{Result, VprError};

/// Regression deltas over `window` frames on each side, clamping indices at
/// the edges. With `polish` the offsets are weighted `(W-k+1)/k` instead of
/// `k`.
pub(crate) fn regression_deltas(
    input: &Array2<f32>,
    window: usize,
    polish: bool,
) -> Result<Array2<f32>> {
    let frames = input.len_of(Axis(0));
    let required = 2 * window + 1;
    if frames < required {
        return Err(VprError::InsufficientFrames { frames, required });
    }
    let (weights, denominator) = regression_weights(window, polish);
    let last = frames - 1;
    let mut output = Array2::zeros(input.raw_dim());
    for t in 0..frames {
        let mut row = output.row_mut(t);
        for (k, weight) in (1..=window).zip(weights.iter()) {
            let next = input.row((t + k).min(last));
            let prev = input.row(t.saturating_sub(k));
            row.zip_mut_with(&(&next - &prev), |acc, diff| *acc += weight * diff);
        }
        row.mapv_inplace(|v| v / denominator);
    }
    Ok(output)
}

fn regression_weights(window: usize, polish: bool) -> (Vec<f32>, f32) {
    if polish {
        let weights = (1..=window)
            .map(|k| (window - k + 1) as f32 / k as f32)
            .collect();
        let denominator = 2.0 * (1..=window).map(|k| (window - k + 1) as f32).sum::<f32>();
        (weights, denominator)
    } else {
        let weights = (1..=window).map(|k| k as f32).collect();
        let denominator = 2.0 * (1..=window).map(|k| (k * k) as f32).sum::<f32>();
        (weights, denominator)
    }
}

/// Concatenates the selected coefficient groups of every frame.
///
/// `cepstra` holds `c0..=c_order` per frame. Each derivative order trims
/// `delta_window` frames from both ends so that every kept frame has a full
/// regression context.
pub(crate) fn assemble(cepstra: &Array2<f32>, config: &FeatureConfig) -> Result<Array2<f32>> {
    let frames = cepstra.len_of(Axis(0));
    let window = config.delta_window;
    let delta = if config.needs_delta() {
        Some(regression_deltas(cepstra, window, config.polish_diff)?)
    } else {
        None
    };
    let accel = match (&delta, config.needs_accel()) {
        (Some(delta), true) => Some(regression_deltas(delta, window, config.polish_diff)?),
        _ => None,
    };
    let orders = usize::from(delta.is_some()) + usize::from(accel.is_some());
    let offset = window * orders;
    if frames <= 2 * offset {
        return Err(VprError::InsufficientFrames {
            frames,
            required: 2 * offset + 1,
        });
    }
    let kept = frames - 2 * offset;

    let mut groups = Vec::with_capacity(3);
    groups.push((cepstra, config.static_c0, config.static_coeffs));
    if let Some(delta) = &delta {
        groups.push((delta, config.delta_c0, config.delta_coeffs));
    }
    if let Some(accel) = &accel {
        groups.push((accel, config.accel_c0, config.accel_coeffs));
    }

    let mut output = Array2::zeros((kept, config.output_width()));
    let mut column = 0;
    for (source, with_c0, with_coeffs) in groups {
        let span = source.slice(s![offset..offset + kept, ..]);
        if with_c0 {
            output.column_mut(column).assign(&span.column(0));
            column += 1;
        }
        if with_coeffs {
            let order = config.mfcc_order;
            output
                .slice_mut(s![.., column..column + order])
                .assign(&span.slice(s![.., 1..=order]));
            column += order;
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ramp(frames: usize, width: usize) -> Array2<f32> {
        Array2::from_shape_fn((frames, width), |(t, c)| (t * (c + 1)) as f32)
    }

    #[test]
    fn ramp_has_constant_slope_in_the_interior() {
        let input = ramp(12, 3);
        let deltas = regression_deltas(&input, 2, false).unwrap();
        for t in 2..10 {
            for c in 0..3 {
                assert_abs_diff_eq!(deltas[[t, c]], (c + 1) as f32, epsilon = 1e-6);
            }
        }
        assert!(deltas[[0, 0]] < 1.0);
    }

    #[test]
    fn polished_weights_also_recover_slope() {
        let input = ramp(12, 1);
        let deltas = regression_deltas(&input, 3, true).unwrap();
        // (3*2 + 1*4 + 6/3) / (2 * (3 + 2 + 1)) = 1
        assert_abs_diff_eq!(deltas[[6, 0]], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn short_input_is_rejected() {
        let input = ramp(4, 2);
        let err = regression_deltas(&input, 2, false).unwrap_err();
        assert!(matches!(
            err,
            VprError::InsufficientFrames {
                frames: 4,
                required: 5
            }
        ));
    }

    #[test]
    fn default_layout_is_static_then_delta() {
        let config = FeatureConfig::default();
        let cepstra = ramp(20, config.mfcc_order + 1);
        let out = assemble(&cepstra, &config).unwrap();
        assert_eq!(out.dim(), (16, 32));
        // first kept frame is frame 2; static c1 = 2 * 2
        assert_eq!(out[[0, 0]], 4.0);
        assert_abs_diff_eq!(out[[0, 16]], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn accel_trims_two_windows() {
        let config = FeatureConfig {
            accel_coeffs: true,
            static_c0: true,
            ..FeatureConfig::default()
        };
        let cepstra = ramp(20, config.mfcc_order + 1);
        let out = assemble(&cepstra, &config).unwrap();
        assert_eq!(out.dim(), (12, 49));
        assert_eq!(out[[0, 0]], 4.0);
        // accel of a ramp vanishes away from the edges
        assert_abs_diff_eq!(out[[5, 48]], 0.0, epsilon = 1e-5);
    }

    #[test]
    fn static_only_keeps_every_frame() {
        let config = FeatureConfig {
            delta_coeffs: false,
            ..FeatureConfig::default()
        };
        let cepstra = ramp(3, config.mfcc_order + 1);
        let out = assemble(&cepstra, &config).unwrap();
        assert_eq!(out.dim(), (3, 16));
    }
}
