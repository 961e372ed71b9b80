use std::f64::consts::{LN_10, PI};

use ndarray::{Array2, Axis};

use crate::error::{Result, VprError};

const WARP_TABLE_START: f64 = -10.0;
const WARP_TABLE_END: f64 = 10.0;
const WARP_TABLE_STEP: f64 = 1.0e-5;

/// Standard-normal quantiles for each rank in a window of `window` values.
///
/// Entry `i` holds the point where the normal CDF first reaches
/// `(window - 0.5 - i) / window`, so index 0 is the largest quantile.
pub(crate) fn warp_table(window: usize) -> Vec<f32> {
    let mut table = vec![0.0f32; window];
    if window == 0 {
        return table;
    }
    let ranks: Vec<f64> = (0..window)
        .map(|i| (window as f64 - 0.5 - i as f64) / window as f64)
        .collect();
    let norm = 1.0 / (2.0 * PI).sqrt();
    let steps = ((WARP_TABLE_END - WARP_TABLE_START) / WARP_TABLE_STEP) as usize;
    let mut integral = 0.0;
    let mut index = window;
    for step in 0..=steps {
        let x = WARP_TABLE_START + step as f64 * WARP_TABLE_STEP;
        integral += norm * (-0.5 * x * x).exp() * WARP_TABLE_STEP;
        if integral >= ranks[index - 1] {
            index -= 1;
            table[index] = x as f32;
            if index == 0 {
                break;
            }
        }
    }
    table
}

/// Short-time Gaussianisation: every value is replaced by the normal quantile
/// of its rank among the surrounding `window` frames.
///
/// Returns `frames - 2 * (window / 2)` frames.
pub(crate) fn feature_warping(features: &Array2<f32>, window: usize) -> Result<Array2<f32>> {
    let frames = features.len_of(Axis(0));
    if frames <= window {
        return Err(VprError::InsufficientFrames {
            frames,
            required: window + 1,
        });
    }
    let table = warp_table(window);
    let half = window / 2;
    let kept = frames - 2 * half;
    let mut output = Array2::zeros((kept, features.len_of(Axis(1))));
    for (out_index, i) in (half..frames - half).enumerate() {
        for (dim, column) in features.axis_iter(Axis(1)).enumerate() {
            let current = column[i];
            let below = (i - half..i)
                .chain(i + 1..i + half)
                .filter(|&m| column[m] < current)
                .count();
            output[[out_index, dim]] = table[2 * half - 1 - below];
        }
    }
    Ok(output)
}

/// RASTA band-pass filtering along time for every coefficient.
///
/// Returns four frames fewer than the input.
pub(crate) fn rasta(features: &Array2<f32>, coefficient: f32) -> Result<Array2<f32>> {
    let frames = features.len_of(Axis(0));
    if frames <= 4 {
        return Err(VprError::InsufficientFrames {
            frames,
            required: 5,
        });
    }
    let width = features.len_of(Axis(1));
    let mut output = Array2::<f32>::zeros((frames - 4, width));
    for i in 0..frames - 4 {
        for j in 0..width {
            let fir = 0.1
                * (2.0 * features[[i + 4, j]] + features[[i + 3, j]]
                    - features[[i + 1, j]]
                    - 2.0 * features[[i, j]]);
            let feedback = if i == 0 {
                0.0
            } else {
                coefficient * output[[i - 1, j]]
            };
            output[[i, j]] = fir + feedback;
        }
    }
    Ok(output)
}

/// Rescales the energy column (column 0) so the loudest frame maps to 1.
///
/// Frames more than `silence_floor` dB below the peak are floored first.
pub(crate) fn energy_norm(features: &mut Array2<f32>, silence_floor: f32, scale: f32) {
    if features.is_empty() {
        return;
    }
    let mut energy = features.column_mut(0);
    let max_e = energy.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let min_e = max_e - silence_floor * LN_10 as f32 / 10.0;
    energy.mapv_inplace(|e| 1.0 - (max_e - e.max(min_e)) * scale);
}
