use std::f64::consts::PI;

use ndarray::Array2;

use super::filterbank::Filterbank;
use crate::config::FeatureConfig;
use crate::error::{Result, VprError};
use crate::kernels::{Dct, Fft};

const PRE_EMPHASIS: f64 = 0.97;

/// Per-call MFCC state: kernels, window tables and scratch buffers.
///
/// One instance is built for every extraction so nothing mutable is shared
/// between calls or threads.
pub(crate) struct MfccFrontEnd<'a> {
    filterbank: &'a Filterbank,
    order: usize,
    shift: usize,
    use_power: bool,
    dpscc: bool,
    pdascc: bool,
    fft: Fft,
    dct: Dct,
    hamming: Vec<f64>,
    lifter: Vec<f64>,
    re: Vec<f64>,
    im: Vec<f64>,
    spectrum: Vec<f64>,
    channels: Vec<f64>,
}

impl<'a> MfccFrontEnd<'a> {
    pub(crate) fn new(filterbank: &'a Filterbank, config: &FeatureConfig) -> Result<Self> {
        let frame_size = filterbank.frame_size();
        let shift =
            (filterbank.sample_rate() as f64 * config.frame_shift_ms as f64 * 1e-3) as usize;
        if shift == 0 || shift > frame_size {
            return Err(VprError::InvalidParam(format!(
                "frame shift of {shift} samples must lie in 1..={frame_size}"
            )));
        }
        if config.mfcc_order + 1 > filterbank.filters() {
            return Err(VprError::InvalidParam(format!(
                "mfcc order {} needs more than {} filterbank channels",
                config.mfcc_order,
                filterbank.filters()
            )));
        }
        let fft_size = filterbank.fft_size();
        let denom = (frame_size - 1) as f64;
        let hamming = (0..frame_size)
            .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / denom).cos())
            .collect();
        let lifter = raised_sine(config.mfcc_order + 1, config.cep_lifter as f64);

        Ok(Self {
            filterbank,
            order: config.mfcc_order,
            shift,
            use_power: config.use_power,
            dpscc: config.dpscc,
            pdascc: config.pdascc,
            fft: Fft::new(),
            dct: Dct::new(),
            hamming,
            lifter,
            re: vec![0.0; fft_size],
            im: vec![0.0; fft_size],
            spectrum: vec![0.0; fft_size / 2],
            channels: vec![0.0; filterbank.filters()],
        })
    }

    /// Number of whole frames that fit in `len` samples.
    pub(crate) fn frame_count(&self, len: usize) -> usize {
        let frame_size = self.filterbank.frame_size();
        if len < frame_size {
            0
        } else {
            (len - (frame_size - self.shift)) / self.shift
        }
    }

    /// Liftered cepstra `c0..=c_order` for every frame of `signal`.
    pub(crate) fn cepstra(&mut self, signal: &[f32]) -> Result<Array2<f32>> {
        let frames = self.frame_count(signal.len());
        let width = self.order + 1;
        let mut out = Array2::zeros((frames, width));
        for (index, mut row) in out.outer_iter_mut().enumerate() {
            let start = index * self.shift;
            self.analyse(&signal[start..start + self.filterbank.frame_size()])?;
            for (dst, src) in row.iter_mut().zip(self.channels.iter()) {
                *dst = *src as f32;
            }
        }
        Ok(out)
    }

    fn analyse(&mut self, frame: &[f32]) -> Result<()> {
        let n = frame.len();
        self.im.iter_mut().for_each(|v| *v = 0.0);
        self.re.iter_mut().for_each(|v| *v = 0.0);
        for (dst, src) in self.re.iter_mut().zip(frame.iter()) {
            *dst = *src as f64;
        }

        for i in (1..n).rev() {
            self.re[i] -= PRE_EMPHASIS * self.re[i - 1];
        }
        self.re[0] *= 1.0 - PRE_EMPHASIS;
        for (value, weight) in self.re.iter_mut().zip(self.hamming.iter()) {
            *value *= weight;
        }

        self.fft.forward(&mut self.re, &mut self.im)?;
        for (bin, power) in self.spectrum.iter_mut().enumerate() {
            *power = self.re[bin] * self.re[bin] + self.im[bin] * self.im[bin];
        }
        if self.use_power && self.dpscc {
            differential_power(&mut self.spectrum);
        }
        if !self.use_power {
            self.spectrum.iter_mut().for_each(|v| *v = v.sqrt());
            if self.pdascc {
                predictive_differential_amplitude(&mut self.spectrum);
            }
        }

        self.filterbank.accumulate(&self.spectrum, &mut self.channels);
        for channel in self.channels.iter_mut() {
            *channel = if *channel >= 1.0 { channel.ln() } else { 0.0 };
        }

        let filters = self.channels.len();
        let width = self.order + 1;
        self.dct.transform(&mut self.channels, filters, width)?;
        for (value, weight) in self.channels.iter_mut().zip(self.lifter.iter()) {
            *value *= weight;
        }
        Ok(())
    }
}

fn raised_sine(width: usize, lifter: f64) -> Vec<f64> {
    if lifter <= 0.0 {
        return vec![1.0; width];
    }
    (0..width)
        .map(|i| 1.0 + lifter / 2.0 * (PI * i as f64 / lifter).sin())
        .collect()
}

/// Differential power spectrum: each bin keeps the absolute difference to
/// its upper neighbour; the last bin is zeroed.
fn differential_power(spectrum: &mut [f64]) {
    let Some(last) = spectrum.len().checked_sub(1) else {
        return;
    };
    for i in 0..last {
        spectrum[i] = (spectrum[i] - spectrum[i + 1]).abs();
    }
    spectrum[last] = 0.0;
}

const PDA_WINDOW: usize = 6;
const PDA_ALPHA: f64 = 1.05;

/// Predictive differential amplitude spectrum over the magnitude bins.
///
/// A sine-weighted look-ahead envelope decides per bin whether the left and
/// right differences are sharpened by `PDA_ALPHA`; the spectrum is then
/// rebuilt as the mean of the left and right cumulative sums.
fn predictive_differential_amplitude(spectrum: &mut [f64]) {
    let len = spectrum.len();
    if len < 2 {
        return;
    }
    let x = &*spectrum;
    let envelope: Vec<f64> = (0..len)
        .map(|j| {
            (0..=PDA_WINDOW)
                .take_while(|w| j + w < len)
                .map(|w| x[j + w] * (w as f64 * PI / (2 * PDA_WINDOW) as f64).sin())
                .fold(f64::MIN, f64::max)
        })
        .collect();

    let mut right_diff = vec![0.0; len];
    for j in 0..len - 1 {
        right_diff[j] = if envelope[j] > x[j] && envelope[j + 1] < x[j + 1] {
            x[j] - PDA_ALPHA * x[j + 1]
        } else if envelope[j] <= x[j] && envelope[j + 1] >= x[j + 1] {
            PDA_ALPHA * x[j] - x[j + 1]
        } else {
            x[j] - x[j + 1]
        };
    }

    let mut left_diff = vec![0.0; len];
    for j in (1..len).rev() {
        left_diff[j] = if envelope[j] < x[j] && envelope[j - 1] < x[j - 1] {
            x[j] - PDA_ALPHA * x[j - 1]
        } else if envelope[j] >= x[j] && envelope[j - 1] >= x[j - 1] {
            PDA_ALPHA * x[j] - x[j - 1]
        } else {
            x[j] - x[j - 1]
        };
    }
    left_diff[0] = if envelope[0] < x[0] {
        (1.0 - PDA_ALPHA) * x[0]
    } else {
        (PDA_ALPHA - 1.0) * x[0]
    };

    let mut left = vec![0.0; len];
    for i in 1..len {
        left[i] = left[i - 1] + left_diff[i - 1];
    }
    let mut right = vec![0.0; len];
    for i in (0..len - 1).rev() {
        right[i] = right[i + 1] + right_diff[i + 1];
    }
    for (i, value) in spectrum.iter_mut().enumerate() {
        *value = (left[i] + right[i]) / 2.0;
    }
}
