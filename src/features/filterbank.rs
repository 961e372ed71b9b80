use crate::error::{Result, VprError};

pub(crate) fn mel(freq: f64) -> f64 {
    1127.0 * (1.0 + freq / 700.0).ln()
}

pub(crate) fn freq(mel: f64) -> f64 {
    700.0 * ((mel / 1127.0).exp() - 1.0)
}

/// Triangular mel filterbank over the lower half of an FFT spectrum.
///
/// Each bin inside the cut-off range remembers the filter whose centre lies
/// at or below it ("lower channel") and the weight it contributes there; the
/// remainder goes to the next filter up.
#[derive(Debug, Clone)]
pub struct Filterbank {
    sample_rate: u32,
    frame_size: usize,
    fft_size: usize,
    filters: usize,
    centers: Vec<f64>,
    lower_channel: Vec<Option<usize>>,
    lower_weight: Vec<f64>,
}

impl Filterbank {
    pub fn new(
        sample_rate: u32,
        frame_length_ms: f32,
        filters: usize,
        low_cutoff: Option<f32>,
        high_cutoff: Option<f32>,
    ) -> Result<Self> {
        let nyquist = sample_rate as f64 / 2.0;
        let low = low_cutoff.map(f64::from).unwrap_or(0.0);
        let high = high_cutoff.map(f64::from).unwrap_or(nyquist);
        if low < 0.0 || low >= high || high > nyquist {
            return Err(VprError::InvalidParam(format!(
                "low and high cut-off frequencies set incorrectly (low={low} Hz, high={high} Hz, nyquist={nyquist} Hz)"
            )));
        }
        if filters == 0 {
            return Err(VprError::InvalidParam("filterbank needs at least one filter".into()));
        }
        let frame_size = (sample_rate as f64 * frame_length_ms as f64 * 1e-3) as usize;
        if frame_size < 2 {
            return Err(VprError::InvalidParam(format!(
                "frame of {frame_length_ms} ms holds fewer than two samples at {sample_rate} Hz"
            )));
        }
        let mut fft_size = 2usize;
        while frame_size > fft_size {
            fft_size <<= 1;
        }
        let half = fft_size >> 1;
        let resolution = sample_rate as f64 / fft_size as f64;
        let first_bin = (low / resolution) as usize;
        let last_bin = ((high / resolution) as usize).min(half);

        let mel_low = mel(low);
        let mel_step = (mel(high) - mel_low) / (filters + 1) as f64;
        let mut centers = Vec::with_capacity(filters + 1);
        centers.push(low);
        centers.extend((1..=filters).map(|i| freq(mel_low + mel_step * i as f64)));

        let mut lower_channel = vec![None; half];
        let mut lower_weight = vec![0.0; half];
        let mut channel = 0usize;
        for bin in first_bin..=last_bin.min(half - 1) {
            let bin_freq = bin as f64 * resolution;
            while channel <= filters && centers[channel] <= bin_freq {
                channel += 1;
            }
            let Some(lower) = channel.checked_sub(1) else {
                continue;
            };
            let upper_freq = if lower < filters {
                centers[lower + 1]
            } else {
                high
            };
            lower_channel[bin] = Some(lower);
            lower_weight[bin] = (bin_freq - upper_freq) / (centers[lower] - upper_freq);
        }

        Ok(Self {
            sample_rate,
            frame_size,
            fft_size,
            filters,
            centers,
            lower_channel,
            lower_weight,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per analysis frame.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn filters(&self) -> usize {
        self.filters
    }

    /// Filter centre frequencies in Hz; index 0 holds the low cut-off.
    pub fn centers(&self) -> &[f64] {
        &self.centers
    }

    /// Accumulates the first `fft_size / 2` spectrum bins into `channels`.
    pub fn accumulate(&self, spectrum: &[f64], channels: &mut [f64]) {
        channels.iter_mut().for_each(|c| *c = 0.0);
        for (bin, (lower, weight)) in self
            .lower_channel
            .iter()
            .zip(self.lower_weight.iter())
            .enumerate()
        {
            let Some(lower) = *lower else {
                continue;
            };
            let value = spectrum[bin];
            if lower != 0 {
                channels[lower - 1] += value * weight;
            }
            if lower < self.filters {
                channels[lower] += value * (1.0 - weight);
            }
        }
    }
}
