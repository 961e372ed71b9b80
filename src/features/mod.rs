//! MFCC front-end: PCM samples in, fixed-width feature frames out.

mod dynamics;
pub mod filterbank;
mod frames;
mod normalize;
mod postprocess;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use tracing::debug;

pub use filterbank::Filterbank;

use crate::config::FeatureConfig;
use crate::error::{Result, VprError};
use frames::MfccFrontEnd;

/// Feature vectors of one utterance, one row per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Array2<f32>,
}

impl FeatureMatrix {
    pub fn from_array(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Builds a matrix from equally sized rows.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let dim = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != dim) {
            return Err(VprError::InvalidInput(
                "feature rows must share one dimension".into(),
            ));
        }
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let data = Array2::from_shape_vec((rows.len(), dim), flat)
            .map_err(|err| VprError::InvalidInput(err.to_string()))?;
        Ok(Self { data })
    }

    pub fn frames(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn dim(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn row(&self, frame: usize) -> ArrayView1<'_, f32> {
        self.data.row(frame)
    }

    pub fn as_array(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    pub fn into_array(self) -> Array2<f32> {
        self.data
    }

    /// Concatenates the frames of several matrices of the same width.
    pub fn stack(parts: &[FeatureMatrix]) -> Result<Self> {
        if parts.is_empty() {
            return Err(VprError::NoAvailableData);
        }
        let views: Vec<ArrayView2<'_, f32>> = parts.iter().map(FeatureMatrix::as_array).collect();
        let data = ndarray::concatenate(Axis(0), &views)
            .map_err(|err| VprError::InvalidInput(format!("cannot stack features: {err}")))?;
        Ok(Self { data })
    }
}

/// Turns 16-bit PCM into MFCC feature matrices.
///
/// The filterbank layout is computed once; FFT/DCT tables and scratch
/// buffers are created per call, so one extractor may serve several threads.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureConfig,
    filterbank: Filterbank,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig, sample_rate: u32) -> Result<Self> {
        config.validate()?;
        let filterbank = Filterbank::new(
            sample_rate,
            config.frame_length_ms,
            config.filter_bank_size,
            config.low_cutoff,
            config.high_cutoff,
        )?;
        Ok(Self { config, filterbank })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn filterbank(&self) -> &Filterbank {
        &self.filterbank
    }

    pub fn extract(&self, samples: &[i16]) -> Result<FeatureMatrix> {
        if samples.is_empty() {
            return Err(VprError::NoAvailableData);
        }
        let config = &self.config;
        let mut signal: Vec<f32> = samples.iter().map(|&s| f32::from(s)).collect();
        if config.zero_global_mean {
            normalize::zero_global_mean(&mut signal);
        }
        if config.db_norm {
            normalize::db_norm(&mut signal);
        }

        let mut front_end = MfccFrontEnd::new(&self.filterbank, config)?;
        let mut cepstra = front_end.cepstra(&signal)?;
        debug!(
            samples = samples.len(),
            frames = cepstra.len_of(Axis(0)),
            "computed static cepstra"
        );

        if config.feature_warping {
            cepstra = postprocess::feature_warping(&cepstra, config.feature_warping_window)?;
        }
        if config.rasta {
            cepstra = postprocess::rasta(&cepstra, config.rasta_coefficient)?;
        }
        if config.energy_norm {
            postprocess::energy_norm(&mut cepstra, config.silence_floor, config.energy_scale);
        }

        let mut features = dynamics::assemble(&cepstra, config)?;
        let frames = features.len_of(Axis(0));
        if frames < config.min_frames {
            return Err(VprError::InsufficientFrames {
                frames,
                required: config.min_frames,
            });
        }
        if config.cmsvn {
            normalize::cms_cvn(&mut features);
        }
        debug!(frames, dim = features.len_of(Axis(1)), "extracted features");
        Ok(FeatureMatrix::from_array(features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn chirp(seconds: f32, sample_rate: u32) -> Vec<i16> {
        let len = (seconds * sample_rate as f32) as usize;
        (0..len)
            .map(|t| {
                let time = t as f32 / sample_rate as f32;
                let phase = 2.0 * PI * (200.0 * time + 150.0 * time * time);
                let envelope = 0.6 + 0.4 * (2.0 * PI * 3.0 * time).sin();
                (9000.0 * envelope * phase.sin()) as i16
            })
            .collect()
    }

    #[test]
    fn default_extraction_shape() {
        let extractor = FeatureExtractor::new(FeatureConfig::default(), 16_000).unwrap();
        let features = extractor.extract(&chirp(4.0, 16_000)).unwrap();
        // 399 frames, minus two on each side for deltas
        assert_eq!(features.frames(), 395);
        assert_eq!(features.dim(), 32);
        assert!(features.as_array().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn short_audio_is_insufficient() {
        let extractor = FeatureExtractor::new(FeatureConfig::default(), 16_000).unwrap();
        let err = extractor.extract(&chirp(2.1, 16_000)).unwrap_err();
        assert!(matches!(err, VprError::InsufficientFrames { required: 300, .. }));
    }

    #[test]
    fn lower_half_is_normalised() {
        let extractor = FeatureExtractor::new(FeatureConfig::default(), 16_000).unwrap();
        let features = extractor.extract(&chirp(4.0, 16_000)).unwrap();
        let column = features.as_array().column(3).to_owned();
        let mean = column.mean().unwrap();
        assert!(mean.abs() < 1e-4, "mean {mean}");
    }

    #[test]
    fn empty_input_is_rejected() {
        let extractor = FeatureExtractor::new(FeatureConfig::default(), 16_000).unwrap();
        assert!(matches!(
            extractor.extract(&[]),
            Err(VprError::NoAvailableData)
        ));
    }

    #[test]
    fn from_rows_checks_width() {
        assert!(FeatureMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_err());
        let matrix = FeatureMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!((matrix.frames(), matrix.dim()), (2, 2));
        assert_eq!(matrix.row(1)[0], 3.0);
    }

    #[test]
    fn stack_appends_frames() {
        let a = FeatureMatrix::from_rows(&[vec![1.0, 2.0]]).unwrap();
        let b = FeatureMatrix::from_rows(&[vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        let stacked = FeatureMatrix::stack(&[a, b]).unwrap();
        assert_eq!(stacked.frames(), 3);
        assert_eq!(stacked.row(2)[1], 6.0);

        let narrow = FeatureMatrix::from_rows(&[vec![1.0]]).unwrap();
        assert!(FeatureMatrix::stack(&[stacked, narrow]).is_err());
        assert!(FeatureMatrix::stack(&[]).is_err());
    }
}
