use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VprError};

/// Fewest frames a feature matrix may hold before extraction is rejected.
pub const MIN_FRAMES: usize = 300;
/// Decibel level that decibel normalisation scales the peak sample to.
pub const DB_NORM_LEVEL: f64 = -3.0;
/// Relevance factor used by MAP mean adaptation.
pub const REL_FACTOR: f64 = 16.0;
/// Outer adaptation loops performed while enrolling a speaker.
pub const MAX_ADAPT_LOOPS: usize = 1;

/// Front-end settings for MFCC extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Low cut-off of the filterbank in Hz; `None` starts at 0 Hz.
    pub low_cutoff: Option<f32>,
    /// High cut-off of the filterbank in Hz; `None` ends at Nyquist.
    pub high_cutoff: Option<f32>,
    pub filter_bank_size: usize,
    /// Analysis window length in milliseconds.
    pub frame_length_ms: f32,
    /// Hop between frames in milliseconds.
    pub frame_shift_ms: f32,
    /// Cepstral order, excluding the 0th coefficient.
    pub mfcc_order: usize,
    pub static_c0: bool,
    #[serde(alias = "static")]
    pub static_coeffs: bool,
    pub delta_c0: bool,
    #[serde(alias = "dynamic")]
    pub delta_coeffs: bool,
    pub accel_c0: bool,
    #[serde(alias = "acce")]
    pub accel_coeffs: bool,
    pub delta_window: usize,
    pub polish_diff: bool,
    pub cep_lifter: f32,
    pub use_power: bool,
    pub dpscc: bool,
    pub pdascc: bool,
    pub cmsvn: bool,
    pub zero_global_mean: bool,
    pub db_norm: bool,
    pub feature_warping: bool,
    pub feature_warping_window: usize,
    pub rasta: bool,
    pub rasta_coefficient: f32,
    pub energy_norm: bool,
    pub silence_floor: f32,
    pub energy_scale: f32,
    pub min_frames: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            low_cutoff: Some(250.0),
            high_cutoff: Some(3800.0),
            filter_bank_size: 24,
            frame_length_ms: 20.0,
            frame_shift_ms: 10.0,
            mfcc_order: 16,
            static_c0: false,
            static_coeffs: true,
            delta_c0: false,
            delta_coeffs: true,
            accel_c0: false,
            accel_coeffs: false,
            delta_window: 2,
            polish_diff: false,
            cep_lifter: 22.0,
            use_power: false,
            dpscc: false,
            pdascc: false,
            cmsvn: true,
            zero_global_mean: true,
            db_norm: true,
            feature_warping: false,
            feature_warping_window: 300,
            rasta: false,
            rasta_coefficient: 0.94,
            energy_norm: false,
            silence_floor: 50.0,
            energy_scale: 19.0,
            min_frames: MIN_FRAMES,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        check_param(self.filter_bank_size > 0, "filter_bank_size must be positive")?;
        check_param(self.mfcc_order > 0, "mfcc_order must be positive")?;
        check_param(
            self.mfcc_order < self.filter_bank_size,
            "mfcc_order + 1 must not exceed filter_bank_size",
        )?;
        check_param(self.frame_length_ms > 0.0, "frame_length_ms must be positive")?;
        check_param(self.frame_shift_ms > 0.0, "frame_shift_ms must be positive")?;
        check_param(
            self.frame_shift_ms <= self.frame_length_ms,
            "frame_shift_ms must not exceed frame_length_ms",
        )?;
        check_param(self.delta_window > 0, "delta_window must be positive")?;
        check_param(self.output_width() > 0, "no coefficient group selected")?;
        check_param(
            !self.feature_warping || self.feature_warping_window >= 2,
            "feature_warping_window must be at least 2",
        )?;
        Ok(())
    }

    /// Width of each assembled feature vector.
    pub fn output_width(&self) -> usize {
        let order = self.mfcc_order;
        [
            (self.static_c0, 1),
            (self.static_coeffs, order),
            (self.delta_c0, 1),
            (self.delta_coeffs, order),
            (self.accel_c0, 1),
            (self.accel_coeffs, order),
        ]
        .iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, width)| width)
        .sum()
    }

    pub(crate) fn needs_delta(&self) -> bool {
        self.delta_c0 || self.delta_coeffs || self.needs_accel()
    }

    pub(crate) fn needs_accel(&self) -> bool {
        self.accel_c0 || self.accel_coeffs
    }
}

/// Session settings for [`crate::engine::VprEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub delete_silence: bool,
    /// Silence-deletion aggressiveness in `0..=100`; 50 is neutral.
    #[serde(default = "default_aggressiveness", alias = "del_sil_range")]
    pub silence_aggressiveness: u8,
    pub ubm_path: PathBuf,
    pub user_model_path: PathBuf,
    #[serde(default = "default_relevance")]
    pub relevance_factor: f64,
    #[serde(default = "default_adapt_loops")]
    pub adaptation_loops: usize,
    /// Score only the N best UBM mixtures per frame; `None` uses all.
    #[serde(default)]
    pub top_mixtures: Option<usize>,
    #[serde(default)]
    pub features: FeatureConfig,
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_aggressiveness() -> u8 {
    50
}

fn default_relevance() -> f64 {
    REL_FACTOR
}

fn default_adapt_loops() -> usize {
    MAX_ADAPT_LOOPS
}

impl EngineConfig {
    pub fn new(
        sample_rate: u32,
        ubm_path: impl Into<PathBuf>,
        user_model_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sample_rate,
            delete_silence: false,
            silence_aggressiveness: default_aggressiveness(),
            ubm_path: ubm_path.into(),
            user_model_path: user_model_path.into(),
            relevance_factor: REL_FACTOR,
            adaptation_loops: MAX_ADAPT_LOOPS,
            top_mixtures: None,
            features: FeatureConfig::default(),
        }
    }

    pub fn with_silence_deletion(mut self, aggressiveness: u8) -> Self {
        self.delete_silence = true;
        self.silence_aggressiveness = aggressiveness;
        self
    }

    pub fn with_features(mut self, features: FeatureConfig) -> Self {
        self.features = features;
        self
    }

    pub fn with_top_mixtures(mut self, top: Option<usize>) -> Self {
        self.top_mixtures = top;
        self
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| VprError::io(path, err))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(raw)
            .map_err(|err| VprError::InvalidParam(format!("engine config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_param(self.sample_rate > 0, "sample_rate must be positive")?;
        check_param(
            self.silence_aggressiveness <= 100,
            "silence_aggressiveness must lie in 0..=100",
        )?;
        check_param(self.relevance_factor >= 0.0, "relevance_factor must be non-negative")?;
        check_param(self.adaptation_loops > 0, "adaptation_loops must be positive")?;
        check_param(
            self.top_mixtures != Some(0),
            "top_mixtures must be positive when set",
        )?;
        self.features.validate()
    }

    /// Samples needed before enrollment is attempted (two seconds).
    pub fn min_train_len(&self) -> usize {
        self.sample_rate as usize * 2
    }

    /// Samples needed before verification is attempted (a quarter second).
    pub fn min_verify_len(&self) -> usize {
        (self.sample_rate as f64 * 0.25) as usize
    }
}

fn check_param(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(VprError::InvalidParam(message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_features_are_valid_and_32_wide() {
        let config = FeatureConfig::default();
        config.validate().unwrap();
        assert_eq!(config.output_width(), 32);
    }

    #[test]
    fn order_must_fit_filterbank() {
        let config = FeatureConfig {
            mfcc_order: 24,
            ..FeatureConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn minimum_lengths_follow_sample_rate() {
        let config = EngineConfig::new(16_000, "ubm.gmm", "user.gmm");
        assert_eq!(config.min_train_len(), 32_000);
        assert_eq!(config.min_verify_len(), 4_000);
    }

    #[test]
    fn parses_engine_json_with_defaults() {
        let json = r#"{
            "sample_rate": 8000,
            "ubm_path": "models/ubm.gmm",
            "user_model_path": "models/alice.gmm",
            "features": {"acce": true, "cmsvn": false}
        }"#;
        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.sample_rate, 8000);
        assert_eq!(config.relevance_factor, REL_FACTOR);
        assert!(config.features.accel_coeffs);
        assert!(!config.features.cmsvn);
        assert_eq!(config.features.filter_bank_size, 24);
    }

    #[test]
    fn rejects_zero_top_mixtures() {
        let config = EngineConfig::new(16_000, "a", "b").with_top_mixtures(Some(0));
        assert!(config.validate().is_err());
    }
}
