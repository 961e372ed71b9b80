//! Enrollment and verification sessions over a shared background model.

use std::fs;
use std::path::Path;

use tracing::{debug, error, info};

use crate::audio::{decode_le_i16, delete_silence};
use crate::config::EngineConfig;
use crate::error::{ErrorCode, Result, VprError};
use crate::features::{FeatureExtractor, FeatureMatrix};
use crate::gmm::{map_adapt_means, Gmm};

/// Where a session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Accumulating,
    Training,
    Verifying,
}

/// One speaker-verification session.
///
/// Audio is buffered through the `add_*` calls, then turned into a speaker
/// model by [`VprEngine::train_model`] or scored against an existing one by
/// [`VprEngine::verify_model`]. Buffers persist until cleared.
#[derive(Debug)]
pub struct VprEngine {
    config: EngineConfig,
    extractor: FeatureExtractor,
    ubm: Gmm,
    train_buffer: Vec<i16>,
    verify_buffer: Vec<i16>,
    score: f64,
    state: SessionState,
}

impl VprEngine {
    /// Validates `config` and loads the background model it names.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let extractor = FeatureExtractor::new(config.features.clone(), config.sample_rate)?;
        let ubm = Gmm::load(&config.ubm_path).map_err(|err| {
            error!(
                path = %config.ubm_path.display(),
                error = %err,
                "failed to load background model"
            );
            err.at_stage(ErrorCode::ModelLoadFailed)
        })?;
        let width = config.features.output_width();
        if ubm.dim() != width {
            return Err(VprError::ModelFormat(format!(
                "background model has dimension {}, features are {width} wide",
                ubm.dim()
            ))
            .at_stage(ErrorCode::ModelLoadFailed));
        }
        info!(
            ubm = %config.ubm_path.display(),
            mixtures = ubm.mixtures(),
            dim = ubm.dim(),
            sample_rate = config.sample_rate,
            "verification engine ready"
        );
        Ok(Self {
            config,
            extractor,
            ubm,
            train_buffer: Vec::new(),
            verify_buffer: Vec::new(),
            score: 0.0,
            state: SessionState::Idle,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ubm(&self) -> &Gmm {
        &self.ubm
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Score of the last successful verification.
    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn train_len(&self) -> usize {
        self.train_buffer.len()
    }

    pub fn verify_len(&self) -> usize {
        self.verify_buffer.len()
    }

    /// Appends little-endian 16-bit PCM to the enrollment buffer.
    pub fn add_train_buffer(&mut self, bytes: &[u8]) -> Result<()> {
        let samples = decode_le_i16(bytes)?;
        self.add_train_samples(&samples)
    }

    /// Replaces the verification buffer with little-endian 16-bit PCM.
    pub fn add_verify_buffer(&mut self, bytes: &[u8]) -> Result<()> {
        let samples = decode_le_i16(bytes)?;
        self.add_verify_samples(&samples)
    }

    pub fn add_train_samples(&mut self, samples: &[i16]) -> Result<()> {
        let samples = self.gate(samples)?;
        self.train_buffer.extend_from_slice(&samples);
        self.state = SessionState::Accumulating;
        debug!(
            added = samples.len(),
            buffered = self.train_buffer.len(),
            "buffered enrollment audio"
        );
        Ok(())
    }

    pub fn add_verify_samples(&mut self, samples: &[i16]) -> Result<()> {
        let samples = self.gate(samples)?;
        self.verify_buffer = samples;
        self.state = SessionState::Accumulating;
        debug!(buffered = self.verify_buffer.len(), "buffered verification audio");
        Ok(())
    }

    fn gate(&self, samples: &[i16]) -> Result<Vec<i16>> {
        if samples.is_empty() {
            return Err(VprError::NoAvailableData);
        }
        if self.config.delete_silence {
            Ok(delete_silence(samples, self.config.silence_aggressiveness))
        } else {
            Ok(samples.to_vec())
        }
    }

    /// Adapts the background model to the enrollment buffer and writes the
    /// speaker model to the configured path.
    pub fn train_model(&mut self) -> Result<()> {
        let required = self.config.min_train_len();
        if self.train_buffer.len() < required {
            return Err(VprError::InsufficientData {
                samples: self.train_buffer.len(),
                required,
            });
        }
        self.state = SessionState::Training;
        let result = self.enroll();
        self.state = self.resting_state();
        if let Err(err) = &result {
            error!(error = %err, "enrollment failed");
        }
        result
    }

    fn enroll(&self) -> Result<()> {
        let features = self
            .extractor
            .extract(&self.train_buffer)
            .map_err(|err| err.at_stage(ErrorCode::MemInsufficient))?;
        info!(
            samples = self.train_buffer.len(),
            frames = features.frames(),
            "extracted enrollment features"
        );

        let mut observed = Gmm::dup_model(&self.ubm);
        let mut speaker = Gmm::dup_model(&self.ubm);
        for pass in 0..self.config.adaptation_loops {
            let report = observed
                .em(&features, observed.mixtures())
                .map_err(|err| err.at_stage(ErrorCode::TrainingFailed))?;
            map_adapt_means(
                &mut speaker,
                &observed,
                features.frames(),
                self.config.relevance_factor,
            )
            .map_err(|err| err.at_stage(ErrorCode::TrainingFailed))?;
            debug!(
                pass,
                iterations = report.iterations,
                average_log_likelihood = report.average_log_likelihood,
                "adapted speaker means"
            );
        }

        let path = &self.config.user_model_path;
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .map_err(|err| VprError::io(dir, err).at_stage(ErrorCode::TrainingFailed))?;
        }
        speaker
            .save(path)
            .map_err(|err| err.at_stage(ErrorCode::TrainingFailed))?;
        info!(model = %path.display(), "speaker model saved");
        Ok(())
    }

    /// Scores the verification buffer against the stored speaker model and
    /// returns the average per-frame log-likelihood ratio.
    pub fn verify_model(&mut self) -> Result<f64> {
        if self.verify_buffer.is_empty() {
            return Err(VprError::NoAvailableData);
        }
        let required = self.config.min_verify_len();
        if self.verify_buffer.len() < required {
            return Err(VprError::NeedMoreSample {
                samples: self.verify_buffer.len(),
                required,
            });
        }
        self.state = SessionState::Verifying;
        let result = self.evaluate(&self.config.user_model_path);
        self.state = self.resting_state();
        match result {
            Ok(score) => {
                self.score = score;
                info!(score, "verification scored");
                Ok(score)
            }
            Err(err) => {
                error!(error = %err, "verification failed");
                Err(err)
            }
        }
    }

    fn evaluate(&self, model_path: &Path) -> Result<f64> {
        let speaker =
            Gmm::load(model_path).map_err(|err| err.at_stage(ErrorCode::ModelLoadFailed))?;
        if speaker.mixtures() != self.ubm.mixtures() || speaker.dim() != self.ubm.dim() {
            return Err(VprError::ModelFormat(format!(
                "speaker model is {}x{}, background model is {}x{}",
                speaker.mixtures(),
                speaker.dim(),
                self.ubm.mixtures(),
                self.ubm.dim()
            ))
            .at_stage(ErrorCode::ModelLoadFailed));
        }
        let features = self
            .extractor
            .extract(&self.verify_buffer)
            .map_err(|err| err.at_stage(ErrorCode::MemInsufficient))?;
        let score = self.likelihood_ratio(&speaker, &features);
        if !score.is_finite() {
            return Err(VprError::InvalidInput(format!("score evaluated to {score}"))
                .at_stage(ErrorCode::VerifyFailed));
        }
        Ok(score)
    }

    fn likelihood_ratio(&self, speaker: &Gmm, features: &FeatureMatrix) -> f64 {
        let frames = features.frames();
        let (speaker_ll, world_ll) = match self.config.top_mixtures {
            Some(top) => {
                let selection = self.ubm.top_mixtures(features, top);
                (
                    speaker.log_likelihood_top(features, &selection),
                    self.ubm.log_likelihood_top(features, &selection),
                )
            }
            None => (
                speaker.log_likelihood(features, 0, frames),
                self.ubm.log_likelihood(features, 0, frames),
            ),
        };
        debug!(frames, speaker_ll, world_ll, "scored both models");
        (speaker_ll - world_ll) / frames as f64
    }

    pub fn clear_train_buffer(&mut self) {
        self.train_buffer.clear();
        self.state = self.resting_state();
    }

    pub fn clear_verify_buffer(&mut self) {
        self.verify_buffer.clear();
        self.state = self.resting_state();
    }

    pub fn clear_all_buffers(&mut self) {
        self.clear_train_buffer();
        self.clear_verify_buffer();
    }

    fn resting_state(&self) -> SessionState {
        if self.train_buffer.is_empty() && self.verify_buffer.is_empty() {
            SessionState::Idle
        } else {
            SessionState::Accumulating
        }
    }
}
