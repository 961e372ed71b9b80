//! GMM-UBM text-independent speaker verification.
//!
//! Audio flows through [`features::FeatureExtractor`] into MFCC frames, a
//! background [`gmm::Gmm`] is MAP-adapted into a speaker model by
//! [`engine::VprEngine::train_model`], and later audio is scored as a
//! per-frame log-likelihood ratio by [`engine::VprEngine::verify_model`].

pub mod audio;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod gmm;
pub mod kernels;

pub use config::{EngineConfig, FeatureConfig};
pub use engine::{SessionState, VprEngine};
pub use error::{ErrorCode, Result, VprError};
pub use features::{FeatureExtractor, FeatureMatrix};
pub use gmm::Gmm;
