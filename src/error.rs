use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for results returned by the verification core.
pub type Result<T> = std::result::Result<T, VprError>;

/// Coarse error classes reported to callers of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NoAvailableData,
    NeedMoreSample,
    TrainingFailed,
    VerifyFailed,
    ModelLoadFailed,
    MemInsufficient,
    InvalidParam,
    FileError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NoAvailableData => "no available data",
            ErrorCode::NeedMoreSample => "need more sample",
            ErrorCode::TrainingFailed => "train failed",
            ErrorCode::VerifyFailed => "verify failed",
            ErrorCode::ModelLoadFailed => "model load failed",
            ErrorCode::MemInsufficient => "memory insufficient",
            ErrorCode::InvalidParam => "invalid param",
            ErrorCode::FileError => "file error",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum VprError {
    #[error("no available data")]
    NoAvailableData,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insufficient data: {samples} samples buffered, {required} required")]
    InsufficientData { samples: usize, required: usize },

    #[error("need more sample: {samples} samples buffered, {required} required")]
    NeedMoreSample { samples: usize, required: usize },

    #[error("insufficient frames: extracted {frames}, at least {required} required")]
    InsufficientFrames { frames: usize, required: usize },

    #[error("invalid length: {0} is not a power of two")]
    InvalidLength(usize),

    #[error("invalid param: {0}")]
    InvalidParam(String),

    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed model file: {0}")]
    ModelFormat(String),

    #[error("mixture {mixture} received no responsibility mass")]
    EmptyMixture { mixture: usize },

    #[error("{code}: {source}")]
    Stage {
        code: ErrorCode,
        #[source]
        source: Box<VprError>,
    },
}

impl VprError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VprError::Io {
            path: path.into(),
            source,
        }
    }

    /// Wraps `self` with the engine stage code it surfaced through.
    pub fn at_stage(self, code: ErrorCode) -> Self {
        VprError::Stage {
            code,
            source: Box::new(self),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            VprError::NoAvailableData | VprError::InsufficientData { .. } => {
                ErrorCode::NoAvailableData
            }
            VprError::NeedMoreSample { .. } => ErrorCode::NeedMoreSample,
            VprError::InsufficientFrames { .. } => ErrorCode::MemInsufficient,
            VprError::InvalidInput(_)
            | VprError::InvalidLength(_)
            | VprError::InvalidParam(_) => ErrorCode::InvalidParam,
            VprError::Io { .. } => ErrorCode::FileError,
            VprError::ModelFormat(_) => ErrorCode::ModelLoadFailed,
            VprError::EmptyMixture { .. } => ErrorCode::TrainingFailed,
            VprError::Stage { code, .. } => *code,
        }
    }

    /// Innermost cause, skipping any stage wrappers.
    pub fn root(&self) -> &VprError {
        match self {
            VprError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}
