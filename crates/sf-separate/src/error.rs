//! Separation error taxonomy (spec §7), mapped onto [`sf_core::SfError`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeparationError {
    #[error("model not found: {path}")]
    ModelNotFound { path: String },

    #[error("failed to load model: {reason}")]
    ModelLoadFailed { reason: String },

    #[error("inference failed: {reason}")]
    InferenceFailed { reason: String },

    #[error("invalid input shape: expected {expected}, got {got}")]
    InvalidInputShape { expected: String, got: String },

    #[error("invalid output shape: expected {expected}, got {got}")]
    InvalidOutputShape { expected: String, got: String },

    #[error("invalid chunk configuration: {reason}")]
    InvalidChunkConfig { reason: String },

    #[error("channel count mismatch: expected {expected}, got {got}")]
    ChannelMismatch { expected: usize, got: usize },
}

pub type SeparationResult<T> = Result<T, SeparationError>;

impl From<SeparationError> for sf_core::SfError {
    fn from(err: SeparationError) -> Self {
        match err {
            SeparationError::ModelNotFound { .. }
            | SeparationError::InvalidChunkConfig { .. } => {
                sf_core::SfError::Configuration(err.to_string())
            }
            SeparationError::ModelLoadFailed { .. } => {
                sf_core::SfError::Resource(err.to_string())
            }
            SeparationError::InferenceFailed { .. }
            | SeparationError::InvalidInputShape { .. }
            | SeparationError::InvalidOutputShape { .. }
            | SeparationError::ChannelMismatch { .. } => {
                sf_core::SfError::Runtime(err.to_string())
            }
        }
    }
}
