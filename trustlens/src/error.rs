// trustlens/src/error.rs
//
// Error taxonomy.
//
//   EngineError  everything a caller can see. Either a full result comes
//                  back or exactly one of these.
//   SourceError  why one activity source read failed. Absorbed by the
//                  aggregator and turned into an empty contribution.

use std::time::Duration;

use thiserror::Error;

use crate::records::SourceType;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("identity '{identity_id}' not found")]
    NotFound { identity_id: String },

    #[error("fraud signal '{signal_id}' not found")]
    UnknownSignal { signal_id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal computation error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Status code used on the query surface.
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound { .. }      => 404,
            Self::UnknownSignal { .. } => 404,
            Self::InvalidInput(_)      => 400,
            Self::Config(_)            => 500,
            Self::Internal(_)          => 500,
        }
    }

    pub fn not_found(identity_id: impl Into<String>) -> Self {
        Self::NotFound { identity_id: identity_id.into() }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("{source_type} read timed out after {after:?}")]
    Timeout { source_type: SourceType, after: Duration },

    #[error("{source_type} unavailable: {reason}")]
    Unavailable { source_type: SourceType, reason: String },

    #[error("{source_type} read task panicked")]
    Panicked { source_type: SourceType },
}

impl SourceError {
    pub fn unavailable(source_type: SourceType, reason: impl Into<String>) -> Self {
        Self::Unavailable { source_type, reason: reason.into() }
    }

    pub fn source_type(&self) -> SourceType {
        match self {
            Self::Timeout { source_type, .. }
            | Self::Unavailable { source_type, .. }
            | Self::Panicked { source_type } => *source_type,
        }
    }
}
