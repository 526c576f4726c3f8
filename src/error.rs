//! Error types for plume.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlumeError>;

#[derive(Error, Debug)]
pub enum PlumeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid capacity: {message}")]
    Capacity { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Shared segment has an unrecognized format (bad magic)")]
    InvalidFormat,

    #[error("Shared segment version mismatch: expected {expected}, got {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Shared segment {name:?} does not exist")]
    NotFound { name: String },

    #[error("Argument snapshot overflowed its {capacity}-byte buffer")]
    SnapshotOverflow { capacity: usize },

    #[error("Sink rejected a write: {message}")]
    Sink { message: String },

    #[error("OS primitive failed during {operation}: {source}")]
    Platform {
        operation: &'static str,
        source: std::io::Error,
    },

    #[error("Logger is shutting down")]
    ShuttingDown,
}

impl PlumeError {
    pub fn capacity(message: impl Into<String>) -> Self {
        Self::Capacity { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink { message: message.into() }
    }

    pub fn platform(operation: &'static str, source: std::io::Error) -> Self {
        Self::Platform { operation, source }
    }

    /// Steady-state errors are absorbed by the pipelines; only creation-time
    /// errors propagate to the logger constructor.
    pub fn is_creation_error(&self) -> bool {
        matches!(
            self,
            Self::Capacity { .. }
                | Self::InvalidConfig { .. }
                | Self::InvalidFormat
                | Self::VersionMismatch { .. }
                | Self::NotFound { .. }
                | Self::Platform { .. }
        )
    }
}
