//! Error types for the sync engine.

use apollo_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// None of these are fatal to the background loops: fetch failures fall back
/// to the disk cache, long-poll failures skip the iteration, and cache write
/// failures are logged.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with a status the caller does not handle.
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// The request did not complete within its timeout.
    #[error("operation timed out")]
    Timeout,

    /// A response body or cache line could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Disk cache I/O error.
    #[error("cache io error: {0}")]
    CacheIo(#[from] std::io::Error),

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A background worker could not be started.
    #[error("worker error: {0}")]
    Worker(String),

    /// Invalid lifecycle transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::HttpStatus(status) => *status >= 500,
            SyncError::CacheIo(_) => true,
            _ => false,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidJson(e) => SyncError::Parse(e.to_string()),
            ProtocolError::InvalidUrl(e) => SyncError::Config(e.to_string()),
            ProtocolError::InvalidSecret => SyncError::Config("invalid signing secret".into()),
        }
    }
}
