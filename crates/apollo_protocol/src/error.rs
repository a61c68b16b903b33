//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A body could not be parsed or produced as JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A URL could not be built from the configured base.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The shared secret cannot be used as an HMAC key.
    #[error("invalid signing secret")]
    InvalidSecret,
}
