//! # Apollo Protocol
//!
//! Wire types and request helpers for the Apollo configuration service.
//!
//! This crate provides:
//! - `ApolloConfig`, the per-namespace snapshot returned by `/configs`
//! - `Notification` for the `/notifications/v2` long-poll protocol
//! - `Endpoint` for building fetch and long-poll URLs
//! - `sign_headers` for the optional HMAC-SHA1 request signature
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod endpoint;
mod error;
mod notification;
mod signature;

pub use config::{ApolloConfig, BOOTSTRAP_RELEASE_KEY};
pub use endpoint::Endpoint;
pub use error::{ProtocolError, ProtocolResult};
pub use notification::{
    decode_notifications, encode_notifications, Notification, INITIAL_NOTIFICATION_ID,
};
pub use signature::{sign_headers, signature, AUTHORIZATION_HEADER, TIMESTAMP_HEADER};

/// Namespace used when the caller does not name one.
pub const DEFAULT_NAMESPACE: &str = "application";

/// Cluster used when the caller does not name one.
pub const DEFAULT_CLUSTER: &str = "default";
