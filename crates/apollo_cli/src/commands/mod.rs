//! CLI command implementations.

pub mod cache;
pub mod get;
pub mod watch;
