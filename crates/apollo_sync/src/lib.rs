//! # Apollo Sync
//!
//! Configuration sync engine for the Apollo configuration service.
//!
//! This crate provides:
//! - An in-memory store of per-namespace snapshots, versioned by release key
//! - A disk cache mirroring every accepted snapshot
//! - Key-level change events delivered to registered listeners
//! - A scheduled full pull (every 10 minutes by default)
//! - A long-poll watcher applying server-pushed changes
//! - `ApolloClient`, the facade tying them together, and `ClientRegistry`
//!
//! ## Architecture
//!
//! The client follows a **pull-then-watch** model:
//! 1. Construction pulls every subscribed namespace synchronously
//! 2. The scheduler re-pulls everything at a fixed interval
//! 3. The watcher long-polls and re-fetches notified namespaces
//!
//! When the server cannot be reached, the last snapshot written to disk is
//! served instead.
//!
//! ## Key Invariants
//!
//! - A snapshot replaces the stored one iff its release key differs
//! - The initial pull never emits change events
//! - Listener panics never reach the background loops
//! - Read accessors never block on network or disk

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod disk_cache;
mod engine;
mod error;
mod http;
mod long_poll;
mod net;
mod notifier;
mod registry;
mod scheduler;
mod store;
mod transport;
mod worker;

pub use client::ApolloClient;
pub use config::ClientConfig;
pub use disk_cache::DiskCache;
pub use engine::{SyncReport, SyncStats};
pub use error::{SyncError, SyncResult};
pub use http::HttpTransport;
pub use long_poll::{LongPollWatcher, PollOutcome};
pub use net::local_ip;
pub use notifier::{diff, ChangeAction, ChangeEvent, ChangeListener, ChangeNotifier};
pub use registry::{ClientRegistry, RegistryKey};
pub use scheduler::SyncScheduler;
pub use store::{AcceptOutcome, ConfigStore};
pub use transport::{ConfigTransport, HttpResponse, MockTransport, RecordedRequest};
pub use worker::WorkerState;

pub use apollo_protocol::{ApolloConfig, DEFAULT_CLUSTER, DEFAULT_NAMESPACE};
