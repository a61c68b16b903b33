//! Shared sync context used by the scheduler, the long-poll watcher and the
//! client's bootstrap.
//!
//! A namespace is synced in two steps:
//!
//! 1. fetch `/configs/...` from the server; on success the snapshot is
//!    offered to the [`ConfigStore`], mirrored to the [`DiskCache`] and the
//!    resulting change events are dispatched
//! 2. on any failure, the last snapshot written to disk is offered instead
//!
//! No step is fatal: failures are logged, counted in [`SyncStats`] and
//! reported per namespace in a [`SyncReport`].

use crate::config::ClientConfig;
use crate::disk_cache::DiskCache;
use crate::error::{SyncError, SyncResult};
use crate::net::local_ip;
use crate::notifier::{ChangeEvent, ChangeNotifier};
use crate::store::{AcceptOutcome, ConfigStore};
use crate::transport::{ConfigTransport, HttpResponse};
use apollo_protocol::{sign_headers, ApolloConfig, Endpoint, Notification};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Counters describing sync activity since the client was created.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed full pulls, including the bootstrap.
    pub cycles_completed: u64,
    /// Releases accepted into the store.
    pub releases_accepted: u64,
    /// Namespaces served from the disk cache after a failed fetch.
    pub cache_fallbacks: u64,
    /// Failed snapshot fetches.
    pub fetch_failures: u64,
    /// Long-poll requests that returned a response.
    pub long_polls: u64,
    /// Namespace notifications received from long polls.
    pub notifications_received: u64,
    /// Change events handed to the notifier.
    pub events_dispatched: u64,
    /// Listener invocations that panicked.
    pub failed_deliveries: u64,
    /// Time of the last completed full pull.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Per-namespace result of one full pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Namespaces whose release changed from the server.
    pub updated: Vec<String>,
    /// Namespaces fetched from the server with the stored release.
    pub unchanged: Vec<String>,
    /// Namespaces served from the disk cache.
    pub from_cache: Vec<String>,
    /// Namespaces neither the server nor the cache could provide.
    pub failed: Vec<String>,
}

impl SyncReport {
    /// Returns true if every namespace was fetched from the server.
    pub fn is_complete(&self) -> bool {
        self.from_cache.is_empty() && self.failed.is_empty()
    }
}

/// Where a namespace's snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Source {
    Remote { replaced: bool },
    Cache,
    Unavailable,
}

/// Everything the background loops share.
pub(crate) struct SyncContext {
    endpoint: Endpoint,
    secret: String,
    ip: String,
    fetch_timeout: Duration,
    long_poll_timeout: Duration,
    transport: Arc<dyn ConfigTransport>,
    store: ConfigStore,
    cache: DiskCache,
    notifier: ChangeNotifier,
    notifications: RwLock<BTreeMap<String, i64>>,
    stats: RwLock<SyncStats>,
}

impl SyncContext {
    pub(crate) fn new(
        config: &ClientConfig,
        transport: Arc<dyn ConfigTransport>,
    ) -> SyncResult<Self> {
        config.validate()?;

        let endpoint = Endpoint::new(&config.config_url, &config.app_id, &config.cluster)?;
        let cache_dir = config
            .cache_dir
            .clone()
            .unwrap_or_else(DiskCache::default_dir);

        Ok(Self {
            endpoint,
            secret: config.secret.clone(),
            ip: config.ip.clone().unwrap_or_else(local_ip),
            fetch_timeout: config.fetch_timeout,
            long_poll_timeout: config.long_poll_timeout,
            transport,
            store: ConfigStore::new(),
            cache: DiskCache::new(cache_dir, &config.app_id),
            notifier: ChangeNotifier::new(config.change_listeners.clone()),
            notifications: RwLock::new(config.notification_map.clone()),
            stats: RwLock::new(SyncStats::default()),
        })
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) fn ip(&self) -> &str {
        &self.ip
    }

    pub(crate) fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub(crate) fn cache(&self) -> &DiskCache {
        &self.cache
    }

    pub(crate) fn long_poll_timeout(&self) -> Duration {
        self.long_poll_timeout
    }

    pub(crate) fn stats(&self) -> SyncStats {
        let mut stats = self.stats.read().clone();
        stats.failed_deliveries = self.notifier.failed_deliveries();
        stats
    }

    /// Current namespace → last seen notification id.
    pub(crate) fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .read()
            .iter()
            .map(|(ns, id)| Notification::new(ns.clone(), *id))
            .collect()
    }

    pub(crate) fn subscribed_namespaces(&self) -> Vec<String> {
        self.notifications.read().keys().cloned().collect()
    }

    pub(crate) fn set_notification_id(&self, namespace: &str, id: i64) {
        self.notifications.write().insert(namespace.to_string(), id);
    }

    pub(crate) fn record_long_poll(&self, notified: usize) {
        let mut stats = self.stats.write();
        stats.long_polls += 1;
        stats.notifications_received += notified as u64;
    }

    pub(crate) fn record_error(&self, err: &SyncError) {
        self.stats.write().last_error = Some(err.to_string());
    }

    /// Sends a GET, signed when a secret is configured.
    pub(crate) fn request(&self, url: &str, timeout: Duration) -> SyncResult<HttpResponse> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let headers = sign_headers(
            self.endpoint.app_id(),
            &self.secret,
            self.endpoint.path_with_query(url),
            timestamp,
        )?;
        self.transport.get(url, timeout, &headers)
    }

    /// Fetches the current snapshot of `namespace` from the server.
    pub(crate) fn fetch_remote(&self, namespace: &str) -> SyncResult<ApolloConfig> {
        let url = self.endpoint.config_url(namespace, &self.ip);
        let response = self.request(&url, self.fetch_timeout)?;

        if response.status != 200 {
            return Err(SyncError::HttpStatus(response.status));
        }
        Ok(ApolloConfig::from_json(&response.body)?)
    }

    /// Offers a server snapshot and mirrors the stored one to disk.
    ///
    /// The stored snapshot is read under the cache lock, so the file always
    /// ends up holding the latest accepted release.
    ///
    /// Returns true if the release changed.
    pub(crate) fn apply_remote(&self, namespace: &str, snapshot: ApolloConfig) -> bool {
        let outcome = self.store.accept(namespace, snapshot);

        let written = self.cache.write_with(namespace, || self.store.snapshot(namespace));
        if let Err(e) = written {
            warn!(namespace, error = %e, "failed to write cache file");
            self.record_error(&e);
        }

        self.finish_accept(outcome)
    }

    /// Offers the disk snapshot of `namespace`, if any.
    ///
    /// Returns `None` when nothing is cached.
    pub(crate) fn apply_fallback(&self, namespace: &str) -> Option<bool> {
        let snapshot = self.cache.read(namespace)?;
        debug!(namespace, release = %snapshot.release_key, "using cached snapshot");
        let outcome = self.store.accept(namespace, snapshot);
        Some(self.finish_accept(outcome))
    }

    fn finish_accept(&self, outcome: AcceptOutcome) -> bool {
        let replaced = outcome.is_replaced();
        if replaced {
            self.stats.write().releases_accepted += 1;
        }
        self.dispatch(outcome.changes());
        replaced
    }

    fn dispatch(&self, events: &[ChangeEvent]) {
        if events.is_empty() {
            return;
        }
        self.notifier.dispatch(events);
        self.stats.write().events_dispatched += events.len() as u64;
    }

    /// Syncs one namespace, falling back to the disk cache.
    pub(crate) fn sync_namespace(&self, namespace: &str) -> Source {
        let err = match self.fetch_remote(namespace) {
            Ok(snapshot) => {
                let replaced = self.apply_remote(namespace, snapshot);
                return Source::Remote { replaced };
            }
            Err(e) => e,
        };

        warn!(namespace, error = %err, "fetch failed, trying disk cache");
        {
            let mut stats = self.stats.write();
            stats.fetch_failures += 1;
            stats.last_error = Some(err.to_string());
        }

        match self.apply_fallback(namespace) {
            Some(_) => {
                self.stats.write().cache_fallbacks += 1;
                Source::Cache
            }
            None => {
                warn!(namespace, "no cached snapshot available");
                Source::Unavailable
            }
        }
    }

    /// Syncs every subscribed namespace.
    pub(crate) fn sync_all(&self) -> SyncReport {
        let mut report = SyncReport::default();

        for namespace in self.subscribed_namespaces() {
            match self.sync_namespace(&namespace) {
                Source::Remote { replaced: true } => report.updated.push(namespace),
                Source::Remote { replaced: false } => report.unchanged.push(namespace),
                Source::Cache => report.from_cache.push(namespace),
                Source::Unavailable => report.failed.push(namespace),
            }
        }

        let mut stats = self.stats.write();
        stats.cycles_completed += 1;
        stats.last_sync_time = Some(Instant::now());
        drop(stats);

        debug!(
            updated = report.updated.len(),
            unchanged = report.unchanged.len(),
            from_cache = report.from_cache.len(),
            failed = report.failed.len(),
            "sync cycle finished"
        );
        report
    }
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("endpoint", &self.endpoint)
            .field("ip", &self.ip)
            .field("cache", &self.cache)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}
