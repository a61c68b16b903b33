//! Configuration for the Apollo client.

use crate::error::{SyncError, SyncResult};
use crate::notifier::ChangeListener;
use apollo_protocol::{DEFAULT_CLUSTER, DEFAULT_NAMESPACE, INITIAL_NOTIFICATION_ID};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for one Apollo client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the config service (e.g., "http://localhost:8080").
    pub config_url: String,
    /// Application id.
    pub app_id: String,
    /// Cluster name.
    pub cluster: String,
    /// Shared secret for request signing. Empty means unsigned requests.
    pub secret: String,
    /// Client IP reported to the server. Detected when `None`.
    pub ip: Option<String>,
    /// Run the periodic full pull in the background.
    pub use_scheduled_update: bool,
    /// Run the long-poll watcher in the background.
    pub use_long_poll_update: bool,
    /// Listeners receiving key-level change events.
    pub change_listeners: Vec<Arc<dyn ChangeListener>>,
    /// Subscribed namespaces with their initial notification ids.
    pub notification_map: BTreeMap<String, i64>,
    /// Directory holding the disk cache. Defaults to `~/data/apollo/cache`.
    pub cache_dir: Option<PathBuf>,
    /// Timeout of a regular snapshot fetch.
    pub fetch_timeout: Duration,
    /// Timeout of one long-poll request.
    pub long_poll_timeout: Duration,
    /// Delay between long-poll attempts.
    pub poll_interval: Duration,
    /// Interval of the scheduled full pull.
    pub sync_interval: Duration,
}

impl ClientConfig {
    /// Creates a configuration subscribed to the `application` namespace.
    pub fn new(config_url: impl Into<String>, app_id: impl Into<String>) -> Self {
        let mut notification_map = BTreeMap::new();
        notification_map.insert(DEFAULT_NAMESPACE.to_string(), INITIAL_NOTIFICATION_ID);

        Self {
            config_url: config_url.into(),
            app_id: app_id.into(),
            cluster: DEFAULT_CLUSTER.to_string(),
            secret: String::new(),
            ip: None,
            use_scheduled_update: true,
            use_long_poll_update: false,
            change_listeners: Vec::new(),
            notification_map,
            cache_dir: None,
            fetch_timeout: Duration::from_secs(3),
            long_poll_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            sync_interval: Duration::from_secs(10 * 60),
        }
    }

    /// Sets the cluster.
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    /// Sets the signing secret.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    /// Overrides the client IP reported to the server.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Enables or disables the scheduled full pull.
    pub fn with_scheduled_update(mut self, enabled: bool) -> Self {
        self.use_scheduled_update = enabled;
        self
    }

    /// Enables or disables the long-poll watcher.
    pub fn with_long_poll_update(mut self, enabled: bool) -> Self {
        self.use_long_poll_update = enabled;
        self
    }

    /// Registers a change listener.
    pub fn with_listener<L: ChangeListener + 'static>(self, listener: L) -> Self {
        self.with_shared_listener(Arc::new(listener))
    }

    /// Registers an already shared change listener.
    ///
    /// Configurations sharing the same listener `Arc` map to the same
    /// registry entry.
    pub fn with_shared_listener(mut self, listener: Arc<dyn ChangeListener>) -> Self {
        self.change_listeners.push(listener);
        self
    }

    /// Subscribes to exactly `namespaces`, each starting at the initial
    /// notification id.
    pub fn with_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.notification_map = namespaces
            .into_iter()
            .map(|ns| (ns.into(), INITIAL_NOTIFICATION_ID))
            .collect();
        self
    }

    /// Replaces the namespace → notification id map.
    pub fn with_notification_map(mut self, map: BTreeMap<String, i64>) -> Self {
        self.notification_map = map;
        self
    }

    /// Sets the disk cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Sets the regular fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Sets the long-poll request timeout.
    pub fn with_long_poll_timeout(mut self, timeout: Duration) -> Self {
        self.long_poll_timeout = timeout;
        self
    }

    /// Sets the delay between long-poll attempts.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the scheduled pull interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Checks the required fields.
    pub fn validate(&self) -> SyncResult<()> {
        if self.config_url.trim().is_empty() {
            return Err(SyncError::Config("config_url is required".into()));
        }
        if self.app_id.trim().is_empty() {
            return Err(SyncError::Config("app_id is required".into()));
        }
        if self.cluster.is_empty() {
            return Err(SyncError::Config("cluster must not be empty".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("config_url", &self.config_url)
            .field("app_id", &self.app_id)
            .field("cluster", &self.cluster)
            .field("secret", &if self.secret.is_empty() { "" } else { "***" })
            .field("ip", &self.ip)
            .field("use_scheduled_update", &self.use_scheduled_update)
            .field("use_long_poll_update", &self.use_long_poll_update)
            .field("change_listeners", &self.change_listeners.len())
            .field("notification_map", &self.notification_map)
            .field("cache_dir", &self.cache_dir)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("long_poll_timeout", &self.long_poll_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("sync_interval", &self.sync_interval)
            .finish()
    }
}
