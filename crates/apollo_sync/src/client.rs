//! The client facade.

use crate::config::ClientConfig;
use crate::engine::{SyncContext, SyncReport, SyncStats};
use crate::error::SyncResult;
use crate::http::HttpTransport;
use crate::long_poll::LongPollWatcher;
use crate::scheduler::SyncScheduler;
use crate::transport::ConfigTransport;
use crate::worker::{Worker, WorkerState};
use apollo_protocol::DEFAULT_NAMESPACE;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// A configuration client for one application and cluster.
///
/// Construction performs one synchronous full pull, so every read accessor
/// returns the server's (or the disk cache's) values from the first call on.
/// Background refresh starts with [`start`](Self::start).
///
/// # Example
///
/// ```no_run
/// use apollo_sync::{ApolloClient, ClientConfig};
///
/// let client = ApolloClient::connect(ClientConfig::new("http://localhost:8080", "demo-service"))?;
/// client.start()?;
/// let timeout = client.get_value("timeout", "100");
/// # let _ = timeout;
/// # Ok::<(), apollo_sync::SyncError>(())
/// ```
#[derive(Debug)]
pub struct ApolloClient {
    context: Arc<SyncContext>,
    scheduler: SyncScheduler,
    watcher: LongPollWatcher,
    use_scheduled_update: bool,
    use_long_poll_update: bool,
    lifecycle: Worker,
}

impl ApolloClient {
    /// Creates a client over `transport` and performs the initial pull.
    ///
    /// No change events are emitted for the initial pull.
    pub fn new(config: ClientConfig, transport: Arc<dyn ConfigTransport>) -> SyncResult<Self> {
        let context = Arc::new(SyncContext::new(&config, transport)?);

        let report = context.sync_all();
        context.store().mark_bootstrapped();
        info!(
            app_id = %config.app_id,
            cluster = %config.cluster,
            loaded = report.updated.len() + report.unchanged.len() + report.from_cache.len(),
            failed = report.failed.len(),
            "apollo client initialized"
        );

        Ok(Self {
            scheduler: SyncScheduler::new(Arc::clone(&context), config.sync_interval),
            watcher: LongPollWatcher::new(Arc::clone(&context), config.poll_interval),
            context,
            use_scheduled_update: config.use_scheduled_update,
            use_long_poll_update: config.use_long_poll_update,
            lifecycle: Worker::new("apollo-client"),
        })
    }

    /// Creates a client over the default HTTP transport.
    pub fn connect(config: ClientConfig) -> SyncResult<Self> {
        let transport = HttpTransport::new()?;
        Self::new(config, Arc::new(transport))
    }

    /// Starts the enabled background workers.
    ///
    /// Calling it again while running is a no-op. A stopped client cannot be
    /// restarted. If a worker fails to start, the client is stopped.
    pub fn start(&self) -> SyncResult<()> {
        if !self.lifecycle.begin()? {
            return Ok(());
        }

        if let Err(e) = self.start_workers() {
            warn!(error = %e, "failed to start background workers");
            self.stop();
            return Err(e);
        }
        Ok(())
    }

    fn start_workers(&self) -> SyncResult<()> {
        if self.use_scheduled_update {
            self.scheduler.start()?;
        }
        if self.use_long_poll_update {
            self.watcher.start()?;
        }
        Ok(())
    }

    /// Signals both workers to exit at their next iteration boundary.
    pub fn stop(&self) {
        if self.lifecycle.halt() {
            info!("stopping apollo client");
        }
        self.scheduler.stop();
        self.watcher.stop();
    }

    /// Returns the client lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    /// Value of `key` in the `application` namespace, or `default`.
    pub fn get_value(&self, key: &str, default: &str) -> String {
        self.get_value_in(DEFAULT_NAMESPACE, key, default)
    }

    /// Value of `key` in `namespace`, or `default`.
    pub fn get_value_in(&self, namespace: &str, key: &str, default: &str) -> String {
        self.context.store().get_value(namespace, key, default)
    }

    /// All key/value pairs of `namespace`, or `None` if it was never loaded.
    pub fn get_config(&self, namespace: &str) -> Option<BTreeMap<String, String>> {
        self.context.store().get_all(namespace)
    }

    /// Release key currently held for `namespace`.
    pub fn release_key(&self, namespace: &str) -> Option<String> {
        self.context.store().release_key(namespace)
    }

    /// Namespaces holding a snapshot, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        self.context.store().namespaces()
    }

    /// Runs a full pull on the calling thread.
    pub fn sync_now(&self) -> SyncReport {
        self.context.sync_all()
    }

    /// Sync counters.
    pub fn stats(&self) -> SyncStats {
        self.context.stats()
    }

    /// Application id.
    pub fn app_id(&self) -> &str {
        self.context.endpoint().app_id()
    }

    /// Cluster name.
    pub fn cluster(&self) -> &str {
        self.context.endpoint().cluster()
    }

    /// Address reported to the server.
    pub fn ip(&self) -> &str {
        self.context.ip()
    }

    /// Directory holding the disk cache.
    pub fn cache_dir(&self) -> &Path {
        self.context.cache().dir()
    }

    /// The scheduled-pull worker.
    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    /// The long-poll worker.
    pub fn watcher(&self) -> &LongPollWatcher {
        &self.watcher
    }
}

impl Drop for ApolloClient {
    fn drop(&mut self) {
        self.stop();
    }
}
