//! Shared client instances keyed by configuration.

use crate::client::ApolloClient;
use crate::config::ClientConfig;
use crate::error::SyncResult;
use crate::transport::ConfigTransport;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Canonical identity of a [`ClientConfig`].
///
/// Two configurations map to the same key iff every field is equal and they
/// hold the same listener `Arc`s in the same order.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    config_url: String,
    app_id: String,
    cluster: String,
    secret: String,
    ip: Option<String>,
    use_scheduled_update: bool,
    use_long_poll_update: bool,
    notification_map: Vec<(String, i64)>,
    cache_dir: Option<PathBuf>,
    fetch_timeout: Duration,
    long_poll_timeout: Duration,
    poll_interval: Duration,
    sync_interval: Duration,
    listeners: Vec<usize>,
}

impl RegistryKey {
    /// Derives the key of `config`.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            config_url: config.config_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            cluster: config.cluster.clone(),
            secret: config.secret.clone(),
            ip: config.ip.clone(),
            use_scheduled_update: config.use_scheduled_update,
            use_long_poll_update: config.use_long_poll_update,
            notification_map: config
                .notification_map
                .iter()
                .map(|(ns, id)| (ns.clone(), *id))
                .collect(),
            cache_dir: config.cache_dir.clone(),
            fetch_timeout: config.fetch_timeout,
            long_poll_timeout: config.long_poll_timeout,
            poll_interval: config.poll_interval,
            sync_interval: config.sync_interval,
            listeners: config
                .change_listeners
                .iter()
                .map(|l| Arc::as_ptr(l) as *const () as usize)
                .collect(),
        }
    }
}

impl fmt::Debug for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryKey")
            .field("config_url", &self.config_url)
            .field("app_id", &self.app_id)
            .field("cluster", &self.cluster)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

type Slot = Arc<Mutex<Option<Arc<ApolloClient>>>>;

/// Process-wide set of clients, one per distinct configuration.
///
/// Owned by the application's composition root. Entries are never evicted.
/// Each key has its own slot, so building one client (which performs a
/// blocking initial pull) never delays callers asking for another key.
#[derive(Default)]
pub struct ClientRegistry {
    slots: Mutex<HashMap<RegistryKey, Slot>>,
}

impl ClientRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the client for `config`, connecting over HTTP if needed.
    pub fn get_or_connect(&self, config: ClientConfig) -> SyncResult<Arc<ApolloClient>> {
        self.get_or_insert_with(config, ApolloClient::connect)
    }

    /// Returns the client for `config`, creating it over `transport` if
    /// needed. An existing client keeps the transport it was built with.
    pub fn get_or_create(
        &self,
        config: ClientConfig,
        transport: Arc<dyn ConfigTransport>,
    ) -> SyncResult<Arc<ApolloClient>> {
        self.get_or_insert_with(config, |config| ApolloClient::new(config, transport))
    }

    /// Returns the existing client for `config`, if any.
    ///
    /// Waits while the client for that key is being built.
    pub fn get(&self, config: &ClientConfig) -> Option<Arc<ApolloClient>> {
        let slot = self
            .slots
            .lock()
            .get(&RegistryKey::from_config(config))
            .cloned()?;
        let client = slot.lock().clone();
        client
    }

    /// Number of distinct clients.
    pub fn len(&self) -> usize {
        self.filled().len()
    }

    /// Returns true if no client was created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clients built so far. Waits for constructions in flight.
    fn filled(&self) -> Vec<Arc<ApolloClient>> {
        let slots: Vec<Slot> = self.slots.lock().values().cloned().collect();
        slots.iter().filter_map(|slot| slot.lock().clone()).collect()
    }

    fn get_or_insert_with<F>(
        &self,
        config: ClientConfig,
        create: F,
    ) -> SyncResult<Arc<ApolloClient>>
    where
        F: FnOnce(ClientConfig) -> SyncResult<ApolloClient>,
    {
        let key = RegistryKey::from_config(&config);
        let slot = Arc::clone(self.slots.lock().entry(key).or_default());

        let mut client = slot.lock();
        if let Some(existing) = client.as_ref() {
            debug!(app_id = %config.app_id, "reusing registered client");
            return Ok(Arc::clone(existing));
        }

        // A failed construction leaves the slot empty for the next caller.
        let created = Arc::new(create(config)?);
        *client = Some(Arc::clone(&created));
        Ok(created)
    }
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("clients", &self.len())
            .finish()
    }
}
