//! In-memory configuration store.
//!
//! The store maps each namespace to its current snapshot and is the source of
//! truth for every read accessor. It is only mutated through
//! [`ConfigStore::accept`], which replaces a snapshot iff its release key
//! differs from the stored one.

use crate::notifier::{diff, ChangeEvent};
use apollo_protocol::ApolloConfig;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of offering a snapshot to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum AcceptOutcome {
    /// The stored release key already matched; nothing changed.
    Unchanged,
    /// The snapshot replaced the previous one.
    Replaced {
        /// Release key that was replaced (`"-1"` if there was none).
        previous_release: String,
        /// The snapshot now stored.
        snapshot: Arc<ApolloConfig>,
        /// Key-level changes to notify. Empty before bootstrap completes.
        changes: Vec<ChangeEvent>,
    },
}

impl AcceptOutcome {
    /// Returns true if the stored snapshot was replaced.
    pub fn is_replaced(&self) -> bool {
        matches!(self, AcceptOutcome::Replaced { .. })
    }

    /// Returns the change events to dispatch.
    pub fn changes(&self) -> &[ChangeEvent] {
        match self {
            AcceptOutcome::Unchanged => &[],
            AcceptOutcome::Replaced { changes, .. } => changes,
        }
    }
}

/// Namespace → current snapshot.
///
/// Compare-and-replace runs under one write lock, so acceptance is serialized
/// per store and therefore linearizable per namespace. Reads take the shared
/// side of the lock and never wait on network or disk.
#[derive(Debug, Default)]
pub struct ConfigStore {
    snapshots: RwLock<HashMap<String, Arc<ApolloConfig>>>,
    bootstrapped: AtomicBool,
}

impl ConfigStore {
    /// Creates an empty store in bootstrap mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaves bootstrap mode: later replacements produce change events.
    pub fn mark_bootstrapped(&self) {
        self.bootstrapped.store(true, Ordering::SeqCst);
    }

    /// Returns true once the initial load has completed.
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::SeqCst)
    }

    /// Offers a snapshot for `namespace`.
    ///
    /// A missing entry counts as the bootstrap sentinel (`"-1"`, empty).
    /// Equal release keys are a no-op. Otherwise the snapshot is stored and,
    /// once bootstrapped, the diff against the previous configuration is
    /// returned.
    pub fn accept(&self, namespace: &str, snapshot: ApolloConfig) -> AcceptOutcome {
        let mut snapshots = self.snapshots.write();

        let previous = snapshots
            .get(namespace)
            .cloned()
            .unwrap_or_else(|| Arc::new(ApolloConfig::bootstrap()));

        if previous.same_release(&snapshot) {
            debug!(namespace, release = %snapshot.release_key, "release unchanged");
            return AcceptOutcome::Unchanged;
        }

        let snapshot = Arc::new(snapshot);
        snapshots.insert(namespace.to_string(), Arc::clone(&snapshot));
        drop(snapshots);

        info!(
            namespace,
            from = %previous.release_key,
            to = %snapshot.release_key,
            "accepted new release"
        );

        let changes = if self.is_bootstrapped() {
            diff(namespace, &previous.configurations, &snapshot.configurations)
        } else {
            Vec::new()
        };

        AcceptOutcome::Replaced {
            previous_release: previous.release_key.clone(),
            snapshot,
            changes,
        }
    }

    /// Returns the current snapshot of `namespace`.
    pub fn snapshot(&self, namespace: &str) -> Option<Arc<ApolloConfig>> {
        self.snapshots.read().get(namespace).cloned()
    }

    /// Returns the value of `key`, if present.
    pub fn get(&self, namespace: &str, key: &str) -> Option<String> {
        self.snapshots
            .read()
            .get(namespace)
            .and_then(|s| s.get(key))
            .map(str::to_string)
    }

    /// Returns the value of `key`, or `default`.
    pub fn get_value(&self, namespace: &str, key: &str, default: &str) -> String {
        self.get(namespace, key)
            .unwrap_or_else(|| default.to_string())
    }

    /// Returns all key/value pairs of `namespace`, or `None` if never loaded.
    pub fn get_all(&self, namespace: &str) -> Option<BTreeMap<String, String>> {
        self.snapshots
            .read()
            .get(namespace)
            .map(|s| s.configurations.clone())
    }

    /// Returns the stored release key of `namespace`.
    pub fn release_key(&self, namespace: &str) -> Option<String> {
        self.snapshots
            .read()
            .get(namespace)
            .map(|s| s.release_key.clone())
    }

    /// Returns the loaded namespaces, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshots.read().keys().cloned().collect();
        names.sort();
        names
    }
}
