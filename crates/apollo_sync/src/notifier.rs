//! Key-level change detection and delivery.
//!
//! When a namespace moves to a new release, the old and new configurations
//! are compared and one [`ChangeEvent`] is produced per differing key:
//!
//! 1. keys of the old configuration, in order: missing → `Delete`,
//!    different value → `Update`
//! 2. keys only in the new configuration, in order → `Add`
//!
//! Events are then delivered to every registered listener. A panicking
//! listener is isolated: it is logged and delivery continues.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Kind of key-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    /// Key appeared in the new release.
    Add,
    /// Key exists in both releases with different values.
    Update,
    /// Key disappeared in the new release.
    Delete,
}

impl ChangeAction {
    /// Lowercase name (`add`, `update`, `delete`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Add => "add",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A single key change between two releases of a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Type of change.
    pub action: ChangeAction,
    /// Namespace the key belongs to.
    pub namespace: String,
    /// Configuration key.
    pub key: String,
    /// New value. `None` for deletes.
    pub value: Option<String>,
    /// Previous value. `None` for adds.
    pub old_value: Option<String>,
}

impl ChangeEvent {
    /// Creates an add event.
    pub fn add(namespace: &str, key: &str, value: &str) -> Self {
        Self {
            action: ChangeAction::Add,
            namespace: namespace.to_string(),
            key: key.to_string(),
            value: Some(value.to_string()),
            old_value: None,
        }
    }

    /// Creates an update event.
    pub fn update(namespace: &str, key: &str, old_value: &str, value: &str) -> Self {
        Self {
            action: ChangeAction::Update,
            namespace: namespace.to_string(),
            key: key.to_string(),
            value: Some(value.to_string()),
            old_value: Some(old_value.to_string()),
        }
    }

    /// Creates a delete event.
    pub fn delete(namespace: &str, key: &str, old_value: &str) -> Self {
        Self {
            action: ChangeAction::Delete,
            namespace: namespace.to_string(),
            key: key.to_string(),
            value: None,
            old_value: Some(old_value.to_string()),
        }
    }
}

/// Receives change events.
///
/// Implemented for every `Fn(&ChangeEvent) + Send + Sync` closure.
pub trait ChangeListener: Send + Sync {
    /// Called once per change event, on the thread that accepted the release.
    fn on_change(&self, event: &ChangeEvent);
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent) {
        self(event)
    }
}

/// Computes the ordered key-level differences between two configurations.
pub fn diff(
    namespace: &str,
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> Vec<ChangeEvent> {
    let mut events = Vec::new();

    for (key, old_value) in old {
        match new.get(key) {
            None => events.push(ChangeEvent::delete(namespace, key, old_value)),
            Some(new_value) if new_value != old_value => {
                events.push(ChangeEvent::update(namespace, key, old_value, new_value))
            }
            Some(_) => {}
        }
    }

    for (key, new_value) in new {
        if !old.contains_key(key) {
            events.push(ChangeEvent::add(namespace, key, new_value));
        }
    }

    events
}

/// Delivers change events to a fixed set of listeners.
pub struct ChangeNotifier {
    listeners: Vec<Arc<dyn ChangeListener>>,
    failed_deliveries: AtomicU64,
}

impl ChangeNotifier {
    /// Creates a notifier. The listener set cannot change afterwards.
    pub fn new(listeners: Vec<Arc<dyn ChangeListener>>) -> Self {
        Self {
            listeners,
            failed_deliveries: AtomicU64::new(0),
        }
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Returns how many listener invocations panicked so far.
    pub fn failed_deliveries(&self) -> u64 {
        self.failed_deliveries.load(Ordering::Relaxed)
    }

    /// Delivers every event to every listener, in order.
    ///
    /// Returns the number of successful listener invocations.
    pub fn dispatch(&self, events: &[ChangeEvent]) -> usize {
        let mut delivered = 0;

        for event in events {
            for listener in &self.listeners {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.on_change(event)));
                match outcome {
                    Ok(()) => delivered += 1,
                    Err(payload) => {
                        self.failed_deliveries.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            namespace = %event.namespace,
                            key = %event.key,
                            action = %event.action,
                            reason = panic_message(payload.as_ref()),
                            "change listener panicked"
                        );
                    }
                }
            }
        }

        delivered
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.listeners.len())
            .field("failed_deliveries", &self.failed_deliveries())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
