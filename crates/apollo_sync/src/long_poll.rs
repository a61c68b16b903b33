//! Long-poll watcher.
//!
//! Each iteration sends the last-seen notification id of every subscribed
//! namespace to `/notifications/v2` and blocks until the server either
//! answers `304` (nothing changed within the hold time) or `200` with the
//! namespaces whose id moved on. Every notified namespace is then fetched
//! and applied.

use crate::engine::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::worker::{spawn_detached, Worker, WorkerState};
use apollo_protocol::decode_notifications;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one long-poll iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// No namespace is subscribed; no request was sent.
    Skipped,
    /// The server reported no change.
    NoChange,
    /// The server notified these namespaces, in response order.
    Changed(Vec<String>),
}

/// Background loop applying server-pushed changes.
#[derive(Debug)]
pub struct LongPollWatcher {
    context: Arc<SyncContext>,
    interval: Duration,
    worker: Arc<Worker>,
}

impl LongPollWatcher {
    pub(crate) fn new(context: Arc<SyncContext>, interval: Duration) -> Self {
        Self {
            context,
            interval,
            worker: Arc::new(Worker::new("apollo-long-poll")),
        }
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Performs one long-poll request on the calling thread.
    ///
    /// Blocks up to the configured long-poll timeout.
    pub fn poll_once(&self) -> SyncResult<PollOutcome> {
        poll(&self.context)
    }

    /// Spawns the loop thread.
    ///
    /// Returns `Ok(false)` if it was already running.
    pub fn start(&self) -> SyncResult<bool> {
        if !self.worker.begin()? {
            return Ok(false);
        }

        let context = Arc::clone(&self.context);
        let worker = Arc::clone(&self.worker);
        let interval = self.interval;
        let spawned = spawn_detached(self.worker.name(), move || run(&context, interval, &worker));
        if let Err(e) = spawned {
            self.worker.halt();
            return Err(e);
        }

        info!("long-poll update started");
        Ok(true)
    }

    /// Requests the loop to exit. An in-flight poll is not interrupted.
    pub fn stop(&self) -> bool {
        self.worker.halt()
    }
}

fn run(context: &SyncContext, interval: Duration, worker: &Worker) {
    while !worker.should_stop() {
        match poll(context) {
            Ok(PollOutcome::Changed(namespaces)) => {
                debug!(?namespaces, "long poll applied changes");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "long poll failed");
                context.record_error(&e);
            }
        }

        if worker.pause(interval) {
            break;
        }
    }
    info!("long-poll update stopped");
}

fn poll(context: &SyncContext) -> SyncResult<PollOutcome> {
    let notifications = context.notifications();
    if notifications.is_empty() {
        return Ok(PollOutcome::Skipped);
    }

    let url = context.endpoint().notifications_url(&notifications)?;
    let response = context.request(&url, context.long_poll_timeout())?;

    match response.status {
        304 => {
            context.record_long_poll(0);
            debug!("no change");
            Ok(PollOutcome::NoChange)
        }
        200 => {
            let notified = decode_notifications(&response.body)?;
            context.record_long_poll(notified.len());

            let mut namespaces = Vec::with_capacity(notified.len());
            for entry in notified {
                let namespace = entry.namespace_name;
                context.set_notification_id(&namespace, entry.notification_id);

                match context.fetch_remote(&namespace) {
                    Ok(snapshot) => {
                        context.apply_remote(&namespace, snapshot);
                    }
                    Err(e) => {
                        warn!(
                            namespace = %namespace,
                            error = %e,
                            "fetch after notification failed"
                        );
                        context.record_error(&e);
                    }
                }
                namespaces.push(namespace);
            }
            Ok(PollOutcome::Changed(namespaces))
        }
        status => Err(SyncError::HttpStatus(status)),
    }
}
