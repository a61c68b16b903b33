//! Periodic full pull of every subscribed namespace.

use crate::engine::{SyncContext, SyncReport};
use crate::error::SyncResult;
use crate::worker::{spawn_detached, Worker, WorkerState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Background loop re-fetching all namespaces at a fixed interval.
///
/// Each iteration pulls first and then waits, so the first cycle runs as soon
/// as the loop starts.
#[derive(Debug)]
pub struct SyncScheduler {
    context: Arc<SyncContext>,
    interval: Duration,
    worker: Arc<Worker>,
}

impl SyncScheduler {
    pub(crate) fn new(context: Arc<SyncContext>, interval: Duration) -> Self {
        Self {
            context,
            interval,
            worker: Arc::new(Worker::new("apollo-scheduler")),
        }
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Returns the pull interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one full pull on the calling thread.
    pub fn run_cycle(&self) -> SyncReport {
        self.context.sync_all()
    }

    /// Spawns the loop thread.
    ///
    /// Returns `Ok(false)` if it was already running, and
    /// [`SyncError::InvalidStateTransition`](crate::SyncError::InvalidStateTransition)
    /// after `stop`.
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

        info!(interval_secs = self.interval.as_secs(), "scheduled update started");
        Ok(true)
    }

    /// Requests the loop to exit. The current cycle, if any, completes first.
    pub fn stop(&self) -> bool {
        self.worker.halt()
    }
}

fn run(context: &SyncContext, interval: Duration, worker: &Worker) {
    loop {
        let report = context.sync_all();
        if !report.is_complete() {
            debug!(
                from_cache = ?report.from_cache,
                failed = ?report.failed,
                "scheduled pull incomplete"
            );
        }
        if worker.pause(interval) {
            break;
        }
    }
    info!("scheduled update stopped");
}
