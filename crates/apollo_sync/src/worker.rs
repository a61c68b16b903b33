//! Background worker lifecycle and stop signalling.

use crate::error::{SyncError, SyncResult};
use parking_lot::{Condvar, Mutex, RwLock};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

/// Lifecycle of a background worker.
///
/// Transitions are one-directional: `Idle → Running → Stopped`. A stopped
/// worker cannot be restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, never started.
    Idle,
    /// Loop thread is running.
    Running,
    /// Stop was requested.
    Stopped,
}

impl WorkerState {
    /// Returns true while the loop is active.
    pub fn is_running(&self) -> bool {
        matches!(self, WorkerState::Running)
    }

    /// Returns true if `start` would spawn a loop.
    pub fn can_start(&self) -> bool {
        matches!(self, WorkerState::Idle)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Idle => "idle",
            WorkerState::Running => "running",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Wakeable stop flag shared between a worker and its owner.
#[derive(Debug, Default)]
pub(crate) struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    pub(crate) fn stop(&self) {
        *self.stopped.lock() = true;
        self.cond.notify_all();
    }

    pub(crate) fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleeps up to `timeout`. Returns true if stop was requested.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while !*stopped {
                self.cond.wait(&mut stopped);
            }
            return true;
        };

        while !*stopped {
            if self.cond.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// State plus stop signal of one background loop.
#[derive(Debug)]
pub(crate) struct Worker {
    name: &'static str,
    state: RwLock<WorkerState>,
    signal: StopSignal,
}

impl Worker {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            state: RwLock::new(WorkerState::Idle),
            signal: StopSignal::default(),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn state(&self) -> WorkerState {
        *self.state.read()
    }

    /// Moves `Idle → Running`.
    ///
    /// Returns `Ok(false)` if already running.
    pub(crate) fn begin(&self) -> SyncResult<bool> {
        let mut state = self.state.write();
        match *state {
            WorkerState::Idle => {
                *state = WorkerState::Running;
                Ok(true)
            }
            WorkerState::Running => Ok(false),
            WorkerState::Stopped => Err(SyncError::InvalidStateTransition {
                from: WorkerState::Stopped.to_string(),
                to: WorkerState::Running.to_string(),
            }),
        }
    }

    /// Moves to `Stopped` and wakes the loop. Returns false if already stopped.
    pub(crate) fn halt(&self) -> bool {
        let mut state = self.state.write();
        if *state == WorkerState::Stopped {
            return false;
        }
        *state = WorkerState::Stopped;
        drop(state);
        self.signal.stop();
        true
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.signal.is_stopped()
    }

    /// Sleeps up to `timeout`. Returns true if the loop should exit.
    pub(crate) fn pause(&self, timeout: Duration) -> bool {
        self.signal.wait(timeout)
    }
}

/// Spawns a named, detached thread.
pub(crate) fn spawn_detached<F>(name: &str, body: F) -> SyncResult<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map(|_| ())
        .map_err(|e| SyncError::Worker(format!("failed to spawn {}: {}", name, e)))
}
