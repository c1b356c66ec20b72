use std::fmt;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::fleet::domain::camera::CameraId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Streaming,
    Recovering,
    /// Terminal.
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Starting => "STARTING",
            WorkerState::Streaming => "STREAMING",
            WorkerState::Recovering => "RECOVERING",
            WorkerState::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// Why a worker reached STOPPED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    StartFailed(String),
    TooManyFailures(u32),
}

/// Messages a worker sends to the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    StateChanged {
        camera_id: CameraId,
        state: WorkerState,
    },
    StartFailed {
        camera_id: CameraId,
        reason: String,
    },
    Stopped {
        camera_id: CameraId,
        reason: StopReason,
    },
}

/// State cell shared between a worker thread and its owner.
///
/// Once STOPPED the state never changes again.
#[derive(Debug)]
pub struct WorkerStatus {
    state: Mutex<WorkerState>,
    changed: Condvar,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerStatus {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WorkerState::Starting),
            changed: Condvar::new(),
        }
    }

    pub fn get(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves to `next`; returns false (no change) if already STOPPED or
    /// already in `next`.
    pub fn transition(&self, next: WorkerState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == WorkerState::Stopped || *state == next {
            return false;
        }
        *state = next;
        self.changed.notify_all();
        true
    }

    /// Blocks until STOPPED or `timeout` elapses. Returns true if stopped.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while *state != WorkerState::Stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            state = guard;
        }
        true
    }
}
