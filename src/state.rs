//! Process-wide deployment state: a single-writer record of progress, status,
//! and current step, readable by any number of concurrent status queries.
//!
//! The `active` flag doubles as the run lock. `try_begin` is the only way to
//! set it, and the returned `RunGuard` clears it on drop, so the lock is
//! released even if the run task exits abnormally.

use std::sync::{Arc, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::catalog::Mode;

/// Run-wide status surfaced to viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Error,
    Complete,
}

#[derive(Debug, Clone)]
struct Inner {
    mode: Mode,
    progress: f32,
    status: RunStatus,
    step: String,
}

/// Singleton run state. Mutated exclusively by the active run routine;
/// snapshots are served to any number of readers.
#[derive(Debug)]
pub struct RunState {
    active: AtomicBool,
    inner: RwLock<Inner>,
}

/// Point-in-time view for the status endpoint. No event history.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub active: bool,
    pub mode: Mode,
    pub state: StateBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateBody {
    pub progress: f32,
    pub status: RunStatus,
    pub step: String,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            inner: RwLock::new(Inner {
                mode: Mode::Automated,
                progress: 0.0,
                status: RunStatus::Idle,
                step: "idle".to_string(),
            }),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Acquire the run lock and reset the record for a fresh run.
    ///
    /// Fails (returns `None`) when a run is already active, with no state
    /// mutated. The returned guard is owned and must be held by the run task
    /// for the run's lifetime.
    pub fn try_begin(self: &Arc<Self>, mode: Mode) -> Option<RunGuard> {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;

        let mut inner = self.inner.write().expect("run state lock poisoned");
        *inner = Inner {
            mode,
            progress: 0.0,
            status: RunStatus::Running,
            step: "starting".to_string(),
        };
        drop(inner);
        Some(RunGuard { state: Arc::clone(self) })
    }

    /// Single-writer update from the run routine.
    pub fn update(&self, progress: f32, status: RunStatus, step: &str) {
        let mut inner = self.inner.write().expect("run state lock poisoned");
        inner.progress = progress;
        inner.status = status;
        inner.step = step.to_string();
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let inner = self.inner.read().expect("run state lock poisoned");
        RunSnapshot {
            active: self.is_active(),
            mode: inner.mode,
            state: StateBody {
                progress: inner.progress,
                status: inner.status,
                step: inner.step.clone(),
            },
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutual-exclusion token for one run. Dropping it releases the lock
/// unconditionally; the state record keeps its final values so a finished
/// run remains inspectable until the next one overwrites it.
pub struct RunGuard {
    state: Arc<RunState>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.state.active.store(false, Ordering::SeqCst);
    }
}
