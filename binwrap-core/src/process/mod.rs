//! Managed execution of wrapped binaries.
//!
//! [`ProcessRunner`] launches a program with preset arguments, environment and
//! stdio wiring, drains its output concurrently and enforces an optional
//! deadline. A [`KillSwitch`] lets other tasks terminate the live process.

mod runner;

pub use runner::{ProcessRunner, StdinSource, StdoutSink};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Handle to the process currently started by a runner.
#[derive(Debug)]
pub(crate) struct LiveProcess {
    pub pid: Option<u32>,
    pub terminate: Arc<Notify>,
}

// ============================================================================
// Kill Switch
// ============================================================================

/// Cloneable handle that terminates a runner's live process.
///
/// Every clone refers to the same runner. Usable from any task or thread.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch {
    live: Arc<Mutex<Option<LiveProcess>>>,
}

impl KillSwitch {
    /// Requests termination of the live process.
    ///
    /// Returns `false` when nothing is running. A request made before the
    /// process has been started does not carry over to it.
    pub fn kill(&self) -> bool {
        match self.lock().as_ref() {
            Some(LiveProcess {
                pid: Some(pid),
                terminate,
            }) => {
                tracing::debug!("Kill requested for pid {}", pid);
                terminate.notify_one();
                true
            }
            _ => false,
        }
    }

    /// Returns true while a process started by the runner is alive.
    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    pub(crate) fn set(&self, live: Option<LiveProcess>) {
        *self.lock() = live;
    }

    fn lock(&self) -> MutexGuard<'_, Option<LiveProcess>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
