use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Running,
    Stopped,
    /// The loop panicked. Workers are never restarted.
    Dead,
}

/// Shared view of a worker's state, readable from any thread.
#[derive(Clone, Debug)]
pub struct WorkerHealth {
    state: Arc<AtomicU8>,
}

impl WorkerHealth {
    fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(WorkerState::Running as u8)),
        }
    }

    pub fn state(&self) -> WorkerState {
        match self.state.load(Ordering::Acquire) {
            0 => WorkerState::Running,
            1 => WorkerState::Stopped,
            _ => WorkerState::Dead,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.state() == WorkerState::Dead
    }

    fn set(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// A running worker thread that hands its owned state back when it exits.
pub struct WorkerHandle<S> {
    name: &'static str,
    done_rx: Receiver<S>,
    join: JoinHandle<()>,
    health: WorkerHealth,
}

/// Runs `body` on a new thread with exclusive access to `state`.
///
/// A panic inside `body` is caught and marks the worker dead; `state` is
/// still handed back, so the caller can release what it holds.
pub fn spawn_worker<S, F>(name: &'static str, mut state: S, body: F) -> WorkerHandle<S>
where
    S: Send + 'static,
    F: FnOnce(&mut S) + Send + 'static,
{
    let health = WorkerHealth::new();
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let thread_health = health.clone();

    let join = std::thread::spawn(move || {
        match panic::catch_unwind(AssertUnwindSafe(|| body(&mut state))) {
            Ok(()) => thread_health.set(WorkerState::Stopped),
            Err(_) => {
                log::error!("{name} worker panicked; it will not be restarted");
                thread_health.set(WorkerState::Dead);
            }
        }
        let _ = done_tx.send(state);
    });

    WorkerHandle {
        name,
        done_rx,
        join,
        health,
    }
}

impl<S> WorkerHandle<S> {
    pub fn health(&self) -> WorkerHealth {
        self.health.clone()
    }

    /// Waits up to `timeout` for the worker to exit and returns its state.
    ///
    /// On timeout the handle itself comes back, so the state can still be
    /// collected once the worker gets there.
    pub fn finish(self, timeout: Duration) -> Result<S, Self> {
        match self.done_rx.recv_timeout(timeout) {
            Ok(state) => {
                if self.join.join().is_err() {
                    log::warn!("{} worker exited abnormally after handing back", self.name);
                }
                Ok(state)
            }
            Err(_) => {
                log::warn!("{} worker did not stop within {timeout:?}", self.name);
                Err(self)
            }
        }
    }
}

impl<S> fmt::Debug for WorkerHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("name", &self.name)
            .field("state", &self.health.state())
            .finish()
    }
}
