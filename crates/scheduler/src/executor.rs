//! Execution layer: runs one executable unit on an isolated worker thread.
//!
//! The controller waits on a channel with an optional timeout. Cancellation
//! is cooperative. [`ExecutionHandle::cancel`] raises the unit's
//! [`CancelToken`] and waits a short grace period; a unit that never polls
//! the token keeps running detached and `cancel` reports `false`.

use std::any::Any;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use cpusim_core::Workload;

use crate::unit::{CancelToken, Schedulable, SharedUnit, UnitState};

/// Faults outside a unit's own error handling.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),
    #[error("unit lock poisoned: {0}")]
    LockPoisoned(String),
}

/// What the worker observed once the unit returned.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub unit: String,
    pub state: UnitState,
    pub elapsed: Duration,
    /// The attempt stopped because cancellation was requested.
    pub interrupted: bool,
    pub error: Option<String>,
}

impl RunReport {
    fn from_unit(unit: &dyn Schedulable, cancelled: bool) -> Self {
        let state = unit.state();
        Self {
            unit: unit.name().to_string(),
            state,
            elapsed: unit.elapsed(),
            interrupted: cancelled && !state.is_terminal(),
            error: unit.last_error().map(|e| e.to_string()),
        }
    }
}

/// Result of waiting on a dispatched unit.
#[derive(Debug)]
pub enum Outcome {
    Done(RunReport),
    TimedOut,
    Faulted(ExecutionError),
}

type WorkerMessage = Result<RunReport, ExecutionError>;

/// Spawns one worker per dispatch.
#[derive(Debug, Clone)]
pub struct Executor {
    cancel_grace: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(Duration::from_millis(25))
    }
}

impl Executor {
    pub fn new(cancel_grace: Duration) -> Self {
        Self { cancel_grace }
    }

    pub fn cancel_grace(&self) -> Duration {
        self.cancel_grace
    }

    /// Start `unit` on a fresh worker thread named after `label`, running
    /// whatever workload it already holds.
    pub fn submit(&self, label: &str, unit: SharedUnit) -> Result<ExecutionHandle, ExecutionError> {
        self.spawn(label, unit, None)
    }

    /// Like [`submit`](Self::submit), but the worker hands `workload` to the
    /// unit under the unit's lock right before running it.
    pub fn submit_with(
        &self,
        label: &str,
        unit: SharedUnit,
        workload: Workload,
    ) -> Result<ExecutionHandle, ExecutionError> {
        self.spawn(label, unit, Some(workload))
    }

    fn spawn(
        &self,
        label: &str,
        unit: SharedUnit,
        workload: Option<Workload>,
    ) -> Result<ExecutionHandle, ExecutionError> {
        let token = CancelToken::new();
        let worker_token = token.clone();
        let (tx, rx) = mpsc::channel::<WorkerMessage>();

        let thread = thread::Builder::new()
            .name(thread_name(label))
            .spawn(move || {
                let message = match unit.lock() {
                    Ok(mut guard) => {
                        if let Some(workload) = workload {
                            guard.assign_workload(workload);
                        }
                        guard.run(&worker_token);
                        Ok(RunReport::from_unit(&**guard, worker_token.is_cancelled()))
                    }
                    Err(e) => Err(ExecutionError::LockPoisoned(e.to_string())),
                };
                // The controller may have stopped listening after a timeout.
                let _ = tx.send(message);
            })?;

        debug!("Dispatched {} to worker", label);
        Ok(ExecutionHandle {
            label: label.to_string(),
            rx,
            token,
            thread: Some(thread),
            cancel_grace: self.cancel_grace,
        })
    }
}

/// Controller-side handle on one dispatched unit.
pub struct ExecutionHandle {
    label: String,
    rx: Receiver<WorkerMessage>,
    token: CancelToken,
    thread: Option<JoinHandle<()>>,
    cancel_grace: Duration,
}

impl ExecutionHandle {
    /// Block until the unit returns, or until `timeout` elapses if given.
    pub fn await_outcome(&mut self, timeout: Option<Duration>) -> Outcome {
        let received = match timeout {
            Some(t) => self.rx.recv_timeout(t),
            None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Ok(report)) => {
                self.reap();
                Outcome::Done(report)
            }
            Ok(Err(e)) => {
                self.reap();
                Outcome::Faulted(e)
            }
            Err(RecvTimeoutError::Timeout) => Outcome::TimedOut,
            Err(RecvTimeoutError::Disconnected) => Outcome::Faulted(self.panic_fault()),
        }
    }

    /// Request cancellation and wait up to the grace period for the worker to
    /// stop. Returns `false` when the worker is still running afterwards; it
    /// is then left detached.
    pub fn cancel(&mut self) -> bool {
        self.token.cancel();
        match self.rx.recv_timeout(self.cancel_grace) {
            Ok(_) | Err(RecvTimeoutError::Disconnected) => {
                self.reap();
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    worker = %self.label,
                    grace_ms = self.cancel_grace.as_millis() as u64,
                    "Worker did not honour cancellation"
                );
                false
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    fn reap(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(worker = %self.label, "Worker panicked after reporting");
            }
        }
    }

    fn panic_fault(&mut self) -> ExecutionError {
        match self.thread.take().map(|t| t.join()) {
            Some(Err(payload)) => ExecutionError::WorkerPanicked(panic_message(payload.as_ref())),
            _ => ExecutionError::WorkerPanicked("worker exited without reporting".into()),
        }
    }
}

/// Thread names may not contain NUL.
fn thread_name(label: &str) -> String {
    format!("cpusim-worker-{}", label.replace('\0', ""))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".into()
    }
}
