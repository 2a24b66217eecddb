use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpusim_core::Workload;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Lifecycle of an executable unit.
///
/// `Ready → Running → {Completed | Failed}`. An attempt that is interrupted
/// leaves the unit in `Running`; the next `run()` starts over from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitState {
    Ready,
    Running,
    Completed,
    Failed,
}

impl UnitState {
    pub fn is_terminal(self) -> bool {
        matches!(self, UnitState::Completed | UnitState::Failed)
    }
}

/// Failures a unit reports through its own state, never by unwinding.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UnitError {
    #[error("workload not assigned before run")]
    WorkloadNotAssigned,
    #[error("unsolvable workload: {0}")]
    Unsolvable(String),
    #[error("attempt interrupted")]
    Interrupted,
    #[error("result discarded, task abandoned")]
    Abandoned,
}

/// Cooperative interruption signal shared between a controller and a worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Interrupted)` once cancellation was requested. Meant for `?` inside
    /// long computations.
    pub fn check(&self) -> Result<(), UnitError> {
        if self.is_cancelled() {
            Err(UnitError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// The capability every workload handler exposes to the scheduler.
pub trait Schedulable: Send {
    /// Identifier used for logging and duration estimation.
    fn name(&self) -> &str;

    /// Hand the unit its own copy of the problem. Must precede [`run`](Self::run).
    fn assign_workload(&mut self, workload: Workload);

    /// Execute synchronously on the calling thread.
    ///
    /// Success moves the unit to `Completed` with elapsed time and result
    /// recorded; any internal failure moves it to `Failed`. Implementations may
    /// poll `cancel` and give up early, discarding all progress.
    fn run(&mut self, cancel: &CancelToken);

    fn state(&self) -> UnitState;

    /// Duration of the last finished attempt.
    fn elapsed(&self) -> Duration;

    fn result(&self) -> Option<&[f64]>;

    /// Drop the result of the last attempt. Called when the scheduler gives up
    /// on the task, so a late finish leaves nothing behind.
    fn discard_result(&mut self);

    /// Why the last attempt did not complete, if it did not.
    fn last_error(&self) -> Option<&UnitError> {
        None
    }
}

/// A unit shared between its task (controller side) and the worker running it.
pub type SharedUnit = Arc<Mutex<Box<dyn Schedulable>>>;

/// Wrap a unit for submission.
pub fn share(unit: impl Schedulable + 'static) -> SharedUnit {
    Arc::new(Mutex::new(Box::new(unit)))
}

/// Bookkeeping shared by unit implementations: workload slot, state,
/// timing and result.
#[derive(Debug)]
pub struct UnitCore {
    workload: Option<Workload>,
    state: UnitState,
    elapsed: Duration,
    result: Option<Vec<f64>>,
    last_error: Option<UnitError>,
}

impl Default for UnitCore {
    fn default() -> Self {
        Self {
            workload: None,
            state: UnitState::Ready,
            elapsed: Duration::ZERO,
            result: None,
            last_error: None,
        }
    }
}

impl UnitCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, workload: Workload) {
        self.workload = Some(workload);
        self.state = UnitState::Ready;
        self.result = None;
        self.last_error = None;
    }

    pub fn workload(&self) -> Option<&Workload> {
        self.workload.as_ref()
    }

    /// Run one attempt of `solve` under the standard unit protocol.
    pub fn execute<F>(&mut self, name: &str, cancel: &CancelToken, solve: F)
    where
        F: FnOnce(&Workload, &CancelToken) -> Result<Vec<f64>, UnitError>,
    {
        let Some(workload) = self.workload.as_ref() else {
            warn!("[{}] run() without an assigned workload", name);
            self.state = UnitState::Failed;
            self.last_error = Some(UnitError::WorkloadNotAssigned);
            return;
        };

        info!("[{}] Solving {}", name, workload.label);
        self.state = UnitState::Running;
        self.result = None;
        self.last_error = None;

        let start = Instant::now();
        let outcome = solve(workload, cancel);
        let elapsed = start.elapsed();

        match outcome {
            Ok(solution) => {
                self.elapsed = elapsed;
                self.result = Some(solution);
                self.state = UnitState::Completed;
                info!("[{}] Completed in {} ms", name, elapsed.as_millis());
            }
            Err(UnitError::Interrupted) => {
                debug!("[{}] Attempt interrupted after {} ms, progress discarded", name, elapsed.as_millis());
                self.last_error = Some(UnitError::Interrupted);
            }
            Err(e) => {
                self.elapsed = elapsed;
                self.state = UnitState::Failed;
                warn!("[{}] Failed: {}", name, e);
                self.last_error = Some(e);
            }
        }
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn result(&self) -> Option<&[f64]> {
        self.result.as_deref()
    }

    pub fn last_error(&self) -> Option<&UnitError> {
        self.last_error.as_ref()
    }

    /// A completed attempt becomes `Failed`; anything else is left as is.
    pub fn discard_result(&mut self) {
        if self.result.take().is_some() || self.state == UnitState::Completed {
            self.state = UnitState::Failed;
            self.last_error = Some(UnitError::Abandoned);
        }
    }
}
