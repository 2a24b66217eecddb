use std::collections::VecDeque;
use std::sync::{Arc, TryLockError};
use std::time::Duration;

use cpusim_core::Workload;
use tracing::{debug, info, warn};

use super::{outcome_of, DispatchEntry, Policy, PolicyCore, PolicyKind};
use crate::estimator::Estimator;
use crate::executor::{Executor, Outcome};
use crate::metrics::{MetricsAccumulator, MetricsSnapshot};
use crate::task::{Task, TaskId, TaskOutcome, TaskRecord};
use crate::unit::SharedUnit;

/// Round-Robin with a fixed quantum.
///
/// A dispatch that outlives the quantum is cancelled and the task goes back
/// to the tail of the queue, restarting from scratch next time. After
/// `max_quantums` preemptions the next one abandons the task.
pub struct RoundRobinPolicy {
    name: String,
    quantum: Duration,
    max_quantums: u32,
    queue: VecDeque<Task>,
    core: PolicyCore,
}

impl RoundRobinPolicy {
    pub fn new(
        quantum: Duration,
        max_quantums: u32,
        estimator: Arc<dyn Estimator>,
        executor: Executor,
    ) -> Self {
        Self {
            name: format!("Round Robin (quantum={}ms)", quantum.as_millis()),
            quantum,
            max_quantums,
            queue: VecDeque::new(),
            core: PolicyCore::new(estimator, executor),
        }
    }

    pub fn quantum(&self) -> Duration {
        self.quantum
    }

    pub fn max_quantums(&self) -> u32 {
        self.max_quantums
    }

    /// Handle a quantum expiry. Returns the task when it should be requeued.
    ///
    /// An abandoned task keeps no result, even when its unit finished inside
    /// the cancel grace. A worker that is still running past the grace holds
    /// the unit lock and cannot be cleared here.
    fn preempt(&mut self, mut task: Task, honoured: bool, acc: &mut MetricsAccumulator) -> Option<Task> {
        let used = task.mark_preempted();
        if honoured {
            debug!(task = %task, quantums_used = used, "Quantum expired, worker stopped");
        } else {
            warn!(
                task = %task,
                quantums_used = used,
                "Quantum expired, worker did not stop within the grace period"
            );
        }

        if used > self.max_quantums {
            match task.unit().try_lock() {
                Ok(mut guard) => guard.discard_result(),
                Err(TryLockError::Poisoned(p)) => p.into_inner().discard_result(),
                Err(TryLockError::WouldBlock) => {
                    debug!(task = %task, "Worker still holds the unit, result not discarded");
                }
            }
            self.core.finish(&mut task, TaskOutcome::Abandoned, None, acc);
            None
        } else {
            Some(task)
        }
    }
}

impl Policy for RoundRobinPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::RoundRobin
    }

    fn enqueue(&mut self, unit: SharedUnit, workload: Workload) -> TaskId {
        let task = self.core.admit(unit, workload);
        let id = task.id();
        self.queue.push_back(task);
        id
    }

    fn run(&mut self) -> MetricsSnapshot {
        info!(
            policy = %self.name,
            tasks = self.queue.len(),
            quantum_ms = self.quantum.as_millis() as u64,
            "Starting run"
        );
        let mut acc = self.core.begin_run();

        while let Some(mut task) = self.queue.pop_front() {
            let (first, submitted) = self.core.dispatch(&mut task);
            if first {
                info!(task = %task, "Dispatching");
            } else {
                acc.record_context_switch();
                debug!(task = %task, attempt = task.attempts(), "Context switch, resuming from scratch");
            }

            let mut handle = match submitted {
                Ok(handle) => handle,
                Err(e) => {
                    self.core.finish(&mut task, TaskOutcome::Faulted, Some(&e.to_string()), &mut acc);
                    continue;
                }
            };

            match handle.await_outcome(Some(self.quantum)) {
                Outcome::Done(report) => {
                    let outcome = outcome_of(&report);
                    self.core.finish(&mut task, outcome, report.error.as_deref(), &mut acc);
                }
                Outcome::Faulted(e) => {
                    self.core.finish(&mut task, TaskOutcome::Faulted, Some(&e.to_string()), &mut acc);
                }
                Outcome::TimedOut => {
                    let honoured = handle.cancel();
                    if let Some(task) = self.preempt(task, honoured, &mut acc) {
                        self.queue.push_back(task);
                    }
                }
            }
        }

        self.core.end_run(&self.name, acc)
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics()
    }

    fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.core.reset();
    }

    fn dispatch_log(&self) -> &[DispatchEntry] {
        self.core.dispatch_log()
    }

    fn records(&self) -> &[TaskRecord] {
        self.core.records()
    }
}
