//! Scheduling policies.
//!
//! Every policy owns a queue of [`Task`]s and drains it on [`Policy::run`],
//! dispatching one unit at a time through the [`Executor`]. The shared
//! bookkeeping (admission, dispatch log, terminal accounting) lives in
//! [`PolicyCore`]; the policies only decide order and preemption.
//!
//! Split into focused submodules:
//! - `fcfs`: strict FIFO, non-preemptive
//! - `round_robin`: fixed quantum with active cancellation and a retry ceiling
//! - `sjf`: min-heap on estimated duration, stable on admission order

mod fcfs;
mod round_robin;
mod sjf;
#[cfg(test)]
mod tests;

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError};

use chrono::Utc;
use cpusim_core::{CpuSimError, SimConfig, Workload};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::estimator::Estimator;
use crate::executor::{ExecutionError, ExecutionHandle, Executor, Outcome, RunReport};
use crate::metrics::{MetricsAccumulator, MetricsSnapshot};
use crate::task::{Task, TaskId, TaskOutcome, TaskRecord};
use crate::unit::{SharedUnit, UnitState};

pub use fcfs::FcfsPolicy;
pub use round_robin::RoundRobinPolicy;
pub use sjf::SjfPolicy;

/// A scheduling discipline over a private task queue.
pub trait Policy: Send {
    /// Human-readable name, e.g. `Round Robin (quantum=100ms)`.
    fn name(&self) -> &str;

    fn kind(&self) -> PolicyKind;

    /// Admit a task. The unit receives its own copy of `workload`; admission
    /// never fails.
    fn enqueue(&mut self, unit: SharedUnit, workload: Workload) -> TaskId;

    /// Drain the queue and return the metrics of this run.
    fn run(&mut self) -> MetricsSnapshot;

    /// Metrics of the last run (zeroed before the first one).
    fn metrics(&self) -> MetricsSnapshot;

    fn has_pending(&self) -> bool;

    /// Drop all pending tasks and reset metrics and logs.
    fn clear(&mut self);

    /// Every dispatch of the last run, in order.
    fn dispatch_log(&self) -> &[DispatchEntry];

    /// Terminal accounting of every task of the last run, in finishing order.
    fn records(&self) -> &[TaskRecord];
}

/// The closed set of policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Fcfs,
    RoundRobin,
    Sjf,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 3] = [PolicyKind::Fcfs, PolicyKind::RoundRobin, PolicyKind::Sjf];
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::Fcfs => write!(f, "FCFS"),
            PolicyKind::RoundRobin => write!(f, "RR"),
            PolicyKind::Sjf => write!(f, "SJF"),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = CpuSimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fcfs" => Ok(PolicyKind::Fcfs),
            "rr" | "round-robin" | "round_robin" => Ok(PolicyKind::RoundRobin),
            "sjf" => Ok(PolicyKind::Sjf),
            other => Err(CpuSimError::InvalidConfig(format!("unknown policy: {other}"))),
        }
    }
}

/// Build a policy of `kind` from the simulation config.
pub fn build_policy(
    kind: PolicyKind,
    config: &SimConfig,
    estimator: Arc<dyn Estimator>,
) -> Box<dyn Policy> {
    let executor = Executor::new(config.cancel_grace());
    match kind {
        PolicyKind::Fcfs => Box::new(FcfsPolicy::new(estimator, executor)),
        PolicyKind::RoundRobin => Box::new(RoundRobinPolicy::new(
            config.quantum(),
            config.max_quantums,
            estimator,
            executor,
        )),
        PolicyKind::Sjf => Box::new(SjfPolicy::new(estimator, executor)),
    }
}

/// One dispatch of a task to the execution layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchEntry {
    pub sequence: u64,
    pub task_id: TaskId,
    pub unit: String,
    pub workload: String,
    /// 1 for the first dispatch of the task.
    pub attempt: u32,
}

/// State shared by all policies.
pub(crate) struct PolicyCore {
    estimator: Arc<dyn Estimator>,
    executor: Executor,
    next_sequence: u64,
    metrics: MetricsSnapshot,
    records: Vec<TaskRecord>,
    dispatch_log: Vec<DispatchEntry>,
}

impl PolicyCore {
    pub(crate) fn new(estimator: Arc<dyn Estimator>, executor: Executor) -> Self {
        Self {
            estimator,
            executor,
            next_sequence: 0,
            metrics: MetricsSnapshot::default(),
            records: Vec::new(),
            dispatch_log: Vec::new(),
        }
    }

    /// Build the task, estimating its duration from the unit's identifier and
    /// the workload size. The task keeps its own copy of the workload; the
    /// unit only receives it when the task is dispatched, so one unit may
    /// back several tasks.
    pub(crate) fn admit(&mut self, unit: SharedUnit, workload: Workload) -> Task {
        // A unit whose previous worker panicked is still admitted; the
        // execution layer reports the poisoned lock at dispatch.
        let unit_name = unit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .name()
            .to_string();
        let estimated_ms = self.estimator.estimate(&unit_name, workload.size());
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let task = Task::new(sequence, unit, unit_name, workload, estimated_ms);
        info!(task = %task, estimated_ms, sequence, "Task enqueued");
        task
    }

    /// Start a new run: logs of the previous run are dropped.
    pub(crate) fn begin_run(&mut self) -> MetricsAccumulator {
        self.records.clear();
        self.dispatch_log.clear();
        MetricsAccumulator::start()
    }

    /// Record a dispatch and hand the unit to a fresh worker. Returns whether
    /// this was the task's first dispatch along with the handle.
    pub(crate) fn dispatch(
        &mut self,
        task: &mut Task,
    ) -> (bool, Result<ExecutionHandle, ExecutionError>) {
        let first = task.mark_dispatched(Utc::now());
        self.dispatch_log.push(DispatchEntry {
            sequence: task.sequence(),
            task_id: task.id(),
            unit: task.unit_name().to_string(),
            workload: task.workload().label.clone(),
            attempt: task.attempts(),
        });
        let label = format!("{}-{}", task.unit_name(), task.sequence());
        let submitted = self
            .executor
            .submit_with(&label, Arc::clone(task.unit()), task.workload().clone());
        (first, submitted)
    }

    /// Dispatch and wait without bound. Used by the non-preemptive policies.
    pub(crate) fn run_to_completion(
        &mut self,
        task: &mut Task,
        acc: &mut MetricsAccumulator,
    ) -> (TaskOutcome, Option<RunReport>) {
        let (_, submitted) = self.dispatch(task);
        let mut handle = match submitted {
            Ok(handle) => handle,
            Err(e) => {
                self.finish(task, TaskOutcome::Faulted, Some(&e.to_string()), acc);
                return (TaskOutcome::Faulted, None);
            }
        };

        match handle.await_outcome(None) {
            Outcome::Done(report) => {
                let outcome = outcome_of(&report);
                self.finish(task, outcome, report.error.as_deref(), acc);
                (outcome, Some(report))
            }
            Outcome::Faulted(e) => {
                self.finish(task, TaskOutcome::Faulted, Some(&e.to_string()), acc);
                (TaskOutcome::Faulted, None)
            }
            Outcome::TimedOut => {
                // recv() without a timeout only ever yields a message or a disconnect.
                self.finish(task, TaskOutcome::Faulted, Some("unbounded wait timed out"), acc);
                (TaskOutcome::Faulted, None)
            }
        }
    }

    /// Apply the task's terminal accounting and fold it into the run.
    pub(crate) fn finish(
        &mut self,
        task: &mut Task,
        outcome: TaskOutcome,
        detail: Option<&str>,
        acc: &mut MetricsAccumulator,
    ) {
        if !task.mark_finished(outcome, Utc::now()) {
            return;
        }
        acc.record_terminal(task);
        self.records.push(task.record());

        let waiting_ms = task.waiting_ms().unwrap_or(0);
        let response_ms = task.response_ms().unwrap_or(0);
        match outcome {
            TaskOutcome::Completed => {
                info!(task = %task, waiting_ms, response_ms, "Task completed");
            }
            TaskOutcome::Failed => {
                warn!(task = %task, error = detail.unwrap_or("unknown"), "Task failed");
            }
            TaskOutcome::Faulted => {
                error!(task = %task, error = detail.unwrap_or("unknown"), "Task faulted in execution layer");
            }
            TaskOutcome::Abandoned => {
                warn!(
                    task = %task,
                    quantums_used = task.quantums_used(),
                    "Task abandoned after retry ceiling, no result"
                );
            }
        }
    }

    /// Freeze the run's metrics.
    pub(crate) fn end_run(&mut self, policy: &str, acc: MetricsAccumulator) -> MetricsSnapshot {
        let snapshot = acc.finalize();
        info!(
            policy,
            total_ms = snapshot.total_wall_time,
            completed = snapshot.completed_count,
            context_switches = snapshot.context_switch_count,
            "Run finished"
        );
        self.metrics = snapshot;
        snapshot
    }

    pub(crate) fn reset(&mut self) {
        self.next_sequence = 0;
        self.metrics = MetricsSnapshot::default();
        self.records.clear();
        self.dispatch_log.clear();
    }

    pub(crate) fn metrics(&self) -> MetricsSnapshot {
        self.metrics
    }

    pub(crate) fn records(&self) -> &[TaskRecord] {
        &self.records
    }

    pub(crate) fn dispatch_log(&self) -> &[DispatchEntry] {
        &self.dispatch_log
    }
}

/// A unit that returned without completing is counted as failed.
fn outcome_of(report: &RunReport) -> TaskOutcome {
    match report.state {
        UnitState::Completed => TaskOutcome::Completed,
        _ => TaskOutcome::Failed,
    }
}
