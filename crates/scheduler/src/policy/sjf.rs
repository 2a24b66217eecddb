use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use cpusim_core::Workload;
use tracing::{debug, info};

use super::{DispatchEntry, Policy, PolicyCore, PolicyKind};
use crate::estimator::Estimator;
use crate::executor::Executor;
use crate::metrics::MetricsSnapshot;
use crate::task::{Task, TaskId, TaskOutcome, TaskRecord};
use crate::unit::SharedUnit;

/// Heap entry ordered by `(estimated_ms, sequence)`.
struct Queued(Task);

impl Queued {
    fn key(&self) -> (u64, u64) {
        (self.0.estimated_ms(), self.0.sequence())
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Shortest Job First, non-preemptive.
///
/// The queue is a min-heap on the estimated duration; equal estimates run in
/// admission order. Completed tasks feed an `|actual - estimated|` diagnostic.
pub struct SjfPolicy {
    name: String,
    queue: BinaryHeap<Reverse<Queued>>,
    estimation_error_ms: u64,
    estimated_completions: u64,
    core: PolicyCore,
}

impl SjfPolicy {
    pub fn new(estimator: Arc<dyn Estimator>, executor: Executor) -> Self {
        Self {
            name: "SJF (Shortest Job First)".into(),
            queue: BinaryHeap::new(),
            estimation_error_ms: 0,
            estimated_completions: 0,
            core: PolicyCore::new(estimator, executor),
        }
    }

    /// Pending tasks in the order they will be dispatched.
    pub fn planned_order(&self) -> Vec<TaskRecord> {
        let mut pending: Vec<&Queued> = self.queue.iter().map(|Reverse(q)| q).collect();
        pending.sort();
        pending.into_iter().map(|q| q.0.record()).collect()
    }

    /// Sum of `|actual - estimated|` over the completed tasks of the last run.
    pub fn estimation_error_total(&self) -> u64 {
        self.estimation_error_ms
    }

    pub fn mean_estimation_error(&self) -> Option<f64> {
        (self.estimated_completions > 0)
            .then(|| self.estimation_error_ms as f64 / self.estimated_completions as f64)
    }
}

impl Policy for SjfPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Sjf
    }

    fn enqueue(&mut self, unit: SharedUnit, workload: Workload) -> TaskId {
        let task = self.core.admit(unit, workload);
        let id = task.id();
        self.queue.push(Reverse(Queued(task)));
        id
    }

    fn run(&mut self) -> MetricsSnapshot {
        info!(policy = %self.name, tasks = self.queue.len(), "Starting run");
        for (position, planned) in self.planned_order().iter().enumerate() {
            debug!(
                position = position + 1,
                unit = %planned.unit,
                workload = %planned.workload,
                estimated_ms = planned.estimated_ms,
                "Planned"
            );
        }

        let mut acc = self.core.begin_run();
        self.estimation_error_ms = 0;
        self.estimated_completions = 0;

        while let Some(Reverse(Queued(mut task))) = self.queue.pop() {
            info!(task = %task, estimated_ms = task.estimated_ms(), "Dispatching");
            let (outcome, report) = self.core.run_to_completion(&mut task, &mut acc);

            if let (TaskOutcome::Completed, Some(report)) = (outcome, report) {
                let actual = report.elapsed.as_millis() as u64;
                let error = actual.abs_diff(task.estimated_ms());
                self.estimation_error_ms += error;
                self.estimated_completions += 1;
                debug!(task = %task, actual_ms = actual, estimated_ms = task.estimated_ms(), error_ms = error, "Estimate checked");
            }
        }

        if let Some(mean) = self.mean_estimation_error() {
            info!(
                total_error_ms = self.estimation_error_ms,
                mean_error_ms = mean,
                "Estimation error"
            );
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
        self.estimation_error_ms = 0;
        self.estimated_completions = 0;
        self.core.reset();
    }

    fn dispatch_log(&self) -> &[DispatchEntry] {
        self.core.dispatch_log()
    }

    fn records(&self) -> &[TaskRecord] {
        self.core.records()
    }
}
