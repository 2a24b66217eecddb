use std::collections::VecDeque;
use std::sync::Arc;

use cpusim_core::Workload;
use tracing::info;

use super::{DispatchEntry, Policy, PolicyCore, PolicyKind};
use crate::estimator::Estimator;
use crate::executor::Executor;
use crate::metrics::MetricsSnapshot;
use crate::task::{Task, TaskId, TaskRecord};
use crate::unit::SharedUnit;

/// First-Come First-Served: strict FIFO, each task runs to its end.
pub struct FcfsPolicy {
    name: String,
    queue: VecDeque<Task>,
    core: PolicyCore,
}

impl FcfsPolicy {
    pub fn new(estimator: Arc<dyn Estimator>, executor: Executor) -> Self {
        Self {
            name: "FCFS (First-Come First-Served)".into(),
            queue: VecDeque::new(),
            core: PolicyCore::new(estimator, executor),
        }
    }
}

impl Policy for FcfsPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Fcfs
    }

    fn enqueue(&mut self, unit: SharedUnit, workload: Workload) -> TaskId {
        let task = self.core.admit(unit, workload);
        let id = task.id();
        self.queue.push_back(task);
        id
    }

    fn run(&mut self) -> MetricsSnapshot {
        info!(policy = %self.name, tasks = self.queue.len(), "Starting run");
        let mut acc = self.core.begin_run();

        while let Some(mut task) = self.queue.pop_front() {
            info!(task = %task, "Dispatching");
            self.core.run_to_completion(&mut task, &mut acc);
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
