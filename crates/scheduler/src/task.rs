use chrono::{DateTime, Utc};
use cpusim_core::Workload;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::unit::SharedUnit;

pub type TaskId = Uuid;

/// The single terminal accounting every task receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskOutcome {
    /// Unit reported `Completed`.
    Completed,
    /// Unit reported `Failed` (unassigned or unsolvable workload).
    Failed,
    /// The execution layer could not run the unit (spawn error, panic, poisoned lock).
    Faulted,
    /// Round-Robin gave up after the retry ceiling.
    Abandoned,
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutcome::Completed => write!(f, "completed"),
            TaskOutcome::Failed => write!(f, "failed"),
            TaskOutcome::Faulted => write!(f, "faulted"),
            TaskOutcome::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// A queued unit of scheduling work: an executable unit, its workload and
/// lifecycle timestamps.
pub struct Task {
    id: TaskId,
    sequence: u64,
    unit: SharedUnit,
    unit_name: String,
    workload: Workload,
    arrival: DateTime<Utc>,
    start: Option<DateTime<Utc>>,
    finish: Option<DateTime<Utc>>,
    estimated_ms: u64,
    quantums_used: u32,
    attempts: u32,
    outcome: Option<TaskOutcome>,
}

impl Task {
    /// Create a task arriving now. `sequence` is the admission number within
    /// its policy.
    pub fn new(
        sequence: u64,
        unit: SharedUnit,
        unit_name: impl Into<String>,
        workload: Workload,
        estimated_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            unit,
            unit_name: unit_name.into(),
            workload,
            arrival: Utc::now(),
            start: None,
            finish: None,
            estimated_ms,
            quantums_used: 0,
            attempts: 0,
            outcome: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn unit(&self) -> &SharedUnit {
        &self.unit
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    pub fn workload(&self) -> &Workload {
        &self.workload
    }

    pub fn arrival(&self) -> DateTime<Utc> {
        self.arrival
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn finish(&self) -> Option<DateTime<Utc>> {
        self.finish
    }

    pub fn estimated_ms(&self) -> u64 {
        self.estimated_ms
    }

    pub fn quantums_used(&self) -> u32 {
        self.quantums_used
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.outcome
    }

    pub fn has_started(&self) -> bool {
        self.start.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Record a dispatch at `at`. Returns `true` for the first dispatch, which
    /// is the only one that sets the start time.
    pub fn mark_dispatched(&mut self, at: DateTime<Utc>) -> bool {
        self.attempts += 1;
        if self.start.is_some() {
            return false;
        }
        self.start = Some(at.max(self.arrival));
        true
    }

    /// Count one Round-Robin preemption.
    pub fn mark_preempted(&mut self) -> u32 {
        self.quantums_used += 1;
        self.quantums_used
    }

    /// Apply the terminal accounting. Returns `false` (and changes nothing) if
    /// the task already had one.
    pub fn mark_finished(&mut self, outcome: TaskOutcome, at: DateTime<Utc>) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        let start = *self.start.get_or_insert(self.arrival);
        self.finish = Some(at.max(start));
        self.outcome = Some(outcome);
        true
    }

    /// `start − arrival` in ms, once started.
    pub fn waiting_ms(&self) -> Option<i64> {
        self.start
            .map(|s| s.signed_duration_since(self.arrival).num_milliseconds())
    }

    /// `finish − arrival` in ms, once finished.
    pub fn response_ms(&self) -> Option<i64> {
        self.finish
            .map(|f| f.signed_duration_since(self.arrival).num_milliseconds())
    }

    pub fn record(&self) -> TaskRecord {
        TaskRecord {
            id: self.id,
            sequence: self.sequence,
            unit: self.unit_name.clone(),
            workload: self.workload.label.clone(),
            size: self.workload.size(),
            estimated_ms: self.estimated_ms,
            outcome: self.outcome,
            waiting_ms: self.waiting_ms().unwrap_or(0),
            response_ms: self.response_ms().unwrap_or(0),
            attempts: self.attempts,
            quantums_used: self.quantums_used,
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} - {}]", self.unit_name, self.workload.label)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("sequence", &self.sequence)
            .field("unit", &self.unit_name)
            .field("workload", &self.workload.label)
            .field("estimated_ms", &self.estimated_ms)
            .field("quantums_used", &self.quantums_used)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// Per-task line of a policy run's detailed log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub sequence: u64,
    pub unit: String,
    pub workload: String,
    pub size: usize,
    pub estimated_ms: u64,
    pub outcome: Option<TaskOutcome>,
    pub waiting_ms: i64,
    pub response_ms: i64,
    pub attempts: u32,
    pub quantums_used: u32,
}
