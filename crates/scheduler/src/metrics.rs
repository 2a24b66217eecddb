use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::Task;

/// Aggregate counters and timings for one policy run. All times in ms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_wall_time: i64,
    pub avg_waiting_time: i64,
    pub avg_response_time: i64,
    pub completed_count: u64,
    pub context_switch_count: u64,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Metrics:")?;
        writeln!(f, "  - Total Time: {} ms", self.total_wall_time)?;
        writeln!(f, "  - Avg Waiting Time: {} ms", self.avg_waiting_time)?;
        writeln!(f, "  - Avg Response Time: {} ms", self.avg_response_time)?;
        writeln!(f, "  - Completed Tasks: {}", self.completed_count)?;
        write!(f, "  - Context Switches: {}", self.context_switch_count)
    }
}

/// Running sums a policy folds terminal tasks into while its queue drains.
#[derive(Debug, Clone)]
pub struct MetricsAccumulator {
    started_at: DateTime<Utc>,
    sum_waiting: i64,
    sum_response: i64,
    completed: u64,
    context_switches: u64,
}

impl MetricsAccumulator {
    /// Start measuring wall time now.
    pub fn start() -> Self {
        Self::started_at(Utc::now())
    }

    pub fn started_at(at: DateTime<Utc>) -> Self {
        Self {
            started_at: at,
            sum_waiting: 0,
            sum_response: 0,
            completed: 0,
            context_switches: 0,
        }
    }

    /// Fold a task that reached its terminal accounting.
    pub fn record_terminal(&mut self, task: &Task) {
        self.record_timings(task.waiting_ms().unwrap_or(0), task.response_ms().unwrap_or(0));
    }

    pub fn record_timings(&mut self, waiting_ms: i64, response_ms: i64) {
        self.sum_waiting += waiting_ms;
        self.sum_response += response_ms;
        self.completed += 1;
    }

    pub fn record_context_switch(&mut self) {
        self.context_switches += 1;
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn finalize(self) -> MetricsSnapshot {
        self.finalize_at(Utc::now())
    }

    /// Averages use integer division truncating toward zero; both stay 0
    /// when nothing completed.
    pub fn finalize_at(self, at: DateTime<Utc>) -> MetricsSnapshot {
        let total_wall_time = at.signed_duration_since(self.started_at).num_milliseconds().max(0);
        let (avg_waiting_time, avg_response_time) = if self.completed > 0 {
            let n = self.completed as i64;
            (self.sum_waiting / n, self.sum_response / n)
        } else {
            (0, 0)
        };

        MetricsSnapshot {
            total_wall_time,
            avg_waiting_time,
            avg_response_time,
            completed_count: self.completed,
            context_switch_count: self.context_switches,
        }
    }
}
