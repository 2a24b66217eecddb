use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use cpusim_scheduler::MetricsSnapshot;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ReportError;

pub const CSV_HEADER: &str =
    "policy,total_time_ms,avg_waiting_ms,avg_response_ms,context_switches,completed_tasks";

/// Which metric a comparison ranks on. Lower is better for all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    TotalTime,
    AvgWaiting,
    AvgResponse,
    ContextSwitches,
}

impl Criterion {
    fn value(self, m: &MetricsSnapshot) -> i64 {
        match self {
            Criterion::TotalTime => m.total_wall_time,
            Criterion::AvgWaiting => m.avg_waiting_time,
            Criterion::AvgResponse => m.avg_response_time,
            Criterion::ContextSwitches => m.context_switch_count as i64,
        }
    }

    fn unit(self) -> &'static str {
        match self {
            Criterion::ContextSwitches => "",
            _ => " ms",
        }
    }
}

/// Collects named metric snapshots and renders comparison reports.
///
/// Rows keep insertion order; adding a name twice replaces the earlier row.
#[derive(Debug, Clone, Default)]
pub struct MetricsComparator {
    entries: Vec<(String, MetricsSnapshot)>,
}

impl MetricsComparator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, snapshot: MetricsSnapshot) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = snapshot,
            None => self.entries.push((name, snapshot)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, MetricsSnapshot)] {
        &self.entries
    }

    /// Lowest value for `criterion`; the earliest entry wins ties.
    pub fn best_by(&self, criterion: Criterion) -> Option<(&str, i64)> {
        self.entries
            .iter()
            .map(|(name, m)| (name.as_str(), criterion.value(m)))
            .fold(None, |best, (name, v)| match best {
                Some((_, b)) if b <= v => best,
                _ => Some((name, v)),
            })
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::from(CSV_HEADER);
        out.push('\n');
        for (name, m) in &self.entries {
            let _ = writeln!(
                out,
                "{},{},{},{},{},{}",
                name.replace(',', ";"),
                m.total_wall_time,
                m.avg_waiting_time,
                m.avg_response_time,
                m.context_switch_count,
                m.completed_count
            );
        }
        out
    }

    pub fn to_markdown(&self) -> Result<String, ReportError> {
        self.to_markdown_at(Utc::now())
    }

    pub fn to_markdown_at(&self, generated: DateTime<Utc>) -> Result<String, ReportError> {
        let mut out = String::new();
        writeln!(out, "# Scheduler Comparison Report\n")?;
        writeln!(out, "Generated: {}\n", generated.format("%Y-%m-%d %H:%M:%S UTC"))?;

        writeln!(out, "## Results\n")?;
        writeln!(out, "| Policy | Total Time | Avg Waiting | Avg Response | Context Switches | Completed |")?;
        writeln!(out, "|--------|------------|-------------|--------------|------------------|-----------|")?;
        for (name, m) in &self.entries {
            writeln!(
                out,
                "| {} | {} ms | {} ms | {} ms | {} | {} |",
                name,
                m.total_wall_time,
                m.avg_waiting_time,
                m.avg_response_time,
                m.context_switch_count,
                m.completed_count
            )?;
        }

        writeln!(out, "\n## Analysis\n")?;
        for (label, criterion) in [
            ("Best total time", Criterion::TotalTime),
            ("Best waiting time", Criterion::AvgWaiting),
            ("Best response time", Criterion::AvgResponse),
        ] {
            match self.best_by(criterion) {
                Some((name, v)) => writeln!(out, "- **{label}:** {name} ({v}{})", criterion.unit())?,
                None => writeln!(out, "- **{label}:** n/a")?,
            }
        }
        Ok(out)
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        write_file(path, &self.to_csv())?;
        info!("[COMPARATOR] CSV written: {}", path.display());
        Ok(())
    }

    pub fn write_markdown(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        write_file(path, &self.to_markdown()?)?;
        info!("[COMPARATOR] Markdown report written: {}", path.display());
        Ok(())
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}
