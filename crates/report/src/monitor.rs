//! System sampling around scheduler runs.
//!
//! Load, memory and thread counts come from `/proc` on Linux. Elsewhere the
//! readings are zero and only the labels and timestamps are meaningful.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::ReportError;

pub const CSV_HEADER: &str = "timestamp_ms,label,cpu_load,mem_used_mb,mem_total_mb,threads";

/// A sampling sink with an explicit lifecycle: `open`, any number of
/// `sample`s, then `close`.
pub trait SystemMonitor {
    fn open(&mut self) -> Result<(), ReportError>;

    fn sample(&mut self, label: &str) -> Result<Sample, ReportError>;

    fn close(&mut self) -> Result<(), ReportError>;
}

/// One reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    /// Milliseconds since the monitor was opened.
    pub timestamp_ms: u64,
    pub label: String,
    /// 1-minute load average.
    pub cpu_load: f64,
    /// Resident memory of this process.
    pub mem_used_mb: u64,
    pub mem_total_mb: u64,
    pub threads: u64,
}

impl Sample {
    fn capture(label: &str, since: Instant) -> Self {
        Self {
            timestamp_ms: since.elapsed().as_millis() as u64,
            label: label.to_string(),
            cpu_load: procfs::load_average().unwrap_or(0.0),
            mem_used_mb: procfs::status_kb("VmRSS:").map_or(0, |kb| kb / 1024),
            mem_total_mb: procfs::meminfo_kb("MemTotal:").map_or(0, |kb| kb / 1024),
            threads: procfs::status_kb("Threads:").unwrap_or(0),
        }
    }

    fn csv_line(&self) -> String {
        format!(
            "{},{},{:.2},{},{},{}",
            self.timestamp_ms,
            self.label.replace(',', ";"),
            self.cpu_load,
            self.mem_used_mb,
            self.mem_total_mb,
            self.threads
        )
    }
}

/// Appends samples to a CSV file. The header is written when the file is new
/// or empty.
pub struct CsvMonitor {
    path: PathBuf,
    opened_at: Instant,
    writer: Option<BufWriter<File>>,
}

impl CsvMonitor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            opened_at: Instant::now(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

impl SystemMonitor for CsvMonitor {
    fn open(&mut self) -> Result<(), ReportError> {
        if self.writer.is_some() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let is_empty = file.metadata()?.len() == 0;

        let mut writer = BufWriter::new(file);
        if is_empty {
            writeln!(writer, "{CSV_HEADER}")?;
            writer.flush()?;
        }
        self.opened_at = Instant::now();
        self.writer = Some(writer);
        debug!(path = %self.path.display(), "Monitor opened");
        Ok(())
    }

    fn sample(&mut self, label: &str) -> Result<Sample, ReportError> {
        let writer = self.writer.as_mut().ok_or(ReportError::NotOpen)?;
        let sample = Sample::capture(label, self.opened_at);
        writeln!(writer, "{}", sample.csv_line())?;
        writer.flush()?;

        info!(
            "[MONITOR] {} - CPU: {:.2} | RAM: {}/{} MB | Threads: {}",
            sample.label, sample.cpu_load, sample.mem_used_mb, sample.mem_total_mb, sample.threads
        );
        Ok(sample)
    }

    fn close(&mut self) -> Result<(), ReportError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!(path = %self.path.display(), "Monitor closed");
        }
        Ok(())
    }
}

impl Drop for CsvMonitor {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Discards everything. For runs that are not being observed.
#[derive(Debug, Default)]
pub struct NullMonitor {
    opened_at: Option<Instant>,
}

impl SystemMonitor for NullMonitor {
    fn open(&mut self) -> Result<(), ReportError> {
        self.opened_at.get_or_insert_with(Instant::now);
        Ok(())
    }

    fn sample(&mut self, label: &str) -> Result<Sample, ReportError> {
        let since = self.opened_at.ok_or(ReportError::NotOpen)?;
        Ok(Sample::capture(label, since))
    }

    fn close(&mut self) -> Result<(), ReportError> {
        self.opened_at = None;
        Ok(())
    }
}

/// Host description printed at startup.
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub os: &'static str,
    pub arch: &'static str,
    pub processors: usize,
    pub version: &'static str,
}

pub fn system_info() -> SystemInfo {
    SystemInfo {
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        processors: std::thread::available_parallelism().map_or(1, |n| n.get()),
        version: env!("CARGO_PKG_VERSION"),
    }
}

impl fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== SYSTEM INFO ===")?;
        writeln!(f, "OS: {}", self.os)?;
        writeln!(f, "Architecture: {}", self.arch)?;
        writeln!(f, "Processors: {}", self.processors)?;
        write!(f, "cpusim: {}", self.version)
    }
}

mod procfs {
    use std::fs;

    pub fn load_average() -> Option<f64> {
        fs::read_to_string("/proc/loadavg")
            .ok()?
            .split_whitespace()
            .next()?
            .parse()
            .ok()
    }

    /// Numeric value of a `Key:   1234 kB` line in `/proc/self/status`.
    pub fn status_kb(key: &str) -> Option<u64> {
        field(&fs::read_to_string("/proc/self/status").ok()?, key)
    }

    pub fn meminfo_kb(key: &str) -> Option<u64> {
        field(&fs::read_to_string("/proc/meminfo").ok()?, key)
    }

    pub(super) fn field(text: &str, key: &str) -> Option<u64> {
        text.lines()
            .find_map(|line| line.strip_prefix(key))?
            .split_whitespace()
            .next()?
            .parse()
            .ok()
    }
}
