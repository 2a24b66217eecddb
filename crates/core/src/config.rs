use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CpuSimError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_opt(key).and_then(|v| v.parse().ok())
}

// ── Simulation config ─────────────────────────────────────────

/// Scheduler simulation settings, typically parsed from `cpusim.toml`.
///
/// Every field has a default so an empty document is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimConfig {
    /// Round-Robin quantum in milliseconds.
    #[serde(default = "default_quantum_ms")]
    pub quantum_ms: u64,
    /// Preemptions a Round-Robin task may suffer before it is abandoned.
    #[serde(default = "default_max_quantums")]
    pub max_quantums: u32,
    /// How long a cancel request waits for the worker to stop.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
    /// Directory that receives monitor samples and comparison reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// File name (inside `output_dir`) for system monitor samples.
    #[serde(default = "default_monitor_file")]
    pub monitor_file: String,
}

fn default_quantum_ms() -> u64 { 100 }
fn default_max_quantums() -> u32 { 10 }
fn default_cancel_grace_ms() -> u64 { 25 }
fn default_output_dir() -> PathBuf { PathBuf::from("results/metrics") }
fn default_monitor_file() -> String { "execution_metrics.csv".into() }

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            quantum_ms: default_quantum_ms(),
            max_quantums: default_max_quantums(),
            cancel_grace_ms: default_cancel_grace_ms(),
            output_dir: default_output_dir(),
            monitor_file: default_monitor_file(),
        }
    }
}

impl SimConfig {
    /// Parse config from a TOML string, then apply env overrides and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, CpuSimError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CpuSimError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults plus env overrides (no file).
    pub fn from_env() -> Result<Self, CpuSimError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `CPUSIM_*` environment variables when present.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("CPUSIM_QUANTUM_MS") {
            self.quantum_ms = v;
        }
        if let Some(v) = env_parse("CPUSIM_MAX_QUANTUMS") {
            self.max_quantums = v;
        }
        if let Some(v) = env_parse("CPUSIM_CANCEL_GRACE_MS") {
            self.cancel_grace_ms = v;
        }
        if let Some(v) = env_opt("CPUSIM_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<(), CpuSimError> {
        if self.quantum_ms == 0 {
            return Err(CpuSimError::InvalidConfig("quantum_ms must be > 0".into()));
        }
        if self.max_quantums == 0 {
            return Err(CpuSimError::InvalidConfig("max_quantums must be > 0".into()));
        }
        if self.monitor_file.trim().is_empty() {
            return Err(CpuSimError::InvalidConfig("monitor_file must not be empty".into()));
        }
        Ok(())
    }

    pub fn quantum(&self) -> Duration {
        Duration::from_millis(self.quantum_ms)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn monitor_path(&self) -> PathBuf {
        self.output_dir.join(&self.monitor_file)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  round-robin: quantum={}ms, max_quantums={}", self.quantum_ms, self.max_quantums);
        tracing::info!("  cancel:      grace={}ms", self.cancel_grace_ms);
        tracing::info!("  output:      dir={}", self.output_dir.display());
    }
}
