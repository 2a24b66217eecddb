use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use cpusim_core::SimConfig;

/// CPU scheduling simulator.
///
/// Runs linear-system solvers for mesh circuits under FCFS, Round-Robin and
/// SJF and compares the resulting metrics.
#[derive(Parser, Debug)]
#[command(name = "cpusim", about = "CPU scheduling simulator over linear-system solvers")]
pub struct CliArgs {
    /// Which demo to run
    #[arg(value_enum, default_value_t = Scenario::All)]
    pub scenario: Scenario,

    /// Path to a TOML config file (defaults plus CPUSIM_* env vars when unset)
    #[arg(long, env = "CPUSIM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Round-Robin quantum override in milliseconds
    #[arg(long)]
    pub quantum_ms: Option<u64>,

    /// Directory for monitor samples and comparison reports
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Print the scenario results as JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Each solver once on the simple circuit, no scheduler
    Basic,
    /// Three solvers on the 3-mesh circuit under every policy
    Simple,
    /// Three solvers on the 6-mesh circuit under every policy
    Medium,
    /// Three solvers on the 9-mesh circuit under every policy
    Complex,
    /// Mixed circuit sizes under FCFS and SJF
    Mix,
    /// Simple and mix with system sampling and written reports
    All,
}

impl CliArgs {
    /// Load the config file (or env-only defaults) and apply flag overrides.
    pub fn resolve_config(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::from_file(path)
                .with_context(|| format!("failed to read config {}", path.display()))?,
            None => SimConfig::from_env()?,
        };
        if let Some(q) = self.quantum_ms {
            config.quantum_ms = q;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}
