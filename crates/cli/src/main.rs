mod cli;
mod scenarios;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use crate::cli::CliArgs;
use crate::scenarios::{monitor_for, ScenarioRunner};

fn main() -> Result<()> {
    cpusim_core::load_dotenv();

    // Logs go to stderr so `--json` output stays clean on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let config = args.resolve_config().context("failed to load configuration")?;
    config.log_summary();

    info!(scenario = ?args.scenario, "Starting cpusim");
    let monitor = monitor_for(args.scenario, &config);
    let report = ScenarioRunner::new(&config, monitor).run(args.scenario)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print();
    }
    Ok(())
}
