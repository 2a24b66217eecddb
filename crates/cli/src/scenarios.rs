use std::sync::Arc;

use anyhow::{Context, Result};
use cpusim_core::{SimConfig, Workload};
use cpusim_report::{system_info, CsvMonitor, Criterion, MetricsComparator, NullMonitor, SystemMonitor};
use cpusim_scheduler::{
    build_policy, ComplexityEstimator, Estimator, Executor, MetricsSnapshot, Outcome, PolicyKind,
    TaskRecord, UnitState,
};
use cpusim_solvers::{circuits, SolverKind};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::Scenario;

/// Solver order used whenever all three run on the same circuit.
const SAME_CIRCUIT_ORDER: [SolverKind; 3] = [SolverKind::GaussJordan, SolverKind::Cramer, SolverKind::Lu];

/// Everything a scenario produced.
#[derive(Debug, Default, Serialize)]
pub struct ScenarioReport {
    pub solver_runs: Vec<SolverRun>,
    pub groups: Vec<PolicyGroup>,
    pub reports_written: Vec<String>,
}

/// A solver run outside any scheduler.
#[derive(Debug, Serialize)]
pub struct SolverRun {
    pub solver: SolverKind,
    pub state: Option<UnitState>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

/// Runs of several policies over the same task set.
#[derive(Debug, Serialize)]
pub struct PolicyGroup {
    pub title: String,
    pub runs: Vec<PolicyRun>,
}

#[derive(Debug, Serialize)]
pub struct PolicyRun {
    pub kind: PolicyKind,
    pub policy: String,
    pub metrics: MetricsSnapshot,
    pub tasks: Vec<TaskRecord>,
}

pub struct ScenarioRunner<'a> {
    config: &'a SimConfig,
    estimator: Arc<dyn Estimator>,
    monitor: Box<dyn SystemMonitor>,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(config: &'a SimConfig, monitor: Box<dyn SystemMonitor>) -> Self {
        Self {
            config,
            estimator: Arc::new(ComplexityEstimator),
            monitor,
        }
    }

    /// Run `scenario` and collect its results.
    pub fn run(&mut self, scenario: Scenario) -> Result<ScenarioReport> {
        let mut report = ScenarioReport::default();
        match scenario {
            Scenario::Basic => report.solver_runs = self.basic(),
            Scenario::Simple => report.groups.push(self.same_circuit(circuits::simple())),
            Scenario::Medium => report.groups.push(self.same_circuit(circuits::medium())),
            Scenario::Complex => report.groups.push(self.same_circuit(circuits::complex())),
            Scenario::Mix => report.groups.push(self.mix()),
            Scenario::All => self.all(&mut report)?,
        }
        Ok(report)
    }

    /// Each solver once on the simple circuit, dispatched through the
    /// execution layer with no policy in front of it.
    fn basic(&mut self) -> Vec<SolverRun> {
        let workload = circuits::simple();
        info!("Basic run on {}", workload);
        let executor = Executor::new(self.config.cancel_grace());

        SAME_CIRCUIT_ORDER
            .iter()
            .map(|&solver| {
                let unit = solver.build();
                if let Ok(mut guard) = unit.lock() {
                    guard.assign_workload(workload.clone());
                }
                let outcome = executor
                    .submit(solver.unit_name(), unit)
                    .map(|mut handle| handle.await_outcome(None));

                match outcome {
                    Ok(Outcome::Done(report)) => SolverRun {
                        solver,
                        state: Some(report.state),
                        elapsed_ms: report.elapsed.as_millis() as u64,
                        error: report.error,
                    },
                    Ok(Outcome::Faulted(e)) | Err(e) => SolverRun {
                        solver,
                        state: None,
                        elapsed_ms: 0,
                        error: Some(e.to_string()),
                    },
                    Ok(Outcome::TimedOut) => SolverRun {
                        solver,
                        state: None,
                        elapsed_ms: 0,
                        error: Some("timed out".into()),
                    },
                }
            })
            .collect()
    }

    /// The three solvers on one circuit under every policy.
    fn same_circuit(&mut self, workload: Workload) -> PolicyGroup {
        let title = workload.to_string();
        let tasks: Vec<_> = SAME_CIRCUIT_ORDER.iter().map(|&s| (s, workload.clone())).collect();
        let runs = PolicyKind::ALL
            .iter()
            .map(|&kind| self.run_policy(kind, &tasks, &title))
            .collect();
        PolicyGroup { title, runs }
    }

    /// A slow task first, then a fast and a medium one, under FCFS and SJF.
    fn mix(&mut self) -> PolicyGroup {
        let tasks = [
            (SolverKind::Cramer, circuits::complex()),
            (SolverKind::GaussJordan, circuits::simple()),
            (SolverKind::Lu, circuits::medium()),
        ];
        let title = "Mixed complexities".to_string();
        let runs = [PolicyKind::Fcfs, PolicyKind::Sjf]
            .iter()
            .map(|&kind| self.run_policy(kind, &tasks, &title))
            .collect();
        PolicyGroup { title, runs }
    }

    fn all(&mut self, report: &mut ScenarioReport) -> Result<()> {
        info!("\n{}", system_info());
        self.monitor.open().context("failed to open system monitor")?;
        self.sample("START");

        report.groups.push(self.same_circuit(circuits::simple()));
        report.groups.push(self.mix());

        self.sample("END");
        self.monitor.close().context("failed to close system monitor")?;

        for (group, slug) in report.groups.iter().zip(["simple", "mix"]) {
            let comparator = comparator_for(group);
            let csv = self.config.output_dir.join(format!("comparison_{slug}.csv"));
            let md = self.config.output_dir.join(format!("report_{slug}.md"));
            comparator.write_csv(&csv).context("failed to write CSV comparison")?;
            comparator.write_markdown(&md).context("failed to write Markdown report")?;
            report.reports_written.push(csv.display().to_string());
            report.reports_written.push(md.display().to_string());
        }
        Ok(())
    }

    fn run_policy(&mut self, kind: PolicyKind, tasks: &[(SolverKind, Workload)], group: &str) -> PolicyRun {
        let mut policy = build_policy(kind, self.config, Arc::clone(&self.estimator));
        for (solver, workload) in tasks {
            policy.enqueue(solver.build(), workload.clone());
        }
        let metrics = policy.run();
        self.sample(&format!("{group} / {kind}"));

        PolicyRun {
            kind,
            policy: policy.name().to_string(),
            metrics,
            tasks: policy.records().to_vec(),
        }
    }

    /// Sampling problems are logged, never fatal to a scenario.
    fn sample(&mut self, label: &str) {
        if let Err(e) = self.monitor.sample(label) {
            warn!(label, error = %e, "Monitor sample failed");
        }
    }
}

/// Monitor for `scenario`: `all` samples to the configured CSV file.
pub fn monitor_for(scenario: Scenario, config: &SimConfig) -> Box<dyn SystemMonitor> {
    match scenario {
        Scenario::All => Box::new(CsvMonitor::new(config.monitor_path())),
        _ => Box::new(NullMonitor::default()),
    }
}

pub fn comparator_for(group: &PolicyGroup) -> MetricsComparator {
    let mut comparator = MetricsComparator::new();
    for run in &group.runs {
        comparator.add(run.kind.to_string(), run.metrics);
    }
    comparator
}

impl ScenarioReport {
    /// Human-readable tables on stdout.
    pub fn print(&self) {
        if !self.solver_runs.is_empty() {
            println!("=== BASIC RUN (no scheduler) ===\n");
            for run in &self.solver_runs {
                match (run.state, &run.error) {
                    (Some(UnitState::Completed), _) => {
                        println!("  ✓ {}: {} ms", run.solver, run.elapsed_ms)
                    }
                    (_, Some(e)) => println!("  ✗ {}: {}", run.solver, e),
                    (state, None) => println!("  ? {}: {:?}", run.solver, state),
                }
            }
            println!();
        }

        for group in &self.groups {
            print_group(group);
        }

        for path in &self.reports_written {
            println!("Report written: {path}");
        }
    }
}

fn print_group(group: &PolicyGroup) {
    println!("{}", "=".repeat(70));
    println!("  {}", group.title);
    println!("{}", "=".repeat(70));

    for run in &group.runs {
        println!("\n{}", run.policy);
        println!("{}", run.metrics);
        for task in &run.tasks {
            let outcome = task.outcome.map_or_else(|| "pending".to_string(), |o| o.to_string());
            println!(
                "    {:<16} {:<18} {:<10} wait={:>5} ms  resp={:>5} ms  dispatches={}",
                task.unit, task.workload, outcome, task.waiting_ms, task.response_ms, task.attempts
            );
        }
    }

    println!("\n{:<22}{}", "Metric", header_row(group));
    println!("{}", "-".repeat(70));
    let rows: [(&str, fn(&MetricsSnapshot) -> i64); 5] = [
        ("Total time (ms)", |m| m.total_wall_time),
        ("Avg waiting (ms)", |m| m.avg_waiting_time),
        ("Avg response (ms)", |m| m.avg_response_time),
        ("Context switches", |m| m.context_switch_count as i64),
        ("Completed tasks", |m| m.completed_count as i64),
    ];
    for (label, value) in rows {
        let cells: String = group.runs.iter().map(|r| format!("{:<12}", value(&r.metrics))).collect();
        println!("{label:<22}{cells}");
    }

    let comparator = comparator_for(group);
    if let Some((name, ms)) = comparator.best_by(Criterion::AvgWaiting) {
        println!("\nLowest average waiting time: {name} ({ms} ms)");
    }
    println!();
}

fn header_row(group: &PolicyGroup) -> String {
    group.runs.iter().map(|r| format!("{:<12}", r.kind.to_string())).collect()
}
