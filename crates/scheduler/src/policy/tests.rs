use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpusim_core::SimConfig;

use super::*;
use crate::estimator::ComplexityEstimator;
use crate::testing::{
    workload, FailingUnit, FlakyUnit, ForgetfulUnit, PanickingUnit, RecordingUnit, SleepyUnit,
    StubbornUnit,
};
use crate::unit::{share, UnitState};

fn config(quantum_ms: u64, max_quantums: u32, cancel_grace_ms: u64) -> SimConfig {
    SimConfig {
        quantum_ms,
        max_quantums,
        cancel_grace_ms,
        ..SimConfig::default()
    }
}

fn policy(kind: PolicyKind) -> Box<dyn Policy> {
    build_policy(kind, &config(100, 10, 200), Arc::new(ComplexityEstimator))
}

/// Estimator keyed on unit name only.
fn by_name(table: &'static [(&'static str, u64)]) -> Arc<dyn Estimator> {
    Arc::new(move |name: &str, _n: usize| -> u64 {
        table.iter().find(|(n, _)| *n == name).map_or(0, |(_, ms)| *ms)
    })
}

fn quick(name: &str) -> SharedUnit {
    share(SleepyUnit::new(name, Duration::from_millis(1)))
}

fn dispatched_units(policy: &dyn Policy) -> Vec<String> {
    policy.dispatch_log().iter().map(|d| d.unit.clone()).collect()
}

// ── FCFS ─────────────────────────────────────────────────────

#[test]
fn fcfs_dispatches_in_enqueue_order_whatever_the_estimates() {
    let est = by_name(&[("a", 900), ("b", 500), ("c", 1)]);
    let mut fcfs = build_policy(PolicyKind::Fcfs, &SimConfig::default(), est);
    for name in ["a", "b", "c"] {
        fcfs.enqueue(quick(name), workload(name, 2));
    }

    let snap = fcfs.run();

    assert_eq!(dispatched_units(fcfs.as_ref()), vec!["a", "b", "c"]);
    assert_eq!(snap.completed_count, 3);
    assert_eq!(snap.context_switch_count, 0);
    assert!(!fcfs.has_pending());
    assert_eq!(fcfs.metrics(), snap);
}

#[test]
fn fcfs_keeps_going_after_failures() {
    let mut fcfs = policy(PolicyKind::Fcfs);
    fcfs.enqueue(share(FailingUnit::new("failing")), workload("w1", 2));
    fcfs.enqueue(share(ForgetfulUnit::new("forgetful")), workload("w2", 2));
    fcfs.enqueue(share(PanickingUnit::new("panicking")), workload("w3", 2));
    fcfs.enqueue(quick("fine"), workload("w4", 2));

    let snap = fcfs.run();

    let outcomes: Vec<_> = fcfs.records().iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            Some(TaskOutcome::Failed),
            Some(TaskOutcome::Failed),
            Some(TaskOutcome::Faulted),
            Some(TaskOutcome::Completed),
        ]
    );
    assert_eq!(snap.completed_count, 4);
}

// ── SJF ──────────────────────────────────────────────────────

#[test]
fn sjf_orders_by_estimate_and_keeps_ties_stable() {
    let est = by_name(&[("a", 5), ("b", 1), ("c", 5), ("d", 1)]);
    let mut sjf = SjfPolicy::new(est, Executor::default());
    for name in ["a", "b", "c", "d"] {
        sjf.enqueue(quick(name), workload(name, 2));
    }

    let planned: Vec<_> = sjf.planned_order().into_iter().map(|r| r.unit).collect();
    assert_eq!(planned, vec!["b", "d", "a", "c"]);
    assert!(sjf.has_pending(), "planning must not consume the queue");

    let snap = sjf.run();
    assert_eq!(dispatched_units(&sjf), planned);
    assert_eq!(snap.completed_count, 4);
    assert_eq!(snap.context_switch_count, 0);
}

#[test]
fn sjf_tracks_estimation_error_for_completed_tasks_only() {
    let est = by_name(&[("done", 1_000), ("failing", 1_000)]);
    let mut sjf = SjfPolicy::new(est, Executor::default());
    assert!(sjf.mean_estimation_error().is_none());

    sjf.enqueue(quick("done"), workload("w", 2));
    sjf.enqueue(share(FailingUnit::new("failing")), workload("w", 2));
    sjf.run();

    // One completion, a few ms against an estimate of 1000 ms.
    let total = sjf.estimation_error_total();
    assert!(total > 900 && total <= 1_000, "total error {total}");
    assert_eq!(sjf.mean_estimation_error(), Some(total as f64));
}

// ── Round-Robin ──────────────────────────────────────────────

#[test]
fn rr_short_tasks_finish_without_context_switches() {
    let mut rr = policy(PolicyKind::RoundRobin);
    for name in ["a", "b", "c"] {
        rr.enqueue(quick(name), workload(name, 2));
    }

    let snap = rr.run();

    assert_eq!(dispatched_units(rr.as_ref()), vec!["a", "b", "c"]);
    assert_eq!(snap.completed_count, 3);
    assert_eq!(snap.context_switch_count, 0);
}

#[test]
fn rr_abandons_after_ten_requeues() {
    let mut rr = build_policy(
        PolicyKind::RoundRobin,
        &config(5, 10, 200),
        Arc::new(ComplexityEstimator),
    );
    rr.enqueue(
        share(SleepyUnit::new("endless", Duration::from_secs(30))),
        workload("w", 2),
    );

    let snap = rr.run();

    assert_eq!(rr.dispatch_log().len(), 11);
    let record = &rr.records()[0];
    assert_eq!(record.outcome, Some(TaskOutcome::Abandoned));
    assert_eq!(record.quantums_used, 11);
    assert_eq!(record.attempts, 11);
    assert_eq!(snap.completed_count, 1);
    assert_eq!(snap.context_switch_count, 10);
    assert!(!rr.has_pending());
}

#[test]
fn rr_abandons_units_that_ignore_cancellation() {
    let mut rr = build_policy(
        PolicyKind::RoundRobin,
        &config(5, 2, 2),
        Arc::new(ComplexityEstimator),
    );
    rr.enqueue(
        share(StubbornUnit::new("stubborn", Duration::from_millis(400))),
        workload("w", 2),
    );

    let started = Instant::now();
    let snap = rr.run();

    // Three short quanta plus grace periods, not the unit's full runtime.
    assert!(started.elapsed() < Duration::from_millis(300));
    assert_eq!(rr.records()[0].outcome, Some(TaskOutcome::Abandoned));
    assert_eq!(rr.dispatch_log().len(), 3);
    assert_eq!(snap.completed_count, 1);
}

#[test]
fn rr_abandoned_task_keeps_no_result_even_if_it_finished_in_grace() {
    let mut rr = build_policy(
        PolicyKind::RoundRobin,
        &config(20, 1, 200),
        Arc::new(ComplexityEstimator),
    );
    // Outlives every quantum but always finishes inside the cancel grace.
    let unit = share(StubbornUnit::new("late", Duration::from_millis(40)));
    rr.enqueue(Arc::clone(&unit), workload("w", 2));

    let snap = rr.run();

    assert_eq!(rr.dispatch_log().len(), 2);
    assert_eq!(rr.records()[0].outcome, Some(TaskOutcome::Abandoned));
    assert_eq!(snap.completed_count, 1);

    let guard = unit.lock().unwrap();
    assert!(guard.result().is_none());
    assert_ne!(guard.state(), UnitState::Completed);
}

#[test]
fn rr_counts_one_context_switch_per_resumption() {
    let mut rr = build_policy(
        PolicyKind::RoundRobin,
        &config(50, 10, 200),
        Arc::new(ComplexityEstimator),
    );
    let flaky = FlakyUnit::new("flaky", 2, Duration::from_secs(10), Duration::ZERO);
    let runs = flaky.runs();
    rr.enqueue(share(flaky), workload("w", 2));

    let snap = rr.run();

    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(snap.context_switch_count, 2);
    let record = &rr.records()[0];
    assert_eq!(record.outcome, Some(TaskOutcome::Completed));
    assert_eq!(record.quantums_used, 2);
}

#[test]
fn rr_requeues_preempted_task_behind_waiting_ones() {
    let mut rr = build_policy(
        PolicyKind::RoundRobin,
        &config(50, 10, 200),
        Arc::new(ComplexityEstimator),
    );
    rr.enqueue(
        share(FlakyUnit::new("long", 1, Duration::from_secs(10), Duration::ZERO)),
        workload("w1", 2),
    );
    rr.enqueue(quick("short"), workload("w2", 2));

    let snap = rr.run();

    assert_eq!(dispatched_units(rr.as_ref()), vec!["long", "short", "long"]);
    let attempts: Vec<_> = rr.dispatch_log().iter().map(|d| d.attempt).collect();
    assert_eq!(attempts, vec![1, 1, 2]);
    assert_eq!(snap.context_switch_count, 1);
    assert_eq!(snap.completed_count, 2);
}

// ── All policies ─────────────────────────────────────────────

#[test]
fn every_enqueued_task_is_accounted_exactly_once() {
    for kind in PolicyKind::ALL {
        let mut p = policy(kind);
        p.enqueue(quick("ok"), workload("w1", 2));
        p.enqueue(share(FailingUnit::new("failing")), workload("w2", 2));
        p.enqueue(share(ForgetfulUnit::new("forgetful")), workload("w3", 2));
        p.enqueue(share(PanickingUnit::new("panicking")), workload("w4", 2));

        let snap = p.run();

        assert_eq!(snap.completed_count, 4, "{kind}");
        assert_eq!(p.records().len(), 4, "{kind}");
        let mut ids: Vec<_> = p.records().iter().map(|r| r.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4, "{kind}");
    }
}

#[test]
fn averages_follow_truncating_division() {
    for kind in PolicyKind::ALL {
        let mut p = policy(kind);
        for (i, ms) in [3u64, 7, 2, 5, 1].into_iter().enumerate() {
            let name = format!("u{i}");
            p.enqueue(
                share(SleepyUnit::new(&name, Duration::from_millis(ms))),
                workload(&name, 2),
            );
        }

        let snap = p.run();
        let n = snap.completed_count as i64;
        let sum_w: i64 = p.records().iter().map(|r| r.waiting_ms).sum();
        let sum_r: i64 = p.records().iter().map(|r| r.response_ms).sum();

        assert_eq!(n, 5);
        assert_eq!(snap.avg_waiting_time, sum_w / n, "{kind}");
        assert_eq!(snap.avg_response_time, sum_r / n, "{kind}");
    }
}

#[test]
fn empty_run_yields_zeroed_counters() {
    for kind in PolicyKind::ALL {
        let mut p = policy(kind);
        let snap = p.run();
        assert_eq!(snap.completed_count, 0);
        assert_eq!(snap.avg_waiting_time, 0);
        assert_eq!(snap.avg_response_time, 0);
        assert_eq!(snap.context_switch_count, 0);
    }
}

#[test]
fn clear_drops_queue_and_metrics() {
    for kind in PolicyKind::ALL {
        let mut p = policy(kind);
        p.enqueue(quick("a"), workload("w", 2));
        p.run();
        assert_eq!(p.metrics().completed_count, 1);

        p.enqueue(quick("b"), workload("w", 2));
        p.clear();

        assert!(!p.has_pending());
        assert_eq!(p.metrics(), MetricsSnapshot::default());
        assert!(p.records().is_empty());
        assert!(p.dispatch_log().is_empty());
    }
}

#[test]
fn each_task_gets_its_own_workload_copy() {
    for kind in PolicyKind::ALL {
        let mut p = policy(kind);
        let recorder = RecordingUnit::new("shared");
        let solved = recorder.solved();
        let unit = share(recorder);
        p.enqueue(Arc::clone(&unit), workload("first", 3));
        p.enqueue(Arc::clone(&unit), workload("second", 5));

        p.run();

        let logged: Vec<_> = p.dispatch_log().iter().map(|d| d.workload.clone()).collect();
        assert_eq!(*solved.lock().unwrap(), logged, "{kind}");
        let mut labels = logged.clone();
        labels.sort();
        assert_eq!(labels, vec!["first", "second"], "{kind}");
        // The unit ends up holding the last dispatched task's workload only.
        let last_size = if logged[1] == "second" { 5 } else { 3 };
        assert_eq!(unit.lock().unwrap().result().map(<[f64]>::len), Some(last_size), "{kind}");
    }
}

#[test]
fn dispatch_order_is_deterministic_for_every_policy() {
    for kind in PolicyKind::ALL {
        let run_once = || {
            let est = by_name(&[("x", 3), ("y", 2), ("z", 3), ("w", 2)]);
            let mut p = build_policy(kind, &config(100, 10, 200), est);
            for name in ["x", "y", "z", "w"] {
                p.enqueue(quick(name), workload(name, 2));
            }
            p.run();
            dispatched_units(p.as_ref())
        };

        assert_eq!(run_once(), run_once(), "{kind}");
    }
}

#[test]
fn unit_name_with_nul_does_not_abort_the_run() {
    let mut fcfs = policy(PolicyKind::Fcfs);
    fcfs.enqueue(quick("bad\0name"), workload("w1", 2));
    fcfs.enqueue(quick("next"), workload("w2", 2));

    let snap = fcfs.run();

    assert_eq!(snap.completed_count, 2);
    assert!(fcfs
        .records()
        .iter()
        .all(|r| r.outcome == Some(TaskOutcome::Completed)));
}

#[test]
fn records_serialize_for_reports() {
    let mut fcfs = policy(PolicyKind::Fcfs);
    fcfs.enqueue(quick("a"), workload("w", 2));
    fcfs.run();

    let json = serde_json::to_string(fcfs.records()).unwrap();
    assert!(json.contains("\"outcome\":\"Completed\""));
    assert!(json.contains("\"unit\":\"a\""));
}

// ── Construction ─────────────────────────────────────────────

#[test]
fn build_policy_names_and_kinds() {
    let cfg = config(250, 10, 25);
    let est: Arc<dyn Estimator> = Arc::new(ComplexityEstimator);

    let fcfs = build_policy(PolicyKind::Fcfs, &cfg, Arc::clone(&est));
    let rr = build_policy(PolicyKind::RoundRobin, &cfg, Arc::clone(&est));
    let sjf = build_policy(PolicyKind::Sjf, &cfg, est);

    assert_eq!(fcfs.name(), "FCFS (First-Come First-Served)");
    assert_eq!(rr.name(), "Round Robin (quantum=250ms)");
    assert_eq!(sjf.name(), "SJF (Shortest Job First)");
    assert_eq!(rr.kind(), PolicyKind::RoundRobin);
}

#[test]
fn policy_kind_parses_common_spellings() {
    assert_eq!("FCFS".parse::<PolicyKind>().unwrap(), PolicyKind::Fcfs);
    assert_eq!("round-robin".parse::<PolicyKind>().unwrap(), PolicyKind::RoundRobin);
    assert_eq!("rr".parse::<PolicyKind>().unwrap(), PolicyKind::RoundRobin);
    assert_eq!("sjf".parse::<PolicyKind>().unwrap(), PolicyKind::Sjf);
    assert!("lottery".parse::<PolicyKind>().is_err());
}
