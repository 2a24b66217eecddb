//! Deterministic units for exercising the executor and the policies.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use cpusim_core::{Complexity, Workload};

use crate::unit::{CancelToken, Schedulable, UnitCore, UnitError, UnitState};

pub fn workload(label: &str, size: usize) -> Workload {
    Workload::zeroed(label, Complexity::Simple, size)
}

/// Sleep in 1 ms slices, polling the token between slices.
fn cooperative_sleep(total: Duration, cancel: &CancelToken) -> Result<(), UnitError> {
    let deadline = Instant::now() + total;
    while Instant::now() < deadline {
        cancel.check()?;
        thread::sleep(Duration::from_millis(1).min(deadline.saturating_duration_since(Instant::now())));
    }
    cancel.check()
}

macro_rules! delegate_core {
    () => {
        fn state(&self) -> UnitState {
            self.core.state()
        }
        fn elapsed(&self) -> Duration {
            self.core.elapsed()
        }
        fn result(&self) -> Option<&[f64]> {
            self.core.result()
        }
        fn discard_result(&mut self) {
            self.core.discard_result()
        }
        fn last_error(&self) -> Option<&UnitError> {
            self.core.last_error()
        }
    };
}

/// Completes after `duration`, honouring cancellation.
pub struct SleepyUnit {
    name: String,
    duration: Duration,
    core: UnitCore,
}

impl SleepyUnit {
    pub fn new(name: &str, duration: Duration) -> Self {
        Self { name: name.to_string(), duration, core: UnitCore::new() }
    }
}

impl Schedulable for SleepyUnit {
    fn name(&self) -> &str {
        &self.name
    }
    fn assign_workload(&mut self, workload: Workload) {
        self.core.assign(workload);
    }
    fn run(&mut self, cancel: &CancelToken) {
        let duration = self.duration;
        self.core.execute(&self.name, cancel, |w, c| {
            cooperative_sleep(duration, c)?;
            Ok(vec![1.0; w.size()])
        });
    }
    delegate_core!();
}

/// Sleeps for `duration` without ever looking at the token.
pub struct StubbornUnit {
    name: String,
    duration: Duration,
    core: UnitCore,
}

impl StubbornUnit {
    pub fn new(name: &str, duration: Duration) -> Self {
        Self { name: name.to_string(), duration, core: UnitCore::new() }
    }
}

impl Schedulable for StubbornUnit {
    fn name(&self) -> &str {
        &self.name
    }
    fn assign_workload(&mut self, workload: Workload) {
        self.core.assign(workload);
    }
    fn run(&mut self, cancel: &CancelToken) {
        let duration = self.duration;
        self.core.execute(&self.name, cancel, |w, _| {
            thread::sleep(duration);
            Ok(vec![0.0; w.size()])
        });
    }
    delegate_core!();
}

/// Slow for the first `slow_attempts` runs, fast afterwards. Counts runs.
pub struct FlakyUnit {
    name: String,
    slow_attempts: usize,
    slow: Duration,
    fast: Duration,
    runs: Arc<AtomicUsize>,
    core: UnitCore,
}

impl FlakyUnit {
    pub fn new(name: &str, slow_attempts: usize, slow: Duration, fast: Duration) -> Self {
        Self {
            name: name.to_string(),
            slow_attempts,
            slow,
            fast,
            runs: Arc::new(AtomicUsize::new(0)),
            core: UnitCore::new(),
        }
    }

    pub fn runs(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.runs)
    }
}

impl Schedulable for FlakyUnit {
    fn name(&self) -> &str {
        &self.name
    }
    fn assign_workload(&mut self, workload: Workload) {
        self.core.assign(workload);
    }
    fn run(&mut self, cancel: &CancelToken) {
        let attempt = self.runs.fetch_add(1, Ordering::SeqCst);
        let duration = if attempt < self.slow_attempts { self.slow } else { self.fast };
        self.core.execute(&self.name, cancel, |w, c| {
            cooperative_sleep(duration, c)?;
            Ok(vec![2.0; w.size()])
        });
    }
    delegate_core!();
}

/// Always reports an unsolvable workload.
pub struct FailingUnit {
    name: String,
    core: UnitCore,
}

impl FailingUnit {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), core: UnitCore::new() }
    }
}

impl Schedulable for FailingUnit {
    fn name(&self) -> &str {
        &self.name
    }
    fn assign_workload(&mut self, workload: Workload) {
        self.core.assign(workload);
    }
    fn run(&mut self, cancel: &CancelToken) {
        self.core.execute(&self.name, cancel, |_, _| {
            Err(UnitError::Unsolvable("singular matrix".into()))
        });
    }
    delegate_core!();
}

/// Drops whatever workload it is given, so every run hits `WorkloadNotAssigned`.
pub struct ForgetfulUnit {
    name: String,
    core: UnitCore,
}

impl ForgetfulUnit {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), core: UnitCore::new() }
    }
}

impl Schedulable for ForgetfulUnit {
    fn name(&self) -> &str {
        &self.name
    }
    fn assign_workload(&mut self, _workload: Workload) {}
    fn run(&mut self, cancel: &CancelToken) {
        self.core.execute(&self.name, cancel, |_, _| Ok(vec![]));
    }
    delegate_core!();
}

/// Panics inside `run`.
pub struct PanickingUnit {
    name: String,
    core: UnitCore,
}

impl PanickingUnit {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), core: UnitCore::new() }
    }
}

impl Schedulable for PanickingUnit {
    fn name(&self) -> &str {
        &self.name
    }
    fn assign_workload(&mut self, workload: Workload) {
        self.core.assign(workload);
    }
    fn run(&mut self, _cancel: &CancelToken) {
        panic!("boom");
    }
    delegate_core!();
}

/// Records the label of every workload it solves.
pub struct RecordingUnit {
    name: String,
    solved: Arc<Mutex<Vec<String>>>,
    core: UnitCore,
}

impl RecordingUnit {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), solved: Arc::default(), core: UnitCore::new() }
    }

    pub fn solved(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.solved)
    }
}

impl Schedulable for RecordingUnit {
    fn name(&self) -> &str {
        &self.name
    }
    fn assign_workload(&mut self, workload: Workload) {
        self.core.assign(workload);
    }
    fn run(&mut self, cancel: &CancelToken) {
        let solved = Arc::clone(&self.solved);
        self.core.execute(&self.name, cancel, |w, _| {
            solved.lock().unwrap().push(w.label.clone());
            Ok(vec![0.0; w.size()])
        });
    }
    delegate_core!();
}
