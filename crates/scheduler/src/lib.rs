//! Single-processor scheduling engine.
//!
//! Tasks wrap a [`Schedulable`] unit and its [`Workload`](cpusim_core::Workload).
//! A [`Policy`] drains its queue one dispatch at a time through the
//! [`Executor`], which runs the unit on a worker thread so the controller can
//! time out and request cancellation. Each run produces a [`MetricsSnapshot`].

pub mod estimator;
pub mod executor;
pub mod metrics;
pub mod policy;
pub mod task;
pub mod unit;

#[cfg(test)]
mod testing;

pub use estimator::{ComplexityEstimator, Estimator, CRAMER, GAUSS_JORDAN, NUMERIC_LIBRARY};
pub use executor::{ExecutionError, ExecutionHandle, Executor, Outcome, RunReport};
pub use metrics::{MetricsAccumulator, MetricsSnapshot};
pub use policy::{
    build_policy, DispatchEntry, FcfsPolicy, Policy, PolicyKind, RoundRobinPolicy, SjfPolicy,
};
pub use task::{Task, TaskId, TaskOutcome, TaskRecord};
pub use unit::{share, CancelToken, Schedulable, SharedUnit, UnitCore, UnitError, UnitState};
