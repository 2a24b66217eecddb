//! Linear-system solvers for mesh circuits, packaged as schedulable units.
//!
//! The three solvers have very different growth (factorial, cubic, cubic with
//! a smaller constant), which is what makes them interesting to schedule.

/// Implements the read-only half of `Schedulable` by delegating to `self.core`.
macro_rules! delegate_unit_core {
    () => {
        fn state(&self) -> cpusim_scheduler::UnitState {
            self.core.state()
        }

        fn elapsed(&self) -> std::time::Duration {
            self.core.elapsed()
        }

        fn result(&self) -> Option<&[f64]> {
            self.core.result()
        }

        fn discard_result(&mut self) {
            self.core.discard_result()
        }

        fn last_error(&self) -> Option<&cpusim_scheduler::UnitError> {
            self.core.last_error()
        }
    };
}
pub(crate) use delegate_unit_core;

pub mod circuits;
mod cramer;
mod gauss_jordan;
mod lu;

use std::fmt;

use cpusim_scheduler::{share, SharedUnit, CRAMER, GAUSS_JORDAN, NUMERIC_LIBRARY};
use serde::{Deserialize, Serialize};

pub use cramer::CramerSolver;
pub use gauss_jordan::GaussJordanSolver;
pub use lu::LuSolver;

/// Pivots and determinants below this magnitude make a system unsolvable.
pub const SINGULARITY_EPSILON: f64 = 1e-10;

/// The bundled solvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverKind {
    Cramer,
    GaussJordan,
    Lu,
}

impl SolverKind {
    pub const ALL: [SolverKind; 3] = [SolverKind::Cramer, SolverKind::GaussJordan, SolverKind::Lu];

    /// Identifier the estimator keys on.
    pub fn unit_name(self) -> &'static str {
        match self {
            SolverKind::Cramer => CRAMER,
            SolverKind::GaussJordan => GAUSS_JORDAN,
            SolverKind::Lu => NUMERIC_LIBRARY,
        }
    }

    /// A fresh unit ready to be enqueued.
    pub fn build(self) -> SharedUnit {
        match self {
            SolverKind::Cramer => share(CramerSolver::new()),
            SolverKind::GaussJordan => share(GaussJordanSolver::new()),
            SolverKind::Lu => share(LuSolver::new()),
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.unit_name())
    }
}
