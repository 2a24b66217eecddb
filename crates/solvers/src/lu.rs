use cpusim_core::Workload;
use cpusim_scheduler::{CancelToken, Schedulable, UnitCore, UnitError, NUMERIC_LIBRARY};

use crate::SINGULARITY_EPSILON;

/// The "library" solver: Doolittle LU decomposition followed by forward and
/// back substitution.
#[derive(Debug, Default)]
pub struct LuSolver {
    core: UnitCore,
}

impl LuSolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Schedulable for LuSolver {
    fn name(&self) -> &str {
        NUMERIC_LIBRARY
    }

    fn assign_workload(&mut self, workload: Workload) {
        self.core.assign(workload);
    }

    fn run(&mut self, cancel: &CancelToken) {
        self.core.execute(NUMERIC_LIBRARY, cancel, solve);
    }

    crate::delegate_unit_core!();
}

pub(crate) fn solve(workload: &Workload, cancel: &CancelToken) -> Result<Vec<f64>, UnitError> {
    let a = &workload.coefficients;
    let b = &workload.constants;
    let n = b.len();

    let mut l = vec![vec![0.0; n]; n];
    let mut u = vec![vec![0.0; n]; n];

    for i in 0..n {
        cancel.check()?;
        l[i][i] = 1.0;

        for k in i..n {
            let sum: f64 = (0..i).map(|j| l[i][j] * u[j][k]).sum();
            u[i][k] = a[i][k] - sum;
        }
        if u[i][i].abs() < SINGULARITY_EPSILON {
            return Err(UnitError::Unsolvable(format!("zero pivot U[{i}][{i}], matrix is singular")));
        }
        for k in i + 1..n {
            let sum: f64 = (0..i).map(|j| l[k][j] * u[j][i]).sum();
            l[k][i] = (a[k][i] - sum) / u[i][i];
        }
    }

    // L·y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[i][j] * y[j]).sum();
        y[i] = b[i] - sum;
    }

    // U·x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|j| u[i][j] * x[j]).sum();
        x[i] = (y[i] - sum) / u[i][i];
    }

    Ok(x)
}
