use cpusim_core::Workload;
use cpusim_scheduler::{CancelToken, Schedulable, UnitCore, UnitError, GAUSS_JORDAN};

use crate::SINGULARITY_EPSILON;

/// Gauss-Jordan elimination with partial pivoting.
#[derive(Debug, Default)]
pub struct GaussJordanSolver {
    core: UnitCore,
}

impl GaussJordanSolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Schedulable for GaussJordanSolver {
    fn name(&self) -> &str {
        GAUSS_JORDAN
    }

    fn assign_workload(&mut self, workload: Workload) {
        self.core.assign(workload);
    }

    fn run(&mut self, cancel: &CancelToken) {
        self.core.execute(GAUSS_JORDAN, cancel, solve);
    }

    crate::delegate_unit_core!();
}

pub(crate) fn solve(workload: &Workload, cancel: &CancelToken) -> Result<Vec<f64>, UnitError> {
    let mut a = workload.coefficients.clone();
    let mut b = workload.constants.clone();
    let n = b.len();

    for i in 0..n {
        cancel.check()?;

        let max_row = (i..n)
            .max_by(|&p, &q| a[p][i].abs().total_cmp(&a[q][i].abs()))
            .unwrap_or(i);
        if max_row != i {
            a.swap(i, max_row);
            b.swap(i, max_row);
        }

        let pivot = a[i][i];
        if pivot.abs() < SINGULARITY_EPSILON {
            return Err(UnitError::Unsolvable(format!("pivot {pivot:e} in column {i}, matrix is singular")));
        }

        for v in &mut a[i][i..] {
            *v /= pivot;
        }
        b[i] /= pivot;

        let (pivot_row, pivot_b) = (a[i].clone(), b[i]);
        for k in (0..n).filter(|&k| k != i) {
            let factor = a[k][i];
            if factor == 0.0 {
                continue;
            }
            for (v, p) in a[k][i..].iter_mut().zip(&pivot_row[i..]) {
                *v -= factor * p;
            }
            b[k] -= factor * pivot_b;
        }
    }

    Ok(b)
}
