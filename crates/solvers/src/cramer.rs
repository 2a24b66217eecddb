use cpusim_core::Workload;
use cpusim_scheduler::{CancelToken, Schedulable, UnitCore, UnitError, CRAMER};

use crate::SINGULARITY_EPSILON;

/// Cramer's rule with determinants by first-row cofactor expansion.
///
/// Factorial in the system size, which makes it the slow outlier on the
/// complex circuit. Polls the cancel token at every expansion step.
#[derive(Debug, Default)]
pub struct CramerSolver {
    core: UnitCore,
}

impl CramerSolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Schedulable for CramerSolver {
    fn name(&self) -> &str {
        CRAMER
    }

    fn assign_workload(&mut self, workload: Workload) {
        self.core.assign(workload);
    }

    fn run(&mut self, cancel: &CancelToken) {
        self.core.execute(CRAMER, cancel, solve);
    }

    crate::delegate_unit_core!();
}

pub(crate) fn solve(workload: &Workload, cancel: &CancelToken) -> Result<Vec<f64>, UnitError> {
    let a = &workload.coefficients;
    let b = &workload.constants;

    let det_a = determinant(a, cancel)?;
    if det_a.abs() < SINGULARITY_EPSILON {
        return Err(UnitError::Unsolvable(format!("det(A) = {det_a:e}, no unique solution")));
    }

    (0..b.len())
        .map(|col| {
            let replaced: Vec<Vec<f64>> = a
                .iter()
                .zip(b)
                .map(|(row, &bi)| {
                    let mut row = row.clone();
                    row[col] = bi;
                    row
                })
                .collect();
            Ok::<_, UnitError>(determinant(&replaced, cancel)? / det_a)
        })
        .collect()
}

fn determinant(m: &[Vec<f64>], cancel: &CancelToken) -> Result<f64, UnitError> {
    match m.len() {
        0 => Ok(1.0),
        1 => Ok(m[0][0]),
        2 => Ok(m[0][0] * m[1][1] - m[0][1] * m[1][0]),
        n => {
            cancel.check()?;
            let mut det = 0.0;
            for col in 0..n {
                let sign = if col % 2 == 0 { 1.0 } else { -1.0 };
                det += sign * m[0][col] * determinant(&minor(m, col), cancel)?;
            }
            Ok(det)
        }
    }
}

/// `m` without its first row and column `col`.
fn minor(m: &[Vec<f64>], col: usize) -> Vec<Vec<f64>> {
    m[1..]
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .filter(|&(j, _)| j != col)
                .map(|(_, &v)| v)
                .collect()
        })
        .collect()
}
