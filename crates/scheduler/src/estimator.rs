//! Duration estimates used to order the SJF queue.
//!
//! Estimates are in milliseconds and never influence what a unit computes.

/// Identifier of the factorial-growth (cofactor expansion) solver.
pub const CRAMER: &str = "Cramer";
/// Identifier of the cubic elimination solver.
pub const GAUSS_JORDAN: &str = "Gauss-Jordan";
/// Identifier of the decomposition ("library") solver.
pub const NUMERIC_LIBRARY: &str = "Numeric-Library";

/// Maps (unit identifier, problem size) to an estimated duration in ms.
pub trait Estimator: Send + Sync {
    fn estimate(&self, unit_name: &str, size: usize) -> u64;
}

impl<F> Estimator for F
where
    F: Fn(&str, usize) -> u64 + Send + Sync,
{
    fn estimate(&self, unit_name: &str, size: usize) -> u64 {
        self(unit_name, size)
    }
}

/// Growth-class estimator for the bundled solvers.
///
/// | unit | formula |
/// |------|---------|
/// | `Cramer` | `round(2^n * 0.5)` |
/// | `Gauss-Jordan` | `round(n^3 * 0.1)` |
/// | anything else | `round(n^2.5 * 0.1)` |
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityEstimator;

impl Estimator for ComplexityEstimator {
    fn estimate(&self, unit_name: &str, size: usize) -> u64 {
        let n = size as f64;
        let raw = match unit_name {
            CRAMER => 2f64.powf(n) * 0.5,
            GAUSS_JORDAN => n.powi(3) * 0.1,
            _ => n.powf(2.5) * 0.1,
        };
        raw.round() as u64
    }
}
