use serde::{Deserialize, Serialize};

use crate::error::CpuSimError;

/// Difficulty bucket a workload was generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Complexity::Simple => write!(f, "SIMPLE"),
            Complexity::Medium => write!(f, "MEDIUM"),
            Complexity::Complex => write!(f, "COMPLEX"),
        }
    }
}

/// A labeled linear system `A·x = b` (a mesh circuit: one unknown per mesh).
///
/// The scheduler only looks at [`Workload::size`]; solvers read the matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub label: String,
    pub complexity: Complexity,
    pub coefficients: Vec<Vec<f64>>,
    pub constants: Vec<f64>,
}

impl Workload {
    /// Zero-filled workload of the given size.
    pub fn zeroed(label: impl Into<String>, complexity: Complexity, size: usize) -> Self {
        Self {
            label: label.into(),
            complexity,
            coefficients: vec![vec![0.0; size]; size],
            constants: vec![0.0; size],
        }
    }

    /// Build a workload from explicit parts, checking that the system is square.
    pub fn from_parts(
        label: impl Into<String>,
        complexity: Complexity,
        coefficients: Vec<Vec<f64>>,
        constants: Vec<f64>,
    ) -> Result<Self, CpuSimError> {
        let label = label.into();
        let n = constants.len();
        if n == 0 {
            return Err(CpuSimError::InvalidWorkload {
                label,
                reason: "system has no unknowns".into(),
            });
        }
        if coefficients.len() != n || coefficients.iter().any(|row| row.len() != n) {
            return Err(CpuSimError::InvalidWorkload {
                label,
                reason: format!("coefficient matrix is not {n}x{n}"),
            });
        }
        Ok(Self {
            label,
            complexity,
            coefficients,
            constants,
        })
    }

    /// Number of unknowns (meshes).
    pub fn size(&self) -> usize {
        self.constants.len()
    }
}

impl std::fmt::Display for Workload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Circuit[{}, {} meshes, {}]", self.label, self.size(), self.complexity)
    }
}
