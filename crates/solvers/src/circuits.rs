//! Mesh-circuit workload generators.
//!
//! Each circuit is a diagonally dominant system `A·i = v`, one unknown mesh
//! current per mesh.

use cpusim_core::{Complexity, Workload};

/// 3 meshes, hand-written coefficients.
pub fn simple() -> Workload {
    Workload {
        label: "Circuit-3-Meshes".into(),
        complexity: Complexity::Simple,
        coefficients: vec![
            vec![15.0, -5.0, 0.0],
            vec![-5.0, 20.0, -8.0],
            vec![0.0, -8.0, 18.0],
        ],
        constants: vec![12.0, 0.0, 15.0],
    }
}

/// 6 meshes coupled to their first and second neighbours.
pub fn medium() -> Workload {
    let n: usize = 6;
    let coefficients = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| match i.abs_diff(j) {
                    0 => 30.0 + 5.0 * i as f64,
                    1 => -10.0,
                    2 => -3.0,
                    _ => 0.0,
                })
                .collect()
        })
        .collect();
    let constants = (0..n).map(|i| if i % 2 == 0 { 20.0 } else { 0.0 }).collect();

    Workload {
        label: "Circuit-6-Meshes".into(),
        complexity: Complexity::Medium,
        coefficients,
        constants,
    }
}

/// 9 meshes, every pair coupled.
pub fn complex() -> Workload {
    let n: usize = 9;
    let coefficients = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| match i.abs_diff(j) {
                    0 => 50.0 + 8.0 * i as f64,
                    d @ 1..=2 => -12.0 / (d + 1) as f64,
                    _ => -2.0,
                })
                .collect()
        })
        .collect();
    let constants = (0..n).map(|i| 25.0 * (i % 3) as f64).collect();

    Workload {
        label: "Circuit-9-Meshes".into(),
        complexity: Complexity::Complex,
        coefficients,
        constants,
    }
}

pub fn for_complexity(complexity: Complexity) -> Workload {
    match complexity {
        Complexity::Simple => simple(),
        Complexity::Medium => medium(),
        Complexity::Complex => complex(),
    }
}
