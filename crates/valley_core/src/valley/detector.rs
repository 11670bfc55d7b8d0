use anyhow::Result;
use nalgebra::{DMatrix, SymmetricEigen};

use super::types::{ValleyDetection, ValleyWalkConfig};
use crate::derivatives::symmetrize;
use crate::error::ensure_dimension;
use crate::traits::Objective;

/// Eigenpairs of the symmetric Hessian at a point, ordered by increasing |λ|.
pub(crate) struct SortedEigen {
    pub values: Vec<f64>,
    pub vectors: DMatrix<f64>,
}

pub(crate) fn sorted_hessian_eigen<O: Objective + ?Sized>(
    objective: &O,
    x: &[f64],
) -> Option<SortedEigen> {
    let hessian = symmetrize(&objective.hessian(x));
    if hessian.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let eig = SymmetricEigen::new(hessian);
    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| {
        eig.eigenvalues[a]
            .abs()
            .total_cmp(&eig.eigenvalues[b].abs())
    });

    let n = eig.eigenvalues.len();
    let mut vectors = DMatrix::zeros(n, n);
    let mut values = Vec::with_capacity(n);
    for (col, &idx) in order.iter().enumerate() {
        values.push(eig.eigenvalues[idx]);
        vectors.set_column(col, &eig.eigenvectors.column(idx));
    }
    Some(SortedEigen { values, vectors })
}

/// Decides whether `x` lies on a positive-dimensional critical manifold.
///
/// `x` must be critical (‖∇f‖ ≤ gradient_tolerance) and the Hessian must have
/// at least one eigenvalue with |λ| < eigenvalue_threshold. Isolated minima,
/// maxima and saddles are rejected. Only a dimension mismatch is an error.
pub fn detect_valley<O: Objective + ?Sized>(
    objective: &O,
    x: &[f64],
    config: &ValleyWalkConfig,
) -> Result<ValleyDetection> {
    ensure_dimension(objective.dimension(), x.len())?;

    let gradient_norm = objective.gradient(x).norm();
    if !gradient_norm.is_finite() || gradient_norm > config.gradient_tolerance {
        return Ok(ValleyDetection::rejected(gradient_norm, Vec::new()));
    }

    let Some(eigen) = sorted_hessian_eigen(objective, x) else {
        return Ok(ValleyDetection::rejected(gradient_norm, Vec::new()));
    };

    let dimension = eigen
        .values
        .iter()
        .take_while(|v| v.abs() < config.eigenvalue_threshold)
        .count();
    if dimension == 0 {
        return Ok(ValleyDetection::rejected(gradient_norm, eigen.values));
    }

    let tangent_basis = eigen.vectors.columns(0, dimension).into_owned();
    Ok(ValleyDetection {
        is_valley: true,
        tangent_basis: Some(tangent_basis),
        dimension,
        gradient_norm,
        eigenvalues: eigen.values,
    })
}
