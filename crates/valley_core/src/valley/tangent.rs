use nalgebra::DVector;

use super::detector::sorted_hessian_eigen;
use super::types::ValleyWalkConfig;
use crate::traits::Objective;

/// Tangent to the valley at `x`, oriented to continue `prev_direction`.
///
/// Returns `None` when no Hessian eigenvalue is below the threshold, i.e. the
/// walk has left the manifold. For valleys of dimension > 1 this follows only
/// the eigenvector of smallest |λ|, so a single curve inside the manifold is
/// traced.
pub fn get_valley_tangent<O: Objective + ?Sized>(
    objective: &O,
    x: &DVector<f64>,
    prev_direction: &DVector<f64>,
    config: &ValleyWalkConfig,
) -> Option<DVector<f64>> {
    let eigen = sorted_hessian_eigen(objective, x.as_slice())?;
    let smallest = *eigen.values.first()?;
    if smallest.abs() >= config.eigenvalue_threshold {
        return None;
    }

    let mut tangent = eigen.vectors.column(0).into_owned();
    let norm = tangent.norm();
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    tangent /= norm;
    if tangent.dot(prev_direction) < 0.0 {
        tangent = -tangent;
    }
    Some(tangent)
}
