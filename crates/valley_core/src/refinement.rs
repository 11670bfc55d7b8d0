//! Newton refinement of raw critical-point candidates.
//!
//! Produces [`CriticalPointRefinementResult`] values whose `cp_type` drives
//! which points the valley analysis traces.

use crate::error::{ensure_dimension, ValleyError};
use crate::traits::Objective;
use anyhow::{bail, Result};
use nalgebra::{DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};

/// Relative singular-value cutoff for least-squares Hessian solves.
///
/// Finite-difference Hessians carry O(h²) stencil error (around 1e-7) in
/// their null directions; the cutoff has to sit above that so the valley
/// directions are dropped instead of inverted.
pub(crate) const PSEUDO_INVERSE_RCOND: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalPointType {
    Min,
    Max,
    Saddle,
    Degenerate,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalPointRefinementResult {
    pub point: Vec<f64>,
    pub gradient_norm: f64,
    pub objective_value: f64,
    pub converged: bool,
    pub iterations: usize,
    pub cp_type: CriticalPointType,
    pub eigenvalues: Vec<f64>,
    pub initial_gradient_norm: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    pub tolerance: f64,
    pub eigenvalue_threshold: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 25,
            damping: 1.0,
            tolerance: 1e-9,
            eigenvalue_threshold: 1e-4,
        }
    }
}

/// Classifies a critical point from its Hessian eigenvalues.
///
/// Any eigenvalue with `|λ| < threshold` makes the point degenerate.
pub fn classify_critical_point(eigenvalues: &[f64], threshold: f64) -> CriticalPointType {
    if eigenvalues.is_empty() || eigenvalues.iter().any(|v| !v.is_finite()) {
        return CriticalPointType::Unknown;
    }
    if eigenvalues.iter().any(|v| v.abs() < threshold) {
        return CriticalPointType::Degenerate;
    }
    let positive = eigenvalues.iter().filter(|&&v| v > 0.0).count();
    if positive == eigenvalues.len() {
        CriticalPointType::Min
    } else if positive == 0 {
        CriticalPointType::Max
    } else {
        CriticalPointType::Saddle
    }
}

/// Refines `initial_guess` towards ∇f = 0 with damped Newton steps.
///
/// The step solves `H Δx = -∇f` in the least-squares sense so singular
/// Hessians (valley points) do not abort the refinement. Failing to reach
/// `tolerance` is reported through `converged = false` and
/// `cp_type = Unknown`, not as an error.
pub fn refine_critical_point<O: Objective + ?Sized>(
    objective: &O,
    initial_guess: &[f64],
    settings: NewtonSettings,
) -> Result<CriticalPointRefinementResult> {
    let dim = objective.dimension();
    if dim == 0 {
        bail!("Objective has zero dimension.");
    }
    ensure_dimension(dim, initial_guess.len())?;
    if settings.max_steps == 0 {
        bail!(ValleyError::InvalidConfig(
            "max_steps must be greater than zero.".to_string()
        ));
    }
    if settings.damping <= 0.0 {
        bail!(ValleyError::InvalidConfig("damping must be positive.".to_string()));
    }
    if settings.tolerance <= 0.0 {
        bail!(ValleyError::InvalidConfig("tolerance must be positive.".to_string()));
    }

    let mut state = DVector::from_column_slice(initial_guess);
    let mut gradient = objective.gradient(state.as_slice());
    let initial_gradient_norm = gradient.norm();
    let mut gradient_norm = initial_gradient_norm;
    let mut iterations = 0usize;

    while gradient_norm > settings.tolerance && iterations < settings.max_steps {
        let hessian = objective.hessian(state.as_slice());
        let Some(delta) = least_squares_step(hessian, &gradient) else {
            break;
        };
        let candidate = &state + delta * settings.damping;
        if candidate.iter().any(|v| !v.is_finite()) {
            break;
        }
        state = candidate;
        iterations += 1;
        gradient = objective.gradient(state.as_slice());
        gradient_norm = gradient.norm();
        if !gradient_norm.is_finite() {
            break;
        }
    }

    let converged = gradient_norm.is_finite() && gradient_norm <= settings.tolerance;
    let eigenvalues: Vec<f64> = SymmetricEigen::new(objective.hessian(state.as_slice()))
        .eigenvalues
        .iter()
        .copied()
        .collect();
    let cp_type = if converged {
        classify_critical_point(&eigenvalues, settings.eigenvalue_threshold)
    } else {
        CriticalPointType::Unknown
    };

    Ok(CriticalPointRefinementResult {
        objective_value: objective.value(state.as_slice()),
        point: state.iter().copied().collect(),
        gradient_norm,
        converged,
        iterations,
        cp_type,
        eigenvalues,
        initial_gradient_norm,
    })
}

/// Solves `H Δx = -g` by SVD least squares with a relative cutoff.
pub(crate) fn least_squares_step(
    hessian: nalgebra::DMatrix<f64>,
    gradient: &DVector<f64>,
) -> Option<DVector<f64>> {
    if hessian.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let svd = hessian.svd(true, true);
    let cutoff = PSEUDO_INVERSE_RCOND * svd.singular_values.max();
    let step = svd.solve(&(-gradient), cutoff).ok()?;
    step.iter().all(|v| v.is_finite()).then_some(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivatives::test_functions::{Bowl, Circle};
    use crate::derivatives::AutoDiff;

    #[test]
    fn classification_covers_all_types() {
        assert_eq!(classify_critical_point(&[1.0, 2.0], 1e-6), CriticalPointType::Min);
        assert_eq!(classify_critical_point(&[-1.0, -2.0], 1e-6), CriticalPointType::Max);
        assert_eq!(classify_critical_point(&[-1.0, 2.0], 1e-6), CriticalPointType::Saddle);
        assert_eq!(
            classify_critical_point(&[1e-9, 2.0], 1e-6),
            CriticalPointType::Degenerate
        );
        assert_eq!(
            classify_critical_point(&[f64::NAN, 2.0], 1e-6),
            CriticalPointType::Unknown
        );
        assert_eq!(classify_critical_point(&[], 1e-6), CriticalPointType::Unknown);
    }

    #[test]
    fn refines_isolated_minimum() {
        let f = AutoDiff::new(Bowl);
        let result = refine_critical_point(&f, &[0.3, -0.2], NewtonSettings::default())
            .expect("refinement runs");
        assert!(result.converged);
        assert_eq!(result.cp_type, CriticalPointType::Min);
        assert!(result.point.iter().all(|v| v.abs() < 1e-9));
        assert!(result.initial_gradient_norm > result.gradient_norm);
    }

    #[test]
    fn refines_onto_circle_valley_as_degenerate() {
        let f = AutoDiff::new(Circle { offset: 0.0 });
        let result = refine_critical_point(&f, &[1.1, 0.05], NewtonSettings::default())
            .expect("refinement runs");
        assert!(result.converged);
        assert_eq!(result.cp_type, CriticalPointType::Degenerate);
        let radius = (result.point[0].powi(2) + result.point[1].powi(2)).sqrt();
        assert!((radius - 1.0).abs() < 1e-6);
    }

    #[test]
    fn least_squares_step_ignores_noisy_null_direction() {
        // Null direction polluted at the level of a finite-difference stencil.
        let hessian = nalgebra::DMatrix::from_row_slice(2, 2, &[8.0, 0.0, 0.0, 1e-7]);
        let gradient = DVector::from_vec(vec![1e-3, 1e-10]);
        let step = least_squares_step(hessian, &gradient).expect("step");
        assert!((step[0] + 1.25e-4).abs() < 1e-15);
        assert!(step[1].abs() < 1e-20);
    }

    #[test]
    fn rejects_bad_input() {
        let f = AutoDiff::new(Bowl);
        let err = refine_critical_point(&f, &[0.0], NewtonSettings::default())
            .expect_err("dimension mismatch");
        assert!(matches!(
            err.downcast_ref::<ValleyError>(),
            Some(ValleyError::DimensionMismatch { expected: 2, actual: 1 })
        ));

        let settings = NewtonSettings {
            damping: 0.0,
            ..NewtonSettings::default()
        };
        let err = refine_critical_point(&f, &[0.0, 0.0], settings).expect_err("bad damping");
        assert!(format!("{err}").contains("damping"));
    }
}
