//! Core types for valley walking.

use crate::error::ValleyError;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Corrector used by the walker after each predictor step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WalkMethod {
    /// Newton projection onto ∇f = 0 from the predicted point.
    #[default]
    NewtonProjection,
    /// Newton projection constrained to the hyperplane through the
    /// predicted point orthogonal to the current tangent.
    PredictorCorrector,
}

impl WalkMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            WalkMethod::NewtonProjection => "newton_projection",
            WalkMethod::PredictorCorrector => "predictor_corrector",
        }
    }
}

impl FromStr for WalkMethod {
    type Err = ValleyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newton_projection" => Ok(WalkMethod::NewtonProjection),
            "predictor_corrector" => Ok(WalkMethod::PredictorCorrector),
            other => Err(ValleyError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for WalkMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings controlling valley detection and walking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValleyWalkConfig {
    pub gradient_tolerance: f64,
    pub eigenvalue_threshold: f64,
    pub initial_step_size: f64,
    pub max_steps: usize,
    pub max_projection_iter: usize,
    pub projection_tol: f64,
    pub method: WalkMethod,
}

impl Default for ValleyWalkConfig {
    fn default() -> Self {
        Self {
            gradient_tolerance: 1e-6,
            eigenvalue_threshold: 1e-4,
            initial_step_size: 0.01,
            max_steps: 100,
            max_projection_iter: 20,
            projection_tol: 1e-10,
            method: WalkMethod::NewtonProjection,
        }
    }
}

impl ValleyWalkConfig {
    pub fn with_method(self, method: WalkMethod) -> Self {
        Self { method, ..self }
    }

    pub fn with_step_size(self, initial_step_size: f64) -> Self {
        Self {
            initial_step_size,
            ..self
        }
    }

    pub fn with_max_steps(self, max_steps: usize) -> Self {
        Self { max_steps, ..self }
    }

    pub fn with_tolerances(self, gradient_tolerance: f64, projection_tol: f64) -> Self {
        Self {
            gradient_tolerance,
            projection_tol,
            ..self
        }
    }

    pub fn with_eigenvalue_threshold(self, eigenvalue_threshold: f64) -> Self {
        Self {
            eigenvalue_threshold,
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), ValleyError> {
        let positive = [
            ("gradient_tolerance", self.gradient_tolerance),
            ("eigenvalue_threshold", self.eigenvalue_threshold),
            ("initial_step_size", self.initial_step_size),
            ("projection_tol", self.projection_tol),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ValleyError::InvalidConfig(format!(
                    "{name} must be positive and finite (got {value})."
                )));
            }
        }
        if self.max_steps == 0 {
            return Err(ValleyError::InvalidConfig(
                "max_steps must be greater than zero.".to_string(),
            ));
        }
        if self.max_projection_iter == 0 {
            return Err(ValleyError::InvalidConfig(
                "max_projection_iter must be greater than zero.".to_string(),
            ));
        }
        if self.projection_tol > self.gradient_tolerance {
            return Err(ValleyError::InvalidConfig(format!(
                "projection_tol ({}) must not exceed gradient_tolerance ({}).",
                self.projection_tol, self.gradient_tolerance
            )));
        }
        Ok(())
    }
}

/// Outcome of [`super::detect_valley`].
#[derive(Debug, Clone)]
pub struct ValleyDetection {
    pub is_valley: bool,
    /// Orthonormal eigenvectors of the near-zero eigenvalues, one per column,
    /// ordered by increasing |λ|. `None` when the point is not a valley.
    pub tangent_basis: Option<DMatrix<f64>>,
    pub dimension: usize,
    pub gradient_norm: f64,
    /// Hessian eigenvalues, empty when the gradient check failed.
    pub eigenvalues: Vec<f64>,
}

impl ValleyDetection {
    pub(crate) fn rejected(gradient_norm: f64, eigenvalues: Vec<f64>) -> Self {
        Self {
            is_valley: false,
            tangent_basis: None,
            dimension: 0,
            gradient_norm,
            eigenvalues,
        }
    }

    /// First tangent direction (smallest |λ|), if any.
    pub fn primary_tangent(&self) -> Option<DVector<f64>> {
        self.tangent_basis
            .as_ref()
            .filter(|basis| basis.ncols() > 0)
            .map(|basis| basis.column(0).into_owned())
    }
}

/// Result of a Newton-type correction onto ∇f = 0.
#[derive(Debug, Clone)]
pub struct ProjectionOutcome {
    /// Last finite iterate, or the input unchanged when it was not finite.
    pub point: DVector<f64>,
    pub gradient_norm: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Why a walk in one direction stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkTermination {
    /// The walk was never started because the start point is not a valley.
    NotStarted,
    /// `max_steps` points were accepted.
    MaxSteps,
    /// The corrector did not reach the gradient tolerance.
    ProjectionFailed,
    /// No near-zero Hessian eigenvalue remained at the corrected point.
    LeftManifold,
}

/// Points accepted by one walk direction, with the tangent used after each.
#[derive(Debug, Clone)]
pub struct ValleyWalk {
    pub points: Vec<DVector<f64>>,
    pub tangents: Vec<DVector<f64>>,
    pub termination: WalkTermination,
}

/// Bidirectional trace of a valley from a start point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValleyTraceResult {
    pub start_point: Vec<f64>,
    pub path_positive: Vec<Vec<f64>>,
    pub path_negative: Vec<Vec<f64>>,
    pub arc_length: f64,
    /// Distinct points on the traced curve, start point included.
    pub n_points: usize,
    pub valley_dimension: usize,
    pub method: WalkMethod,
    /// True iff the start point was confirmed to lie on a valley.
    pub converged: bool,
    pub termination_positive: WalkTermination,
    pub termination_negative: WalkTermination,
}

impl ValleyTraceResult {
    /// All traced points ordered along the curve: negative path reversed,
    /// start point, positive path.
    pub fn ordered_points(&self) -> Vec<Vec<f64>> {
        let mut points: Vec<Vec<f64>> = self.path_negative.iter().rev().cloned().collect();
        points.push(self.start_point.clone());
        points.extend(self.path_positive.iter().cloned());
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_tags_round_trip() {
        for method in [WalkMethod::NewtonProjection, WalkMethod::PredictorCorrector] {
            assert_eq!(method.as_str().parse::<WalkMethod>(), Ok(method));
        }
        assert_eq!(
            "arclength".parse::<WalkMethod>(),
            Err(ValleyError::UnknownMethod("arclength".to_string()))
        );
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ValleyWalkConfig =
            serde_json::from_str(r#"{"initial_step_size": 0.05, "method": "predictor_corrector"}"#)
                .expect("partial config");
        assert_eq!(config.initial_step_size, 0.05);
        assert_eq!(config.method, WalkMethod::PredictorCorrector);
        assert_eq!(config.max_steps, ValleyWalkConfig::default().max_steps);
        assert!(config.validate().is_ok());

        let unknown = serde_json::from_str::<ValleyWalkConfig>(r#"{"method": "bogus"}"#);
        assert!(unknown.is_err());
    }

    #[test]
    fn validate_rejects_inconsistent_settings() {
        let base = ValleyWalkConfig::default();
        assert!(base.validate().is_ok());
        assert!(base.with_step_size(0.0).validate().is_err());
        assert!(base.with_max_steps(0).validate().is_err());
        assert!(base.with_eigenvalue_threshold(f64::NAN).validate().is_err());
        let err = base.with_tolerances(1e-8, 1e-6).validate().unwrap_err();
        assert!(format!("{err}").contains("projection_tol"));
    }

    #[test]
    fn ordered_points_joins_both_paths_through_start() {
        let result = ValleyTraceResult {
            start_point: vec![0.0],
            path_positive: vec![vec![1.0], vec![2.0]],
            path_negative: vec![vec![-1.0], vec![-2.0]],
            arc_length: 4.0,
            n_points: 5,
            valley_dimension: 1,
            method: WalkMethod::NewtonProjection,
            converged: true,
            termination_positive: WalkTermination::MaxSteps,
            termination_negative: WalkTermination::MaxSteps,
        };
        let ordered: Vec<f64> = result.ordered_points().into_iter().map(|p| p[0]).collect();
        assert_eq!(ordered, vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
    }
}
