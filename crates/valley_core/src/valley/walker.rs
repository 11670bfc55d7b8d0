use anyhow::{bail, Result};
use nalgebra::DVector;
use tracing::debug;

use super::projector::{project_to_valley, project_with_arclength};
use super::tangent::get_valley_tangent;
use super::types::{ProjectionOutcome, ValleyWalk, ValleyWalkConfig, WalkMethod, WalkTermination};
use crate::error::ensure_dimension;
use crate::traits::Objective;

impl WalkMethod {
    /// Corrects the predicted point `x_pred` back onto the valley.
    fn correct<O: Objective + ?Sized>(
        self,
        objective: &O,
        x_pred: &DVector<f64>,
        tangent: &DVector<f64>,
        config: &ValleyWalkConfig,
    ) -> ProjectionOutcome {
        match self {
            WalkMethod::NewtonProjection => project_to_valley(
                objective,
                x_pred,
                config.max_projection_iter,
                config.projection_tol,
            ),
            WalkMethod::PredictorCorrector => project_with_arclength(
                objective,
                x_pred,
                tangent,
                config.max_projection_iter,
                config.projection_tol,
            ),
        }
    }
}

/// Walks along the valley from `start` in `direction` with fixed steps.
///
/// Each step predicts `x + h t`, corrects with the configured method and
/// re-estimates the tangent. The walk stops at `max_steps` points, when the
/// corrector fails to converge, or when the valley ends; the points accepted
/// up to that moment are returned. `start` itself is not part of the result
/// and must be finite.
pub fn walk<O: Objective + ?Sized>(
    objective: &O,
    start: &DVector<f64>,
    direction: &DVector<f64>,
    config: &ValleyWalkConfig,
) -> Result<ValleyWalk> {
    let dim = objective.dimension();
    ensure_dimension(dim, start.len())?;
    ensure_dimension(dim, direction.len())?;
    if !start.iter().all(|v| v.is_finite()) {
        bail!("Walk start point must be finite.");
    }
    let direction_norm = direction.norm();
    if direction_norm == 0.0 || !direction_norm.is_finite() {
        bail!("Walk direction must be a nonzero finite vector.");
    }

    let step = config.initial_step_size;
    let mut x_current = start.clone();
    let mut t_current = direction / direction_norm;
    let mut points = Vec::new();
    let mut tangents = Vec::new();
    let mut termination = WalkTermination::MaxSteps;

    for _step in 0..config.max_steps {
        // Predictor
        let x_pred = &x_current + &t_current * step;

        // Corrector
        let corrected = config.method.correct(objective, &x_pred, &t_current, config);
        if !corrected.converged || corrected.gradient_norm >= config.gradient_tolerance {
            termination = WalkTermination::ProjectionFailed;
            break;
        }

        let Some(t_next) = get_valley_tangent(objective, &corrected.point, &t_current, config)
        else {
            termination = WalkTermination::LeftManifold;
            break;
        };

        points.push(corrected.point.clone());
        tangents.push(t_next.clone());
        x_current = corrected.point;
        t_current = t_next;
    }

    debug!(
        method = %config.method,
        points = points.len(),
        ?termination,
        "valley walk finished"
    );

    Ok(ValleyWalk {
        points,
        tangents,
        termination,
    })
}
