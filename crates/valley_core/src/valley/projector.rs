use nalgebra::{DMatrix, DVector};
use tracing::trace;

use super::types::ProjectionOutcome;
use crate::derivatives::symmetrize;
use crate::refinement::{least_squares_step, PSEUDO_INVERSE_RCOND};
use crate::traits::Objective;

/// Pulls `x0` back onto the zero-gradient set with Newton steps on ∇f.
///
/// Each step solves `H(x) Δx = -∇f(x)` in the least-squares sense, since the
/// Hessian is singular along the valley. Because the target is ∇f = 0 and not
/// f = 0, valleys at a nonzero objective value are handled the same way.
///
/// The last finite iterate is always returned; `converged` reports whether
/// ‖∇f‖ < tol was reached within `max_iter` steps. A non-finite `x0` (or one
/// with a non-finite gradient) is returned unchanged as not converged.
pub fn project_to_valley<O: Objective + ?Sized>(
    objective: &O,
    x0: &DVector<f64>,
    max_iter: usize,
    tol: f64,
) -> ProjectionOutcome {
    let mut x = x0.clone();
    let mut gradient = objective.gradient(x.as_slice());
    let mut gradient_norm = gradient.norm();
    let mut iterations = 0;

    if !x.iter().all(|v| v.is_finite()) || !gradient_norm.is_finite() {
        return not_converged(x, gradient_norm, iterations);
    }

    while gradient_norm >= tol {
        if iterations >= max_iter {
            return not_converged(x, gradient_norm, iterations);
        }
        let hessian = symmetrize(&objective.hessian(x.as_slice()));
        let Some(delta) = least_squares_step(hessian, &gradient) else {
            return not_converged(x, gradient_norm, iterations);
        };
        let candidate = &x + delta;
        let candidate_gradient = objective.gradient(candidate.as_slice());
        let candidate_norm = candidate_gradient.norm();
        iterations += 1;
        if !candidate.iter().all(|v| v.is_finite()) || !candidate_norm.is_finite() {
            return not_converged(x, gradient_norm, iterations);
        }
        x = candidate;
        gradient = candidate_gradient;
        gradient_norm = candidate_norm;
        trace!(iteration = iterations, gradient_norm, "newton projection step");
    }

    ProjectionOutcome {
        point: x,
        gradient_norm,
        iterations,
        converged: true,
    }
}

/// Arclength-constrained corrector.
///
/// Solves ∇f(x) = 0 together with `tangent · (x - x_pred) = 0` by Gauss-Newton
/// on the bordered system `[H; tangentᵀ] Δx = -[∇f; tangent · (x - x_pred)]`.
/// The extra row pins the correction to the hyperplane through the predictor,
/// which makes the system well-posed even though H alone is singular.
pub fn project_with_arclength<O: Objective + ?Sized>(
    objective: &O,
    x_pred: &DVector<f64>,
    tangent: &DVector<f64>,
    max_iter: usize,
    tol: f64,
) -> ProjectionOutcome {
    let dim = x_pred.len();
    let mut x = x_pred.clone();
    let mut gradient = objective.gradient(x.as_slice());
    let mut gradient_norm = gradient.norm();
    let mut iterations = 0;

    let mut constraint: f64 = 0.0;

    if !x.iter().all(|v| v.is_finite()) || !gradient_norm.is_finite() {
        return not_converged(x, gradient_norm, iterations);
    }

    while gradient_norm >= tol || constraint.abs() >= tol {
        if iterations >= max_iter {
            return not_converged(x, gradient_norm, iterations);
        }
        let hessian = symmetrize(&objective.hessian(x.as_slice()));
        if hessian.iter().any(|v| !v.is_finite()) {
            return not_converged(x, gradient_norm, iterations);
        }

        let mut a = DMatrix::zeros(dim + 1, dim);
        a.view_mut((0, 0), (dim, dim)).copy_from(&hessian);
        for j in 0..dim {
            a[(dim, j)] = tangent[j];
        }
        let mut rhs = DVector::zeros(dim + 1);
        for i in 0..dim {
            rhs[i] = -gradient[i];
        }
        rhs[dim] = -constraint;

        let svd = a.svd(true, true);
        let cutoff = PSEUDO_INVERSE_RCOND * svd.singular_values.max();
        let Ok(delta) = svd.solve(&rhs, cutoff) else {
            return not_converged(x, gradient_norm, iterations);
        };

        let candidate = &x + delta;
        let candidate_gradient = objective.gradient(candidate.as_slice());
        let candidate_norm = candidate_gradient.norm();
        iterations += 1;
        if !candidate.iter().all(|v| v.is_finite()) || !candidate_norm.is_finite() {
            return not_converged(x, gradient_norm, iterations);
        }
        constraint = tangent.dot(&(&candidate - x_pred));
        x = candidate;
        gradient = candidate_gradient;
        gradient_norm = candidate_norm;
        trace!(
            iteration = iterations,
            gradient_norm,
            constraint,
            "arclength corrector step"
        );
    }

    ProjectionOutcome {
        point: x,
        gradient_norm,
        iterations,
        converged: true,
    }
}

fn not_converged(point: DVector<f64>, gradient_norm: f64, iterations: usize) -> ProjectionOutcome {
    ProjectionOutcome {
        point,
        gradient_norm,
        iterations,
        converged: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivatives::test_functions::{Circle, Parabola};
    use crate::derivatives::{AutoDiff, FiniteDiff};
    use crate::traits::{Objective, ScalarField};

    fn radius(x: &DVector<f64>) -> f64 {
        x.norm()
    }

    #[test]
    fn projection_is_near_idempotent_on_the_manifold() {
        let f = AutoDiff::new(Circle { offset: 0.0 });
        let start = DVector::from_vec(vec![1.0, 0.0]);
        let outcome = project_to_valley(&f, &start, 20, 1e-10);
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 0);
        assert!((&outcome.point - &start).norm() < 1e-10);
    }

    #[test]
    fn projection_pulls_perturbed_point_onto_circle() {
        let f = AutoDiff::new(Circle { offset: 0.0 });
        let start = DVector::from_vec(vec![1.08, 0.1]);
        let outcome = project_to_valley(&f, &start, 20, 1e-10);
        assert!(outcome.converged);
        assert!(outcome.gradient_norm < 1e-10);
        assert!((radius(&outcome.point) - 1.0).abs() < 1e-8);
    }

    #[test]
    fn projection_converges_on_offset_valley() {
        let f = AutoDiff::new(Circle { offset: 0.01 });
        let start = DVector::from_vec(vec![0.7, 0.8]);
        let outcome = project_to_valley(&f, &start, 20, 1e-10);
        assert!(outcome.converged, "gradient norm {}", outcome.gradient_norm);
        assert!((radius(&outcome.point) - 1.0).abs() < 1e-8);
        // The valley floor sits at f = 0.01, so f itself never reaches zero.
        let value = f.value(outcome.point.as_slice());
        assert!((value - 0.01).abs() < 1e-12);
    }

    #[test]
    fn finite_difference_projection_reaches_default_tolerance() {
        for offset in [0.0, 0.01] {
            let f = FiniteDiff::new(Circle { offset });
            let start = DVector::from_vec(vec![1.0, 0.01]);
            let outcome = project_to_valley(&f, &start, 20, 1e-10);
            assert!(outcome.converged, "gradient norm {}", outcome.gradient_norm);
            assert!((radius(&outcome.point) - 1.0).abs() < 1e-8);
        }
    }

    #[test]
    fn non_convergence_is_reported_not_raised() {
        let f = AutoDiff::new(Circle { offset: 0.0 });
        let start = DVector::from_vec(vec![1.5, 0.5]);
        let outcome = project_to_valley(&f, &start, 1, 1e-14);
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.point.iter().all(|v| v.is_finite()));
    }

    struct Blowup;

    impl<T: crate::traits::Scalar> ScalarField<T> for Blowup {
        fn dimension(&self) -> usize {
            1
        }

        fn evaluate(&self, x: &[T]) -> T {
            // x^(3/2): the first Newton step on the gradient lands at -x0,
            // where the objective is undefined.
            x[0] * x[0].sqrt()
        }
    }

    #[test]
    fn non_finite_iterates_end_projection_as_not_converged() {
        let f = AutoDiff::new(Blowup);
        let start = DVector::from_vec(vec![0.5]);
        let outcome = project_to_valley(&f, &start, 10, 1e-10);
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.point[0], 0.5);
    }

    #[test]
    fn non_finite_start_is_passed_through() {
        let f = AutoDiff::new(Circle { offset: 0.0 });
        let start = DVector::from_vec(vec![f64::NAN, 0.0]);
        let outcome = project_to_valley(&f, &start, 20, 1e-10);
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 0);
        assert!(outcome.point[0].is_nan());
        let tangent = DVector::from_vec(vec![0.0, 1.0]);
        let outcome = project_with_arclength(&f, &start, &tangent, 20, 1e-10);
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 0);
    }

    #[test]
    fn arclength_corrector_stays_on_predictor_hyperplane() {
        let f = AutoDiff::new(Circle { offset: 0.0 });
        let tangent = DVector::from_vec(vec![0.0, 1.0]);
        let x_pred = DVector::from_vec(vec![1.0, 0.05]);
        let outcome = project_with_arclength(&f, &x_pred, &tangent, 20, 1e-10);
        assert!(outcome.converged);
        assert!((outcome.point[1] - 0.05).abs() < 1e-10);
        assert!((radius(&outcome.point) - 1.0).abs() < 1e-8);
    }

    #[test]
    fn arclength_corrector_handles_parabola_valley() {
        let f = AutoDiff::new(Parabola);
        let tangent = DVector::from_vec(vec![0.0, 1.0]);
        let x_pred = DVector::from_vec(vec![0.0, 0.1]);
        let outcome = project_with_arclength(&f, &x_pred, &tangent, 20, 1e-10);
        assert!(outcome.converged);
        assert!((outcome.point[0] - outcome.point[1].powi(2)).abs() < 1e-9);
    }
}
