//! Differentiation providers.
//!
//! Both providers wrap a [`ScalarField`] and expose it as an [`Objective`],
//! so the valley core never needs hand-written derivatives.

use crate::autodiff::{Dual, HyperDual};
use crate::traits::{Objective, ScalarField};
use nalgebra::{DMatrix, DVector};

const FD_GRADIENT_STEP: f64 = 6.0e-6;
const FD_HESSIAN_STEP: f64 = 1.0e-4;

/// Forward-mode automatic differentiation.
///
/// The gradient costs `n` evaluations on [`Dual`]; the Hessian costs
/// `n (n + 1) / 2` evaluations on [`HyperDual`] and is exact up to rounding.
#[derive(Debug, Clone)]
pub struct AutoDiff<F> {
    field: F,
}

impl<F> AutoDiff<F> {
    pub fn new(field: F) -> Self {
        Self { field }
    }

    pub fn inner(&self) -> &F {
        &self.field
    }
}

impl<F> Objective for AutoDiff<F>
where
    F: ScalarField<f64> + ScalarField<Dual> + ScalarField<HyperDual>,
{
    fn dimension(&self) -> usize {
        <F as ScalarField<f64>>::dimension(&self.field)
    }

    fn value(&self, x: &[f64]) -> f64 {
        <F as ScalarField<f64>>::evaluate(&self.field, x)
    }

    fn gradient(&self, x: &[f64]) -> DVector<f64> {
        let n = x.len();
        let mut grad = DVector::zeros(n);
        let mut dual_x: Vec<Dual> = x.iter().map(|&v| Dual::new(v, 0.0)).collect();
        for j in 0..n {
            dual_x[j].eps = 1.0;
            grad[j] = <F as ScalarField<Dual>>::evaluate(&self.field, &dual_x).eps;
            dual_x[j].eps = 0.0;
        }
        grad
    }

    fn hessian(&self, x: &[f64]) -> DMatrix<f64> {
        let n = x.len();
        let mut hess = DMatrix::zeros(n, n);
        let mut hd_x: Vec<HyperDual> = x
            .iter()
            .map(|&v| HyperDual::new(v, 0.0, 0.0, 0.0))
            .collect();
        for i in 0..n {
            for j in i..n {
                hd_x[i].e1 = 1.0;
                hd_x[j].e2 = 1.0;
                let d2 = <F as ScalarField<HyperDual>>::evaluate(&self.field, &hd_x).e12;
                hd_x[i].e1 = 0.0;
                hd_x[j].e2 = 0.0;
                hess[(i, j)] = d2;
                hess[(j, i)] = d2;
            }
        }
        hess
    }
}

/// Central finite differences with steps scaled by `1 + |x_i|`.
#[derive(Debug, Clone)]
pub struct FiniteDiff<F> {
    field: F,
    gradient_step: f64,
    hessian_step: f64,
}

impl<F> FiniteDiff<F> {
    pub fn new(field: F) -> Self {
        Self {
            field,
            gradient_step: FD_GRADIENT_STEP,
            hessian_step: FD_HESSIAN_STEP,
        }
    }

    pub fn with_steps(field: F, gradient_step: f64, hessian_step: f64) -> Self {
        Self {
            field,
            gradient_step,
            hessian_step,
        }
    }

    pub fn inner(&self) -> &F {
        &self.field
    }
}

impl<F: ScalarField<f64>> Objective for FiniteDiff<F> {
    fn dimension(&self) -> usize {
        self.field.dimension()
    }

    fn value(&self, x: &[f64]) -> f64 {
        self.field.evaluate(x)
    }

    fn gradient(&self, x: &[f64]) -> DVector<f64> {
        let n = x.len();
        let mut grad = DVector::zeros(n);
        let mut probe = x.to_vec();
        for i in 0..n {
            let h = self.gradient_step * (1.0 + x[i].abs());
            probe[i] = x[i] + h;
            let plus = self.field.evaluate(&probe);
            probe[i] = x[i] - h;
            let minus = self.field.evaluate(&probe);
            probe[i] = x[i];
            grad[i] = (plus - minus) / (2.0 * h);
        }
        grad
    }

    fn hessian(&self, x: &[f64]) -> DMatrix<f64> {
        let n = x.len();
        let steps: Vec<f64> = x
            .iter()
            .map(|v| self.hessian_step * (1.0 + v.abs()))
            .collect();
        let f0 = self.field.evaluate(x);
        let mut hess = DMatrix::zeros(n, n);
        let mut probe = x.to_vec();

        for i in 0..n {
            let hi = steps[i];
            probe[i] = x[i] + hi;
            let plus = self.field.evaluate(&probe);
            probe[i] = x[i] - hi;
            let minus = self.field.evaluate(&probe);
            probe[i] = x[i];
            hess[(i, i)] = (plus - 2.0 * f0 + minus) / (hi * hi);

            for j in (i + 1)..n {
                let hj = steps[j];
                let mut corner = |si: f64, sj: f64| {
                    probe[i] = x[i] + si * hi;
                    probe[j] = x[j] + sj * hj;
                    let value = self.field.evaluate(&probe);
                    probe[i] = x[i];
                    probe[j] = x[j];
                    value
                };
                let pp = corner(1.0, 1.0);
                let pm = corner(1.0, -1.0);
                let mp = corner(-1.0, 1.0);
                let mm = corner(-1.0, -1.0);
                let value = (pp - pm - mp + mm) / (4.0 * hi * hj);
                hess[(i, j)] = value;
                hess[(j, i)] = value;
            }
        }
        hess
    }
}

/// Returns `(H + Hᵀ) / 2`.
pub fn symmetrize(hessian: &DMatrix<f64>) -> DMatrix<f64> {
    (hessian + hessian.transpose()) * 0.5
}

#[cfg(test)]
pub(crate) mod test_functions {
    //! Objectives shared by the unit tests across the crate.

    use crate::traits::{ScalarField, Scalar};

    /// (x1^2 + x2^2 - 1)^2 + offset: a circle of critical points at height `offset`.
    pub struct Circle {
        pub offset: f64,
    }

    impl<T: Scalar> ScalarField<T> for Circle {
        fn dimension(&self) -> usize {
            2
        }

        fn evaluate(&self, x: &[T]) -> T {
            let r = x[0] * x[0] + x[1] * x[1] - T::one();
            r * r + T::from_f64(self.offset).unwrap()
        }
    }

    /// x1^2 + x2^2: isolated minimum at the origin.
    pub struct Bowl;

    impl<T: Scalar> ScalarField<T> for Bowl {
        fn dimension(&self) -> usize {
            2
        }

        fn evaluate(&self, x: &[T]) -> T {
            x[0] * x[0] + x[1] * x[1]
        }
    }

    /// (x1 - x2^2)^2: a parabola-shaped valley y = x^2 in (x2, x1) coordinates.
    pub struct Parabola;

    impl<T: Scalar> ScalarField<T> for Parabola {
        fn dimension(&self) -> usize {
            2
        }

        fn evaluate(&self, x: &[T]) -> T {
            let r = x[0] - x[1] * x[1];
            r * r
        }
    }

    /// (x1^2 + x2^2 + x3^2 - 1)^2: a two-dimensional sphere of critical points.
    pub struct Sphere;

    impl<T: Scalar> ScalarField<T> for Sphere {
        fn dimension(&self) -> usize {
            3
        }

        fn evaluate(&self, x: &[T]) -> T {
            let r = x[0] * x[0] + x[1] * x[1] + x[2] * x[2] - T::one();
            r * r
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_functions::{Circle, Parabola};
    use super::*;

    #[test]
    fn autodiff_gradient_matches_closed_form() {
        let f = AutoDiff::new(Circle { offset: 0.0 });
        let x = [0.6, 0.9];
        let r = x[0] * x[0] + x[1] * x[1] - 1.0;
        let grad = f.gradient(&x);
        assert!((grad[0] - 4.0 * r * x[0]).abs() < 1e-12);
        assert!((grad[1] - 4.0 * r * x[1]).abs() < 1e-12);
    }

    #[test]
    fn autodiff_hessian_matches_closed_form() {
        let f = AutoDiff::new(Circle { offset: 0.0 });
        let x = [0.6, 0.9];
        let r = x[0] * x[0] + x[1] * x[1] - 1.0;
        let hess = f.hessian(&x);
        for i in 0..2 {
            for j in 0..2 {
                let delta = if i == j { 1.0 } else { 0.0 };
                let expected = 8.0 * x[i] * x[j] + 4.0 * r * delta;
                assert!(
                    (hess[(i, j)] - expected).abs() < 1e-12,
                    "H[{i},{j}] = {} expected {expected}",
                    hess[(i, j)]
                );
            }
        }
    }

    #[test]
    fn finite_differences_agree_with_autodiff() {
        let ad = AutoDiff::new(Parabola);
        let fd = FiniteDiff::new(Parabola);
        let x = [0.3, -0.7];
        let grad_err = (ad.gradient(&x) - fd.gradient(&x)).norm();
        let hess_err = (ad.hessian(&x) - fd.hessian(&x)).norm();
        assert!(grad_err < 1e-7, "gradient error {grad_err}");
        assert!(hess_err < 1e-5, "hessian error {hess_err}");
        assert!((ad.value(&x) - fd.value(&x)).abs() < 1e-15);
    }

    #[test]
    fn finite_difference_hessian_is_symmetric() {
        let fd = FiniteDiff::new(Circle { offset: 0.0 });
        let hess = fd.hessian(&[0.2, 1.1]);
        assert_eq!(hess[(0, 1)], hess[(1, 0)]);
        assert_eq!(symmetrize(&hess), hess);
    }
}
