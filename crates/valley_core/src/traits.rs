use nalgebra::{DMatrix, DVector};
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in objective evaluation.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A scalar field f: R^n -> R, evaluated generically so the same body runs on
/// plain floats and on dual numbers.
pub trait ScalarField<T: Scalar> {
    /// Returns the dimension of the input space.
    fn dimension(&self) -> usize;

    /// Evaluates f(x).
    fn evaluate(&self, x: &[T]) -> T;
}

/// Twice-differentiable objective as consumed by the valley core.
///
/// Implementations decide how derivatives are obtained (see
/// [`crate::derivatives::AutoDiff`] and [`crate::derivatives::FiniteDiff`]).
/// The Hessian must be returned symmetric.
pub trait Objective {
    fn dimension(&self) -> usize;

    fn value(&self, x: &[f64]) -> f64;

    fn gradient(&self, x: &[f64]) -> DVector<f64>;

    fn hessian(&self, x: &[f64]) -> DMatrix<f64>;
}

impl<O: Objective + ?Sized> Objective for &O {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn value(&self, x: &[f64]) -> f64 {
        (**self).value(x)
    }

    fn gradient(&self, x: &[f64]) -> DVector<f64> {
        (**self).gradient(x)
    }

    fn hessian(&self, x: &[f64]) -> DMatrix<f64> {
        (**self).hessian(x)
    }
}

impl<O: Objective + ?Sized> Objective for Box<O> {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn value(&self, x: &[f64]) -> f64 {
        (**self).value(x)
    }

    fn gradient(&self, x: &[f64]) -> DVector<f64> {
        (**self).gradient(x)
    }

    fn hessian(&self, x: &[f64]) -> DMatrix<f64> {
        (**self).hessian(x)
    }
}
