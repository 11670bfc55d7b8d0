//! The `valley_core` crate finds and follows valleys: connected sets of
//! degenerate critical points where ∇f = 0 and the Hessian has near-zero
//! eigenvalues along the set.
//!
//! Key components:
//! - **Traits**: `Scalar` (numeric type abstraction), `ScalarField` (generic objective body), `Objective` (value, gradient, Hessian).
//! - **Derivatives**: `AutoDiff` (dual and hyper-dual numbers) and `FiniteDiff` providers.
//! - **Equation Engine**: A bytecode VM for user-supplied objective expressions.
//! - **Valley**: detection, Newton projection, tangent tracking, walking and batch tracing.
//! - **Refinement**: Newton refinement and classification of candidate critical points.

pub mod autodiff;
pub mod derivatives;
pub mod equation_engine;
pub mod error;
pub mod refinement;
pub mod traits;
pub mod valley;

pub use derivatives::{AutoDiff, FiniteDiff};
pub use error::ValleyError;
pub use refinement::{
    classify_critical_point, refine_critical_point, CriticalPointRefinementResult,
    CriticalPointType, NewtonSettings,
};
pub use traits::{Objective, Scalar, ScalarField};
pub use valley::{
    detect_valley, run_valley_analysis, trace_valley, trace_valleys_from_critical_points,
    CandidateTable, ValleyTraceResult, ValleyWalkConfig, WalkMethod,
};
