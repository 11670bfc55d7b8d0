//! Detection and bidirectional walking of degenerate critical manifolds.
pub mod candidates;
pub mod detector;
pub mod projector;
pub mod tangent;
pub mod trace;
pub mod types;
pub mod walker;

pub use candidates::{default_coordinate_columns, CandidatePoint, CandidateTable, CoordinateAccessor};
pub use detector::detect_valley;
pub use projector::{project_to_valley, project_with_arclength};
pub use tangent::get_valley_tangent;
#[cfg(feature = "parallel")]
pub use trace::{par_run_valley_analysis, par_trace_valleys_from_critical_points};
pub use trace::{
    run_valley_analysis, trace_valley, trace_valleys_from_critical_points,
    trace_valleys_with_columns,
};
pub use types::{
    ProjectionOutcome, ValleyDetection, ValleyTraceResult, ValleyWalk, ValleyWalkConfig,
    WalkMethod, WalkTermination,
};
pub use walker::walk;
