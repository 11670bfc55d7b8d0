use anyhow::{Context, Result};
use nalgebra::DVector;
use tracing::{debug, info};

use super::candidates::{default_coordinate_columns, CandidateTable};
use super::detector::detect_valley;
use super::types::{ValleyTraceResult, ValleyWalkConfig, WalkTermination};
use super::walker::walk;
use crate::error::ensure_dimension;
use crate::refinement::{CriticalPointRefinementResult, CriticalPointType};
use crate::traits::Objective;

/// Traces the valley through `start` in both tangent directions.
///
/// A start point that is not on a valley yields `converged = false` with empty
/// paths and `n_points = 1`; only invalid configuration or a dimension
/// mismatch is an error.
pub fn trace_valley<O: Objective + ?Sized>(
    objective: &O,
    start: &[f64],
    config: &ValleyWalkConfig,
) -> Result<ValleyTraceResult> {
    config.validate()?;
    ensure_dimension(objective.dimension(), start.len())?;

    let detection = detect_valley(objective, start, config)?;
    let Some(t0) = detection.primary_tangent().filter(|_| detection.is_valley) else {
        debug!(
            gradient_norm = detection.gradient_norm,
            "start point is not on a valley"
        );
        return Ok(not_a_valley(start, config));
    };

    let origin = DVector::from_column_slice(start);
    let positive = walk(objective, &origin, &t0, config).context("positive walk")?;
    let negative = walk(objective, &origin, &(-&t0), config).context("negative walk")?;

    let arc_length =
        path_length(&origin, &positive.points) + path_length(&origin, &negative.points);
    let to_vecs = |points: &[DVector<f64>]| -> Vec<Vec<f64>> {
        points.iter().map(|p| p.iter().copied().collect()).collect()
    };

    let result = ValleyTraceResult {
        start_point: start.to_vec(),
        n_points: 1 + positive.points.len() + negative.points.len(),
        path_positive: to_vecs(&positive.points),
        path_negative: to_vecs(&negative.points),
        arc_length,
        valley_dimension: detection.dimension,
        method: config.method,
        converged: true,
        termination_positive: positive.termination,
        termination_negative: negative.termination,
    };
    info!(
        method = %result.method,
        valley_dimension = result.valley_dimension,
        n_points = result.n_points,
        arc_length = result.arc_length,
        "valley traced"
    );
    Ok(result)
}

fn not_a_valley(start: &[f64], config: &ValleyWalkConfig) -> ValleyTraceResult {
    ValleyTraceResult {
        start_point: start.to_vec(),
        path_positive: Vec::new(),
        path_negative: Vec::new(),
        arc_length: 0.0,
        n_points: 1,
        valley_dimension: 0,
        method: config.method,
        converged: false,
        termination_positive: WalkTermination::NotStarted,
        termination_negative: WalkTermination::NotStarted,
    }
}

/// Polyline length from `origin` through `points` in order.
fn path_length(origin: &DVector<f64>, points: &[DVector<f64>]) -> f64 {
    let mut previous = origin;
    let mut length = 0.0;
    for point in points {
        length += (point - previous).norm();
        previous = point;
    }
    length
}

/// Traces every row of `table` using the coordinate columns `x1..xn`.
///
/// Rows that are not valley points are dropped from the result.
pub fn trace_valleys_from_critical_points<O: Objective + ?Sized>(
    objective: &O,
    table: &CandidateTable,
    config: &ValleyWalkConfig,
) -> Result<Vec<ValleyTraceResult>> {
    let columns = default_coordinate_columns(objective.dimension());
    trace_valleys_with_columns(objective, table, &columns, config)
}

/// Like [`trace_valleys_from_critical_points`] with explicit coordinate columns.
pub fn trace_valleys_with_columns<O: Objective + ?Sized>(
    objective: &O,
    table: &CandidateTable,
    columns: &[String],
    config: &ValleyWalkConfig,
) -> Result<Vec<ValleyTraceResult>> {
    let starts = batch_starts(objective, table, columns, config)?;
    let mut traces = Vec::new();
    for (row, start) in starts.iter().enumerate() {
        let trace = trace_valley(objective, start, config)
            .with_context(|| format!("Failed to trace candidate row {row}"))?;
        keep_valley(row, trace, &mut traces);
    }
    Ok(traces)
}

/// Traces the refinement results classified as degenerate.
///
/// Every degenerate result yields one trace, in input order, including those
/// whose point turns out not to be a valley under `config`.
pub fn run_valley_analysis<O: Objective + ?Sized>(
    objective: &O,
    refinement_results: &[CriticalPointRefinementResult],
    config: &ValleyWalkConfig,
) -> Result<Vec<ValleyTraceResult>> {
    config.validate()?;
    degenerate_points(refinement_results)
        .map(|(idx, point)| {
            trace_valley(objective, point, config)
                .with_context(|| format!("Failed to trace refinement result {idx}"))
        })
        .collect()
}

fn batch_starts<O: Objective + ?Sized>(
    objective: &O,
    table: &CandidateTable,
    columns: &[String],
    config: &ValleyWalkConfig,
) -> Result<Vec<Vec<f64>>> {
    config.validate()?;
    ensure_dimension(objective.dimension(), columns.len())?;
    let accessor = table.coordinate_accessor(columns)?;
    Ok(accessor.points().map(|p| p.coordinates).collect())
}

fn keep_valley(row: usize, trace: ValleyTraceResult, traces: &mut Vec<ValleyTraceResult>) {
    if trace.converged {
        traces.push(trace);
    } else {
        debug!(row, "candidate row is not a valley point, skipping");
    }
}

fn degenerate_points(
    results: &[CriticalPointRefinementResult],
) -> impl Iterator<Item = (usize, &[f64])> + '_ {
    results.iter().enumerate().filter_map(|(idx, r)| {
        if r.cp_type == CriticalPointType::Degenerate {
            Some((idx, r.point.as_slice()))
        } else {
            debug!(index = idx, cp_type = ?r.cp_type, "skipping non-degenerate result");
            None
        }
    })
}

/// Parallel [`trace_valleys_from_critical_points`]; identical output.
#[cfg(feature = "parallel")]
pub fn par_trace_valleys_from_critical_points<O: Objective + Sync + ?Sized>(
    objective: &O,
    table: &CandidateTable,
    config: &ValleyWalkConfig,
) -> Result<Vec<ValleyTraceResult>> {
    use rayon::prelude::*;

    let columns = default_coordinate_columns(objective.dimension());
    let starts = batch_starts(objective, table, &columns, config)?;
    let results: Vec<ValleyTraceResult> = starts
        .par_iter()
        .enumerate()
        .map(|(row, start)| {
            trace_valley(objective, start, config)
                .with_context(|| format!("Failed to trace candidate row {row}"))
        })
        .collect::<Result<_>>()?;

    let mut traces = Vec::new();
    for (row, trace) in results.into_iter().enumerate() {
        keep_valley(row, trace, &mut traces);
    }
    Ok(traces)
}

/// Parallel [`run_valley_analysis`]; identical output.
#[cfg(feature = "parallel")]
pub fn par_run_valley_analysis<O: Objective + Sync + ?Sized>(
    objective: &O,
    refinement_results: &[CriticalPointRefinementResult],
    config: &ValleyWalkConfig,
) -> Result<Vec<ValleyTraceResult>> {
    use rayon::prelude::*;

    config.validate()?;
    let points: Vec<(usize, &[f64])> = degenerate_points(refinement_results).collect();
    points
        .par_iter()
        .map(|&(idx, point)| {
            trace_valley(objective, point, config)
                .with_context(|| format!("Failed to trace refinement result {idx}"))
        })
        .collect()
}
