//! Valley detection and tracing exposed to JS.

use crate::objective::WasmValleyObjective;
use anyhow::Result;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use valley_core::refinement::{refine_critical_point, NewtonSettings};
use valley_core::traits::Objective;
use valley_core::valley::{
    detect_valley, run_valley_analysis, trace_valley, trace_valleys_from_critical_points,
    CandidateTable, ValleyTraceResult, ValleyWalkConfig,
};
use wasm_bindgen::prelude::*;

/// Serializable view of a valley detection.
#[derive(Debug, Serialize)]
struct DetectionSummary {
    is_valley: bool,
    dimension: usize,
    gradient_norm: f64,
    eigenvalues: Vec<f64>,
    /// One entry per tangent direction.
    tangent_basis: Vec<Vec<f64>>,
}

fn parse_config(config: JsValue) -> Result<ValleyWalkConfig, JsValue> {
    if config.is_undefined() || config.is_null() {
        return Ok(ValleyWalkConfig::default());
    }
    from_value(config).map_err(|e| JsValue::from_str(&format!("Invalid valley config: {e}")))
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
}

fn js_error(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

fn detect(
    objective: &dyn Objective,
    point: &[f64],
    config: &ValleyWalkConfig,
) -> Result<DetectionSummary> {
    let detection = detect_valley(objective, point, config)?;
    let tangent_basis = detection
        .tangent_basis
        .as_ref()
        .map(|basis| {
            basis
                .column_iter()
                .map(|col| col.iter().copied().collect())
                .collect()
        })
        .unwrap_or_default();
    Ok(DetectionSummary {
        is_valley: detection.is_valley,
        dimension: detection.dimension,
        gradient_norm: detection.gradient_norm,
        eigenvalues: detection.eigenvalues,
        tangent_basis,
    })
}

fn trace_candidates(
    objective: &dyn Objective,
    columns: Vec<String>,
    values: &[f64],
    config: &ValleyWalkConfig,
) -> Result<Vec<ValleyTraceResult>> {
    let table = CandidateTable::from_row_major(columns, values)?;
    trace_valleys_from_critical_points(objective, &table, config)
}

/// Refines each guess and traces the ones that land on degenerate points.
fn refine_and_trace(
    objective: &dyn Objective,
    guesses: &[f64],
    newton: NewtonSettings,
    config: &ValleyWalkConfig,
) -> Result<Vec<ValleyTraceResult>> {
    let dim = objective.dimension();
    if dim == 0 || guesses.len() % dim != 0 {
        anyhow::bail!(
            "Guess buffer of length {} is not a multiple of dimension {dim}.",
            guesses.len()
        );
    }
    let refined = guesses
        .chunks(dim)
        .map(|guess| refine_critical_point(objective, guess, newton))
        .collect::<Result<Vec<_>>>()?;
    run_valley_analysis(objective, &refined, config)
}

#[wasm_bindgen]
impl WasmValleyObjective {
    pub fn detect_valley(&self, point: Vec<f64>, config: JsValue) -> Result<JsValue, JsValue> {
        let config = parse_config(config)?;
        let summary = detect(self.objective.as_ref(), &point, &config).map_err(js_error)?;
        to_js(&summary)
    }

    pub fn trace_valley(&self, start: Vec<f64>, config: JsValue) -> Result<JsValue, JsValue> {
        let config = parse_config(config)?;
        let result = trace_valley(self.objective.as_ref(), &start, &config).map_err(js_error)?;
        to_js(&result)
    }

    /// Traces a row-major candidate table whose coordinate columns are `x1..xn`.
    pub fn trace_candidates(
        &self,
        columns: Vec<String>,
        values: Vec<f64>,
        config: JsValue,
    ) -> Result<JsValue, JsValue> {
        let config = parse_config(config)?;
        let traces = trace_candidates(self.objective.as_ref(), columns, &values, &config)
            .map_err(js_error)?;
        to_js(&traces)
    }

    pub fn refine_and_trace(
        &self,
        guesses: Vec<f64>,
        max_steps: u32,
        damping: f64,
        config: JsValue,
    ) -> Result<JsValue, JsValue> {
        let config = parse_config(config)?;
        let newton = NewtonSettings {
            max_steps: max_steps as usize,
            damping,
            ..NewtonSettings::default()
        };
        let traces = refine_and_trace(self.objective.as_ref(), &guesses, newton, &config)
            .map_err(js_error)?;
        to_js(&traces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::build_objective;

    fn circle() -> crate::objective::DynObjective {
        build_objective(
            "(x1^2 + x2^2 - 1)^2",
            &["x1".to_string(), "x2".to_string()],
            &[],
            Vec::new(),
            "autodiff",
        )
        .expect("objective")
    }

    #[test]
    fn detection_summary_lists_tangent_columns() {
        let f = circle();
        let summary = detect(f.as_ref(), &[0.0, 1.0], &ValleyWalkConfig::default()).expect("detect");
        assert!(summary.is_valley);
        assert_eq!(summary.tangent_basis.len(), 1);
        assert!((summary.tangent_basis[0][0].abs() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn candidate_buffer_is_split_into_rows() {
        let f = circle();
        let columns = vec!["x1".to_string(), "x2".to_string()];
        let config = ValleyWalkConfig::default().with_max_steps(5);
        let traces = trace_candidates(f.as_ref(), columns.clone(), &[1.0, 0.0, 0.2, 0.2], &config)
            .expect("trace");
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].n_points, 11);

        let err = trace_candidates(f.as_ref(), columns, &[1.0, 0.0, 0.2], &config)
            .expect_err("ragged buffer");
        assert!(format!("{err}").contains("columns"));
    }

    #[test]
    fn refined_guesses_on_the_circle_are_traced() {
        let f = circle();
        let config = ValleyWalkConfig::default().with_max_steps(5);
        // The first guess refines onto the circle, the second onto the
        // isolated maximum at the origin.
        let traces = refine_and_trace(
            f.as_ref(),
            &[1.1, 0.1, 0.01, -0.02],
            NewtonSettings::default(),
            &config,
        )
        .expect("analysis");
        assert_eq!(traces.len(), 1);
        assert!(traces[0].converged);
    }
}
