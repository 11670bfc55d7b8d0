//! Objective construction from user expressions.

use anyhow::{bail, Result};
use valley_core::derivatives::{AutoDiff, FiniteDiff};
use valley_core::equation_engine::ExpressionObjective;
use valley_core::traits::Objective;
use wasm_bindgen::prelude::*;

pub(crate) type DynObjective = Box<dyn Objective + Send + Sync>;

#[wasm_bindgen]
pub struct WasmValleyObjective {
    pub(crate) objective: DynObjective,
    pub(crate) var_names: Vec<String>,
}

pub(crate) fn build_objective(
    expression: &str,
    var_names: &[String],
    param_names: &[String],
    params: Vec<f64>,
    differentiation: &str,
) -> Result<DynObjective> {
    let field = ExpressionObjective::compile(expression, var_names, param_names, params)?;
    let objective: DynObjective = match differentiation {
        "autodiff" => Box::new(AutoDiff::new(field)),
        "finite_difference" => Box::new(FiniteDiff::new(field)),
        other => bail!(
            "Unknown differentiation method \"{other}\" (expected autodiff or finite_difference)."
        ),
    };
    Ok(objective)
}

#[wasm_bindgen]
impl WasmValleyObjective {
    #[wasm_bindgen(constructor)]
    pub fn new(
        expression: String,
        var_names: Vec<String>,
        param_names: Vec<String>,
        params: Vec<f64>,
        differentiation: &str,
    ) -> Result<WasmValleyObjective, JsValue> {
        console_error_panic_hook::set_once();

        let objective = build_objective(
            &expression,
            &var_names,
            &param_names,
            params,
            differentiation,
        )
        .map_err(|e| JsValue::from_str(&format!("{e:#}")))?;

        Ok(WasmValleyObjective {
            objective,
            var_names,
        })
    }

    pub fn dimension(&self) -> usize {
        self.objective.dimension()
    }

    pub fn value(&self, point: Vec<f64>) -> Result<f64, JsValue> {
        self.check_point(&point)?;
        Ok(self.objective.value(&point))
    }

    pub fn gradient(&self, point: Vec<f64>) -> Result<Vec<f64>, JsValue> {
        self.check_point(&point)?;
        Ok(self.objective.gradient(&point).iter().copied().collect())
    }

    /// Row-major Hessian.
    pub fn hessian(&self, point: Vec<f64>) -> Result<Vec<f64>, JsValue> {
        self.check_point(&point)?;
        Ok(self.objective.hessian(&point).transpose().iter().copied().collect())
    }
}

impl WasmValleyObjective {
    fn check_point(&self, point: &[f64]) -> Result<(), JsValue> {
        if point.len() != self.var_names.len() {
            return Err(JsValue::from_str(&format!(
                "Point has {} coordinates, expected {}.",
                point.len(),
                self.var_names.len()
            )));
        }
        Ok(())
    }
}
