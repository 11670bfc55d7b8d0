//! WASM bindings for `valley_core`.

mod objective;
mod valley;

pub use objective::WasmValleyObjective;
