use thiserror::Error;

/// Input-contract violations reported by the valley core.
///
/// Numerical outcomes such as "not a valley" or "projection did not converge"
/// are not errors and never appear here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValleyError {
    #[error("Dimension mismatch: expected {expected}, got {actual}.")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Candidate table is missing coordinate columns: {}.", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("Row {row} has {actual} values but the table has {expected} columns.")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown walk method \"{0}\" (expected newton_projection or predictor_corrector).")]
    UnknownMethod(String),

    #[error("Invalid valley walk configuration: {0}")]
    InvalidConfig(String),

    #[error("Expression error: {0}")]
    Expression(String),
}

pub(crate) fn ensure_dimension(expected: usize, actual: usize) -> Result<(), ValleyError> {
    if expected != actual {
        return Err(ValleyError::DimensionMismatch { expected, actual });
    }
    Ok(())
}
