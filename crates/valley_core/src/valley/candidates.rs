//! Fixed-width candidate tables fed to the batch tracer.

use serde::{Deserialize, Serialize};

use crate::error::ValleyError;

/// Default coordinate column names `x1..xn` for an `n`-dimensional objective.
pub fn default_coordinate_columns(dimension: usize) -> Vec<String> {
    (1..=dimension).map(|i| format!("x{i}")).collect()
}

/// Rows of named numeric columns, typically raw critical-point candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTable {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl CandidateTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, ValleyError> {
        for (row, values) in rows.iter().enumerate() {
            if values.len() != columns.len() {
                return Err(ValleyError::RaggedRow {
                    row,
                    expected: columns.len(),
                    actual: values.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    /// Builds a table from row-major values, `columns.len()` per row.
    pub fn from_row_major(columns: Vec<String>, values: &[f64]) -> Result<Self, ValleyError> {
        let width = columns.len();
        if width == 0 {
            if values.is_empty() {
                return Ok(Self {
                    columns,
                    rows: Vec::new(),
                });
            }
            return Err(ValleyError::RaggedRow {
                row: 0,
                expected: 0,
                actual: values.len(),
            });
        }
        if values.len() % width != 0 {
            return Err(ValleyError::RaggedRow {
                row: values.len() / width,
                expected: width,
                actual: values.len() % width,
            });
        }
        let rows = values.chunks(width).map(|chunk| chunk.to_vec()).collect();
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolves `names` to column indices, failing once for every absent name.
    pub fn coordinate_accessor(&self, names: &[String]) -> Result<CoordinateAccessor<'_>, ValleyError> {
        let mut indices = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.columns.iter().position(|c| c == name) {
                Some(idx) => indices.push(idx),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(ValleyError::MissingColumns { missing });
        }
        Ok(CoordinateAccessor {
            table: self,
            indices,
        })
    }
}

/// One table row split into coordinates and the remaining named values.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePoint {
    pub coordinates: Vec<f64>,
    pub metadata: Vec<(String, f64)>,
}

/// Validated view of a [`CandidateTable`] through a fixed set of coordinate columns.
#[derive(Debug, Clone)]
pub struct CoordinateAccessor<'a> {
    table: &'a CandidateTable,
    indices: Vec<usize>,
}

impl<'a> CoordinateAccessor<'a> {
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn coordinates(&self, row: usize) -> Option<Vec<f64>> {
        let values = self.table.rows.get(row)?;
        Some(self.indices.iter().map(|&i| values[i]).collect())
    }

    pub fn point(&self, row: usize) -> Option<CandidatePoint> {
        let values = self.table.rows.get(row)?;
        let coordinates = self.indices.iter().map(|&i| values[i]).collect();
        let metadata = self
            .table
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.indices.contains(i))
            .map(|(i, name)| (name.clone(), values[i]))
            .collect();
        Some(CandidatePoint {
            coordinates,
            metadata,
        })
    }

    pub fn points(&self) -> impl Iterator<Item = CandidatePoint> + '_ {
        (0..self.len()).filter_map(move |row| self.point(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_columns_are_one_based() {
        assert_eq!(default_coordinate_columns(3), cols(&["x1", "x2", "x3"]));
        assert!(default_coordinate_columns(0).is_empty());
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = CandidateTable::new(cols(&["x1", "x2"]), vec![vec![1.0, 2.0], vec![3.0]])
            .expect_err("ragged");
        assert_eq!(
            err,
            ValleyError::RaggedRow {
                row: 1,
                expected: 2,
                actual: 1
            }
        );
        assert!(CandidateTable::from_row_major(cols(&["x1", "x2"]), &[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn accessor_splits_coordinates_from_metadata() {
        let table = CandidateTable::new(
            cols(&["value", "x2", "x1"]),
            vec![vec![0.5, 2.0, 1.0], vec![0.25, 4.0, 3.0]],
        )
        .expect("table");
        let accessor = table
            .coordinate_accessor(&default_coordinate_columns(2))
            .expect("columns present");
        let points: Vec<CandidatePoint> = accessor.points().collect();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].coordinates, vec![1.0, 2.0]);
        assert_eq!(points[1].metadata, vec![("value".to_string(), 0.25)]);
        assert!(accessor.point(2).is_none());
    }

    #[test]
    fn missing_columns_are_all_reported() {
        let table = CandidateTable::from_row_major(cols(&["x1", "f"]), &[1.0, 0.0]).expect("table");
        let err = table
            .coordinate_accessor(&default_coordinate_columns(3))
            .expect_err("missing");
        assert_eq!(
            err,
            ValleyError::MissingColumns {
                missing: cols(&["x2", "x3"])
            }
        );
        assert!(format!("{err}").contains("x2, x3"));
    }
}
