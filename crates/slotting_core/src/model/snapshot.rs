//! Serializable full-state snapshot.

use crate::model::column::Column;
use crate::model::matrix::{Matrix, Row};
use serde::{Deserialize, Serialize};

/// Complete committed state of one engine scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSnapshot {
    /// Columns in creation order.
    pub columns: Vec<Column>,
    pub matrices: Vec<MatrixSnapshot>,
}

/// One matrix together with its rows in position order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixSnapshot {
    pub matrix: Matrix,
    pub rows: Vec<Row>,
}

impl GridSnapshot {
    pub fn row_count(&self) -> usize {
        self.matrices.iter().map(|matrix| matrix.rows.len()).sum()
    }

    pub fn cell_count(&self) -> usize {
        self.matrices
            .iter()
            .flat_map(|matrix| matrix.rows.iter())
            .map(|row| row.cells.len())
            .sum()
    }
}
