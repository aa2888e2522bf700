//! Read-only query façade.
//!
//! # Responsibility
//! - Serve matrix, row, column and cell reads from one committed state.
//!
//! # Invariants
//! - A `GridView` never changes after it was taken; later commands publish
//!   new state instead of mutating the viewed one.
//! - Queries never refresh timestamps or emit notifications.

use crate::error::MatrixResult;
use crate::grid::state::GridState;
use crate::model::column::{Column, ColumnId};
use crate::model::matrix::{Cell, Matrix, MatrixId, Row, RowId};
use crate::model::snapshot::GridSnapshot;
use std::sync::Arc;

/// Immutable view over the state committed by the last command.
#[derive(Debug, Clone)]
pub struct GridView {
    state: Arc<GridState>,
}

impl GridView {
    pub(crate) fn new(state: Arc<GridState>) -> Self {
        Self { state }
    }

    /// Matrices of one room ordered by creation time.
    pub fn matrices_for_room(&self, room_id: &str) -> Vec<Matrix> {
        self.state.list_matrices_by_room(room_id.trim())
    }

    pub fn get_matrix(&self, matrix_id: MatrixId) -> MatrixResult<Matrix> {
        self.state.get_matrix(matrix_id)
    }

    /// Rows of one matrix in position order, cells in column order.
    pub fn rows_of(&self, matrix_id: MatrixId) -> MatrixResult<Vec<Row>> {
        self.state.rows_of(matrix_id)
    }

    pub fn get_row(&self, matrix_id: MatrixId, row_id: RowId) -> MatrixResult<Row> {
        self.state.get_row(matrix_id, row_id)
    }

    /// Columns in creation order.
    pub fn columns(&self) -> Vec<Column> {
        self.state.list_columns().to_vec()
    }

    pub fn column(&self, column_id: ColumnId) -> MatrixResult<Column> {
        self.state.get_column(column_id).cloned()
    }

    /// Value stored at one coordinate.
    pub fn cell(
        &self,
        matrix_id: MatrixId,
        row_id: RowId,
        column_id: ColumnId,
    ) -> MatrixResult<String> {
        self.state.get_cell_value(matrix_id, row_id, column_id)
    }

    /// Full cell record at one coordinate.
    pub fn cell_record(
        &self,
        matrix_id: MatrixId,
        row_id: RowId,
        column_id: ColumnId,
    ) -> MatrixResult<Cell> {
        self.state.get_cell(matrix_id, row_id, column_id).cloned()
    }

    pub fn matrix_count(&self) -> usize {
        self.state.matrix_count()
    }

    pub fn snapshot(&self) -> MatrixResult<GridSnapshot> {
        self.state.to_snapshot()
    }

    /// Runs the full consistency check on this view.
    pub fn verify(&self) -> MatrixResult<()> {
        self.state.verify()
    }
}
