//! Coordinate-keyed cell index of one matrix.
//!
//! # Responsibility
//! - Store every cell of a matrix under its `(row, column)` coordinate for
//!   O(1) read and write.
//! - Keep each row's cells behind their own `Arc`, so copying the index for
//!   a command shares every row it does not touch.
//!
//! # Invariants
//! - At most one cell exists per coordinate.
//! - `len` always equals the number of stored cells.
//! - Only `GridStore` mutates the index, in the same step as the row or
//!   column change that requires it.

use crate::model::column::{BinId, ColumnId};
use crate::model::matrix::{Cell, MatrixId, RowId};
use std::collections::HashMap;
use std::sync::Arc;

/// Coordinate of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub matrix_id: MatrixId,
    pub row_id: RowId,
    pub column_id: ColumnId,
}

impl CellKey {
    pub fn new(matrix_id: MatrixId, row_id: RowId, column_id: ColumnId) -> Self {
        Self {
            matrix_id,
            row_id,
            column_id,
        }
    }
}

/// Cells of one row, keyed by column.
pub type RowCells = HashMap<ColumnId, Cell>;

/// Cell storage of one matrix, keyed by row then column.
#[derive(Debug, Clone, Default)]
pub struct CellIndex {
    rows: HashMap<RowId, Arc<RowCells>>,
    len: usize,
}

impl CellIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a blank cell at `(row_id, column_id)` unless one already exists.
    ///
    /// Returns `true` when a cell was created.
    pub fn insert_blank(&mut self, row_id: RowId, column_id: ColumnId) -> bool {
        let cells = Arc::make_mut(self.rows.entry(row_id).or_default());
        if cells.contains_key(&column_id) {
            return false;
        }
        cells.insert(column_id, Cell::blank(row_id, column_id));
        self.len += 1;
        true
    }

    /// Inserts a fully-formed cell; returns `false` if the coordinate is taken.
    pub(crate) fn insert_cell(&mut self, cell: Cell) -> bool {
        let cells = Arc::make_mut(self.rows.entry(cell.row_id).or_default());
        if cells.contains_key(&cell.column_id) {
            return false;
        }
        cells.insert(cell.column_id, cell);
        self.len += 1;
        true
    }

    /// Removes the cell at `(row_id, column_id)`, tolerating absence.
    pub fn remove(&mut self, row_id: RowId, column_id: ColumnId) -> Option<Cell> {
        let shared = self.rows.get_mut(&row_id)?;
        if !shared.contains_key(&column_id) {
            return None;
        }
        let removed = Arc::make_mut(shared).remove(&column_id);
        if shared.is_empty() {
            self.rows.remove(&row_id);
        }
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Removes every cell of one row and returns how many were dropped.
    pub fn remove_row(&mut self, row_id: RowId) -> usize {
        let removed = self.rows.remove(&row_id).map_or(0, |cells| cells.len());
        self.len -= removed;
        removed
    }

    pub fn get(&self, row_id: RowId, column_id: ColumnId) -> Option<&Cell> {
        self.rows.get(&row_id)?.get(&column_id)
    }

    pub fn contains(&self, row_id: RowId, column_id: ColumnId) -> bool {
        self.get(row_id, column_id).is_some()
    }

    /// Writes `value` into an existing cell and returns the updated cell.
    pub fn set_value(&mut self, row_id: RowId, column_id: ColumnId, value: String) -> Option<Cell> {
        let cell = self.cell_mut(row_id, column_id)?;
        cell.value = value;
        Some(cell.clone())
    }

    /// Binds (or unbinds) an existing cell to a bin.
    pub fn set_bound_bin(
        &mut self,
        row_id: RowId,
        column_id: ColumnId,
        bin_id: Option<BinId>,
    ) -> Option<Cell> {
        let cell = self.cell_mut(row_id, column_id)?;
        cell.bound_bin_id = bin_id;
        Some(cell.clone())
    }

    /// Cells currently held by `row_id`.
    pub fn row(&self, row_id: RowId) -> Option<&RowCells> {
        self.rows.get(&row_id).map(|cells| cells.as_ref())
    }

    /// Number of rows holding at least one cell.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn cell_mut(&mut self, row_id: RowId, column_id: ColumnId) -> Option<&mut Cell> {
        let shared = self.rows.get_mut(&row_id)?;
        if !shared.contains_key(&column_id) {
            return None;
        }
        Arc::make_mut(shared).get_mut(&column_id)
    }
}
