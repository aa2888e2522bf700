//! Matrix, row and cell domain model.
//!
//! # Responsibility
//! - Define the read models returned by engine commands and queries.
//! - Define command inputs for matrix and row edits.
//!
//! # Invariants
//! - `Matrix::rows` lists row ids in position order.
//! - `Row::cells` holds exactly one cell per registered column, in column
//!   registry order.
//! - `Matrix::updated_at` strictly increases on every structural or value
//!   change beneath the matrix.

use crate::model::column::{BinId, ColumnId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable matrix identifier.
pub type MatrixId = Uuid;
/// Stable row identifier.
pub type RowId = Uuid;
/// Stable cell identifier.
pub type CellId = Uuid;
/// External room identifier (owned by the room directory).
pub type RoomId = String;

/// One room's storage-slotting grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    pub id: MatrixId,
    pub room_id: RoomId,
    /// Denormalized room display name resolved at write time.
    pub room_name: String,
    pub name: String,
    /// Row ids in position order.
    pub rows: Vec<RowId>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

/// One shelf within a matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    pub matrix_id: MatrixId,
    pub label: String,
    pub color: String,
    /// Zero-based position within the owning matrix.
    pub position: usize,
    /// One cell per column, in column registry order.
    pub cells: Vec<Cell>,
}

impl Row {
    /// Returns the cell addressing `column_id`, if present.
    pub fn cell(&self, column_id: ColumnId) -> Option<&Cell> {
        self.cells.iter().find(|cell| cell.column_id == column_id)
    }
}

/// Value stored at one (row, column) coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub row_id: RowId,
    pub column_id: ColumnId,
    /// SKU or content code; empty means unassigned.
    pub value: String,
    pub bound_bin_id: Option<BinId>,
}

impl Cell {
    /// Creates an empty, unbound cell with a fresh id.
    pub fn blank(row_id: RowId, column_id: ColumnId) -> Self {
        Self {
            id: Uuid::new_v4(),
            row_id,
            column_id,
            value: String::new(),
            bound_bin_id: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Initial row definition for `create_matrix`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSeed {
    pub label: String,
    #[serde(default)]
    pub color: String,
}

impl RowSeed {
    pub fn new(label: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            color: color.into(),
        }
    }
}

/// Partial matrix metadata update. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixUpdate {
    pub name: Option<String>,
    pub room_id: Option<RoomId>,
}

/// Partial row metadata update. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowUpdate {
    pub label: Option<String>,
    pub color: Option<String>,
}
