//! Change event payloads.

use crate::model::column::ColumnId;
use crate::model::matrix::{MatrixId, RoomId, RowId};
use serde::{Deserialize, Serialize};

/// Kind of committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeEventKind {
    MatrixCreated,
    MatrixUpdated,
    MatrixDeleted,
    ColumnAdded,
    ColumnUpdated,
    ColumnDeleted,
    RowAdded,
    RowUpdated,
    RowDeleted,
    CellUpdated,
}

impl ChangeEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MatrixCreated => "matrix_created",
            Self::MatrixUpdated => "matrix_updated",
            Self::MatrixDeleted => "matrix_deleted",
            Self::ColumnAdded => "column_added",
            Self::ColumnUpdated => "column_updated",
            Self::ColumnDeleted => "column_deleted",
            Self::RowAdded => "row_added",
            Self::RowUpdated => "row_updated",
            Self::RowDeleted => "row_deleted",
            Self::CellUpdated => "cell_updated",
        }
    }
}

/// One committed change.
///
/// `sequence` increases by one per emitted event within an engine, so
/// consumers can drop duplicates of at-least-once delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub sequence: u64,
    pub kind: ChangeEventKind,
    pub matrix_id: Option<MatrixId>,
    pub row_id: Option<RowId>,
    pub column_id: Option<ColumnId>,
    pub room_id: Option<RoomId>,
    /// Number of cells created or removed by the change, if any.
    pub cells_affected: usize,
    /// Unix epoch milliseconds of the commit.
    pub occurred_at: i64,
}

impl ChangeEvent {
    /// Creates an event with no entity references; `sequence` is assigned at emit time.
    pub fn new(kind: ChangeEventKind, occurred_at: i64) -> Self {
        Self {
            sequence: 0,
            kind,
            matrix_id: None,
            row_id: None,
            column_id: None,
            room_id: None,
            cells_affected: 0,
            occurred_at,
        }
    }

    pub fn matrix(mut self, matrix_id: MatrixId) -> Self {
        self.matrix_id = Some(matrix_id);
        self
    }

    pub fn row(mut self, row_id: RowId) -> Self {
        self.row_id = Some(row_id);
        self
    }

    pub fn column(mut self, column_id: ColumnId) -> Self {
        self.column_id = Some(column_id);
        self
    }

    pub fn room(mut self, room_id: impl Into<RoomId>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn cells(mut self, cells_affected: usize) -> Self {
        self.cells_affected = cells_affected;
        self
    }
}
