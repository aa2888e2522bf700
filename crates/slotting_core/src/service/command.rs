//! Command envelope for the matrix engine.
//!
//! `Command` mirrors the typed `MatrixEngine` methods one-to-one so hosts can
//! queue, log or replay edits as data.

use crate::model::column::{BinId, Column, ColumnDraft, ColumnId};
use crate::model::matrix::{Cell, Matrix, MatrixId, MatrixUpdate, Row, RowId, RowSeed, RowUpdate};

/// One mutating engine command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateMatrix {
        room_id: String,
        name: String,
        rows: Vec<RowSeed>,
    },
    UpdateMatrix {
        matrix_id: MatrixId,
        update: MatrixUpdate,
    },
    DeleteMatrix {
        matrix_id: MatrixId,
    },
    AddColumn {
        draft: ColumnDraft,
    },
    UpdateColumn {
        column_id: ColumnId,
        draft: ColumnDraft,
    },
    DeleteColumn {
        column_id: ColumnId,
    },
    AddRow {
        matrix_id: MatrixId,
        seed: RowSeed,
    },
    UpdateRow {
        matrix_id: MatrixId,
        row_id: RowId,
        update: RowUpdate,
    },
    DeleteRow {
        matrix_id: MatrixId,
        row_id: RowId,
    },
    MoveRow {
        matrix_id: MatrixId,
        row_id: RowId,
        target_index: usize,
    },
    SetCellValue {
        matrix_id: MatrixId,
        row_id: RowId,
        column_id: ColumnId,
        value: String,
    },
    BindCellBin {
        matrix_id: MatrixId,
        row_id: RowId,
        column_id: ColumnId,
        bin_id: Option<BinId>,
    },
}

impl Command {
    /// Stable operation name used in logs and timeout errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateMatrix { .. } => "create_matrix",
            Self::UpdateMatrix { .. } => "update_matrix",
            Self::DeleteMatrix { .. } => "delete_matrix",
            Self::AddColumn { .. } => "add_column",
            Self::UpdateColumn { .. } => "update_column",
            Self::DeleteColumn { .. } => "delete_column",
            Self::AddRow { .. } => "add_row",
            Self::UpdateRow { .. } => "update_row",
            Self::DeleteRow { .. } => "delete_row",
            Self::MoveRow { .. } => "move_row",
            Self::SetCellValue { .. } => "set_cell_value",
            Self::BindCellBin { .. } => "bind_cell_bin",
        }
    }
}

/// Result of a committed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Matrix(Matrix),
    Column(Column),
    Row(Row),
    Cell(Cell),
    /// Entity removed; carries the number of cells removed with it.
    Deleted { cells_removed: usize },
}

#[cfg(test)]
mod tests {
    use super::Command;
    use crate::model::column::ColumnDraft;
    use uuid::Uuid;

    #[test]
    fn command_names_are_snake_case_operations() {
        assert_eq!(
            Command::AddColumn {
                draft: ColumnDraft::new("Bin1")
            }
            .name(),
            "add_column"
        );
        assert_eq!(
            Command::DeleteRow {
                matrix_id: Uuid::new_v4(),
                row_id: Uuid::new_v4(),
            }
            .name(),
            "delete_row"
        );
    }
}
