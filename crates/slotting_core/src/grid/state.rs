//! Combined grid state and column cascades.
//!
//! # Responsibility
//! - Pair the column registry with the grid store.
//! - Run column add/delete as one cascade across every matrix.
//! - Convert state to and from `GridSnapshot`.
//! - Stay cheap to clone: the registry is small and matrices are shared
//!   until a command writes to them.
//!
//! # Invariants
//! - A column is registered only after its cascade succeeded, and
//!   unregistered only after its cells were removed everywhere.
//! - Cell writes resolve the column against the registry first, so an
//!   unknown column is `NotFound` while a missing cell is an invariant
//!   violation.

use crate::error::{EntityRef, MatrixError, MatrixResult};
use crate::grid::cell_index::CellKey;
use crate::grid::column_registry::ColumnRegistry;
use crate::grid::grid_store::{CascadeGuard, GridStore, NewMatrix};
use crate::model::column::{BinId, Column, ColumnId};
use crate::model::matrix::{Cell, Matrix, MatrixId, RoomId, Row, RowId, RowSeed};
use crate::model::snapshot::{GridSnapshot, MatrixSnapshot};

/// Registry + store for one engine scope.
#[derive(Debug, Clone, Default)]
pub struct GridState {
    columns: ColumnRegistry,
    store: GridStore,
}

impl GridState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `column` and inserts a blank cell for it into every row.
    pub fn add_column(
        &mut self,
        column: Column,
        now: i64,
        guard: Option<&dyn CascadeGuard>,
    ) -> MatrixResult<Column> {
        if self.columns.contains(column.id) {
            return Err(MatrixError::invariant(format!(
                "column id {} is already registered",
                column.id
            )));
        }
        self.store.apply_column_added(column.id, now, guard)?;
        self.columns.push(column.clone())?;
        Ok(column)
    }

    /// Updates column metadata; cells are untouched.
    pub fn update_column(
        &mut self,
        id: ColumnId,
        label: String,
        bound_bin_id: Option<BinId>,
        bin_label: Option<String>,
        display_width: Option<u32>,
    ) -> MatrixResult<Column> {
        self.columns
            .update(id, label, bound_bin_id, bin_label, display_width)
    }

    /// Removes the column's cell from every row, then unregisters it.
    ///
    /// Returns the number of cells removed.
    pub fn delete_column(
        &mut self,
        id: ColumnId,
        now: i64,
        guard: Option<&dyn CascadeGuard>,
    ) -> MatrixResult<usize> {
        if !self.columns.contains(id) {
            return Err(MatrixError::NotFound(EntityRef::Column(id)));
        }
        let removed = self.store.apply_column_deleted(id, now, guard)?;
        self.columns.remove(id)?;
        Ok(removed)
    }

    /// Columns in creation order.
    pub fn list_columns(&self) -> &[Column] {
        self.columns.list()
    }

    pub fn get_column(&self, id: ColumnId) -> MatrixResult<&Column> {
        self.columns
            .get(id)
            .ok_or(MatrixError::NotFound(EntityRef::Column(id)))
    }

    pub fn create_matrix(&mut self, input: NewMatrix, now: i64) -> MatrixResult<Matrix> {
        let column_ids = self.columns.ids();
        self.store.create_matrix(input, &column_ids, now)
    }

    pub fn update_matrix(
        &mut self,
        id: MatrixId,
        name: Option<String>,
        room: Option<(RoomId, String)>,
        now: i64,
    ) -> MatrixResult<Matrix> {
        self.store.update_matrix(id, name, room, now)
    }

    /// Deletes a matrix; returns the number of cells removed.
    pub fn delete_matrix(&mut self, id: MatrixId) -> MatrixResult<usize> {
        self.store.delete_matrix(id)
    }

    pub fn add_row(&mut self, matrix_id: MatrixId, seed: RowSeed, now: i64) -> MatrixResult<Row> {
        let column_ids = self.columns.ids();
        let row_id = self.store.add_row(matrix_id, seed, &column_ids, now)?;
        self.store.get_row(matrix_id, row_id, &column_ids)
    }

    pub fn update_row(
        &mut self,
        matrix_id: MatrixId,
        row_id: RowId,
        label: Option<String>,
        color: Option<String>,
        now: i64,
    ) -> MatrixResult<Row> {
        self.store.update_row(matrix_id, row_id, label, color, now)?;
        self.get_row(matrix_id, row_id)
    }

    /// Deletes a row; returns the number of cells removed.
    pub fn delete_row(
        &mut self,
        matrix_id: MatrixId,
        row_id: RowId,
        now: i64,
    ) -> MatrixResult<usize> {
        self.store.delete_row(matrix_id, row_id, now)
    }

    pub fn move_row(
        &mut self,
        matrix_id: MatrixId,
        row_id: RowId,
        target_index: usize,
        now: i64,
    ) -> MatrixResult<Row> {
        self.store.move_row(matrix_id, row_id, target_index, now)?;
        self.get_row(matrix_id, row_id)
    }

    pub fn set_cell_value(
        &mut self,
        matrix_id: MatrixId,
        row_id: RowId,
        column_id: ColumnId,
        value: String,
        now: i64,
    ) -> MatrixResult<Cell> {
        let key = self.resolve_cell_key(matrix_id, row_id, column_id)?;
        self.store.set_cell_value(key, value, now)
    }

    pub fn bind_cell_bin(
        &mut self,
        matrix_id: MatrixId,
        row_id: RowId,
        column_id: ColumnId,
        bin_id: Option<BinId>,
        now: i64,
    ) -> MatrixResult<Cell> {
        let key = self.resolve_cell_key(matrix_id, row_id, column_id)?;
        self.store.bind_cell_bin(key, bin_id, now)
    }

    pub fn get_cell(
        &self,
        matrix_id: MatrixId,
        row_id: RowId,
        column_id: ColumnId,
    ) -> MatrixResult<&Cell> {
        let key = self.resolve_cell_key(matrix_id, row_id, column_id)?;
        self.store.get_cell(key)
    }

    pub fn get_cell_value(
        &self,
        matrix_id: MatrixId,
        row_id: RowId,
        column_id: ColumnId,
    ) -> MatrixResult<String> {
        self.get_cell(matrix_id, row_id, column_id)
            .map(|cell| cell.value.clone())
    }

    pub fn get_matrix(&self, id: MatrixId) -> MatrixResult<Matrix> {
        self.store
            .get_matrix(id)
            .cloned()
            .ok_or(MatrixError::NotFound(EntityRef::Matrix(id)))
    }

    pub fn list_matrices_by_room(&self, room_id: &str) -> Vec<Matrix> {
        self.store
            .list_matrices_by_room(room_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn get_row(&self, matrix_id: MatrixId, row_id: RowId) -> MatrixResult<Row> {
        self.store.get_row(matrix_id, row_id, &self.columns.ids())
    }

    /// Rows of one matrix in position order.
    pub fn rows_of(&self, matrix_id: MatrixId) -> MatrixResult<Vec<Row>> {
        self.store.rows_of(matrix_id, &self.columns.ids())
    }

    pub fn matrix_count(&self) -> usize {
        self.store.matrix_count()
    }

    pub fn store(&self) -> &GridStore {
        &self.store
    }

    /// Full consistency check over every matrix, row and cell.
    pub fn verify(&self) -> MatrixResult<()> {
        self.store.verify(&self.columns.ids())
    }

    /// Checks what the current command touched: everything after a column
    /// cascade, otherwise only the touched matrices and rows.
    pub fn verify_changes(&mut self) -> MatrixResult<()> {
        let column_ids = self.columns.ids();
        self.store.verify_pending(&column_ids)
    }

    /// Projects the full state. Matrices are ordered by id.
    pub fn to_snapshot(&self) -> MatrixResult<GridSnapshot> {
        let column_ids = self.columns.ids();
        let matrices = self
            .store
            .matrices()
            .map(|matrix| {
                Ok(MatrixSnapshot {
                    matrix: matrix.clone(),
                    rows: self.store.rows_of(matrix.id, &column_ids)?,
                })
            })
            .collect::<MatrixResult<Vec<_>>>()?;
        Ok(GridSnapshot {
            columns: self.columns.list().to_vec(),
            matrices,
        })
    }

    /// Rebuilds state from a snapshot, rejecting any inconsistency with
    /// `InvariantViolation`.
    pub fn from_snapshot(snapshot: GridSnapshot) -> MatrixResult<Self> {
        let mut state = Self::new();
        for column in snapshot.columns {
            state.columns.push(column)?;
        }
        for entry in snapshot.matrices {
            state.store.restore_matrix(entry.matrix, entry.rows)?;
        }
        state.verify()?;
        Ok(state)
    }

    fn resolve_cell_key(
        &self,
        matrix_id: MatrixId,
        row_id: RowId,
        column_id: ColumnId,
    ) -> MatrixResult<CellKey> {
        if self.store.get_matrix(matrix_id).is_none() {
            return Err(MatrixError::NotFound(EntityRef::Matrix(matrix_id)));
        }
        if !self.columns.contains(column_id) {
            return Err(MatrixError::NotFound(EntityRef::Column(column_id)));
        }
        Ok(CellKey::new(matrix_id, row_id, column_id))
    }
}

#[cfg(test)]
mod tests {
    use super::GridState;
    use crate::error::{EntityRef, MatrixError};
    use crate::grid::grid_store::NewMatrix;
    use crate::model::column::Column;
    use crate::model::matrix::RowSeed;
    use uuid::Uuid;

    fn column(label: &str) -> Column {
        Column {
            id: Uuid::new_v4(),
            label: label.to_string(),
            bound_bin_id: None,
            bin_label: None,
            display_width: None,
            created_at: 0,
        }
    }

    #[test]
    fn reference_scenario_keeps_rows_complete() {
        let mut state = GridState::new();
        let bin1 = state.add_column(column("Bin1"), 1, None).unwrap();
        let bin2 = state.add_column(column("Bin2"), 2, None).unwrap();

        let matrix = state
            .create_matrix(
                NewMatrix {
                    room_id: "R1".to_string(),
                    room_name: "Room 1".to_string(),
                    name: "Unit A".to_string(),
                    rows: vec![RowSeed::new("Shelf1", "")],
                },
                3,
            )
            .unwrap();
        let rows = state.rows_of(matrix.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells.len(), 2);
        assert_eq!(rows[0].cells[0].column_id, bin1.id);
        assert_eq!(rows[0].cells[1].column_id, bin2.id);

        state.delete_column(bin1.id, 4, None).unwrap();
        let rows = state.rows_of(matrix.id).unwrap();
        assert_eq!(rows[0].cells.len(), 1);
        assert_eq!(rows[0].cells[0].column_id, bin2.id);

        let shelf2 = state
            .add_row(matrix.id, RowSeed::new("Shelf2", ""), 5)
            .unwrap();
        assert_eq!(shelf2.cells.len(), 1);
        assert_eq!(shelf2.cells[0].column_id, bin2.id);
        state.verify().unwrap();
    }

    #[test]
    fn cell_access_reports_unknown_column_as_not_found() {
        let mut state = GridState::new();
        let matrix = state
            .create_matrix(
                NewMatrix {
                    room_id: "R1".to_string(),
                    room_name: "Room 1".to_string(),
                    name: "Unit A".to_string(),
                    rows: vec![RowSeed::new("Shelf1", "")],
                },
                1,
            )
            .unwrap();
        let missing = Uuid::new_v4();
        let err = state
            .get_cell_value(matrix.id, matrix.rows[0], missing)
            .unwrap_err();
        assert_eq!(err, MatrixError::NotFound(EntityRef::Column(missing)));
    }

    #[test]
    fn snapshot_roundtrip_preserves_state() {
        let mut state = GridState::new();
        let bin = state.add_column(column("Bin1"), 1, None).unwrap();
        let matrix = state
            .create_matrix(
                NewMatrix {
                    room_id: "R1".to_string(),
                    room_name: "Room 1".to_string(),
                    name: "Unit A".to_string(),
                    rows: vec![RowSeed::new("Shelf1", "#fff")],
                },
                2,
            )
            .unwrap();
        state
            .set_cell_value(matrix.id, matrix.rows[0], bin.id, "SKU-42".to_string(), 3)
            .unwrap();

        let snapshot = state.to_snapshot().unwrap();
        let restored = GridState::from_snapshot(snapshot.clone()).unwrap();
        assert_eq!(restored.to_snapshot().unwrap(), snapshot);
        assert_eq!(
            restored
                .get_cell_value(matrix.id, matrix.rows[0], bin.id)
                .unwrap(),
            "SKU-42"
        );
    }

    #[test]
    fn from_snapshot_rejects_incomplete_rows() {
        let mut state = GridState::new();
        state.add_column(column("Bin1"), 1, None).unwrap();
        state
            .create_matrix(
                NewMatrix {
                    room_id: "R1".to_string(),
                    room_name: "Room 1".to_string(),
                    name: "Unit A".to_string(),
                    rows: vec![RowSeed::new("Shelf1", "")],
                },
                2,
            )
            .unwrap();

        let mut snapshot = state.to_snapshot().unwrap();
        snapshot.matrices[0].rows[0].cells.clear();
        let err = GridState::from_snapshot(snapshot).unwrap_err();
        assert!(matches!(err, MatrixError::InvariantViolation(_)));
    }
}
