//! Matrix/row storage and structural cascades.
//!
//! # Responsibility
//! - Own matrices, their ordered rows and (through a per-matrix `CellIndex`)
//!   their cells.
//! - Apply row and column structural edits so every row keeps exactly one
//!   cell per registered column.
//! - Remember which matrices and rows the current command touched, so the
//!   commit check covers only that scope.
//!
//! # Invariants
//! - Every mutation of rows or cells refreshes the owning matrix's
//!   `updated_at`; reads never do.
//! - Column cascades check every row before touching any of them, so a
//!   rejected cascade leaves the store unchanged.
//! - Matrices are shared behind `Arc`; a command copies only the matrices
//!   it writes to, and within them only the rows whose cells it writes.
//! - Row ids are unique across all matrices of one store.

use crate::error::{EntityRef, MatrixError, MatrixResult};
use crate::grid::cell_index::{CellIndex, CellKey};
use crate::model::column::{BinId, ColumnId};
use crate::model::matrix::{Cell, Matrix, MatrixId, RoomId, Row, RowId, RowSeed};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Which column cascade is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeKind {
    ColumnAdded,
    ColumnDeleted,
}

/// One per-row step of a column cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeStep {
    pub kind: CascadeKind,
    pub column_id: ColumnId,
    pub matrix_id: MatrixId,
    pub row_id: RowId,
}

/// Veto hook consulted before each per-row change of a column cascade.
///
/// Returning `Err(reason)` aborts the whole cascade with
/// `MatrixError::InvariantViolation`; no row is changed.
pub trait CascadeGuard: Send + Sync {
    fn check_row(&self, step: &CascadeStep) -> Result<(), String>;
}

/// Resolved, normalized inputs for `GridStore::create_matrix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMatrix {
    pub room_id: RoomId,
    pub room_name: String,
    pub name: String,
    pub rows: Vec<RowSeed>,
}

#[derive(Debug, Clone)]
struct RowRecord {
    label: String,
    color: String,
}

#[derive(Debug, Clone)]
struct MatrixRecord {
    matrix: Matrix,
    rows: HashMap<RowId, RowRecord>,
    cells: CellIndex,
}

/// Scope touched since the last `verify_pending`.
///
/// A matrix mapped to an empty row set still gets its bookkeeping checked.
#[derive(Debug, Clone, Default)]
struct PendingChecks {
    everything: bool,
    whole: BTreeSet<MatrixId>,
    rows: BTreeMap<MatrixId, BTreeSet<RowId>>,
}

impl PendingChecks {
    fn matrix(&mut self, matrix_id: MatrixId) {
        self.rows.entry(matrix_id).or_default();
    }

    fn row(&mut self, matrix_id: MatrixId, row_id: RowId) {
        self.rows.entry(matrix_id).or_default().insert(row_id);
    }
}

/// Matrix store with per-matrix cell indexes.
#[derive(Debug, Clone, Default)]
pub struct GridStore {
    matrices: BTreeMap<MatrixId, Arc<MatrixRecord>>,
    cell_count: usize,
    pending: PendingChecks,
}

impl GridStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a matrix and its initial rows, one blank cell per column.
    pub fn create_matrix(
        &mut self,
        input: NewMatrix,
        column_ids: &[ColumnId],
        now: i64,
    ) -> MatrixResult<Matrix> {
        let matrix_id = Uuid::new_v4();
        let mut record = MatrixRecord {
            matrix: Matrix {
                id: matrix_id,
                room_id: input.room_id,
                room_name: input.room_name,
                name: input.name,
                rows: Vec::with_capacity(input.rows.len()),
                created_at: now,
                updated_at: now,
            },
            rows: HashMap::with_capacity(input.rows.len()),
            cells: CellIndex::new(),
        };

        for seed in input.rows {
            let row_id = Uuid::new_v4();
            record.matrix.rows.push(row_id);
            record.rows.insert(
                row_id,
                RowRecord {
                    label: seed.label,
                    color: seed.color,
                },
            );
            for column_id in column_ids {
                record.cells.insert_blank(row_id, *column_id);
            }
        }

        let matrix = record.matrix.clone();
        self.cell_count += record.cells.len();
        self.matrices.insert(matrix_id, Arc::new(record));
        self.pending.whole.insert(matrix_id);
        Ok(matrix)
    }

    /// Updates matrix name and/or room reference.
    ///
    /// `room` carries the new room id together with its resolved name.
    pub fn update_matrix(
        &mut self,
        id: MatrixId,
        name: Option<String>,
        room: Option<(RoomId, String)>,
        now: i64,
    ) -> MatrixResult<Matrix> {
        let record = self.record_mut(id)?;
        if let Some(name) = name {
            record.matrix.name = name;
        }
        if let Some((room_id, room_name)) = room {
            record.matrix.room_id = room_id;
            record.matrix.room_name = room_name;
        }
        record.matrix.updated_at = next_timestamp(record.matrix.updated_at, now);
        let matrix = record.matrix.clone();
        self.pending.matrix(id);
        Ok(matrix)
    }

    /// Deletes a matrix with all rows and cells; returns removed cell count.
    pub fn delete_matrix(&mut self, id: MatrixId) -> MatrixResult<usize> {
        let record = self
            .matrices
            .remove(&id)
            .ok_or(MatrixError::NotFound(EntityRef::Matrix(id)))?;
        let removed = record.cells.len();
        self.cell_count -= removed;
        Ok(removed)
    }

    /// Appends a row with one blank cell per column.
    pub fn add_row(
        &mut self,
        matrix_id: MatrixId,
        seed: RowSeed,
        column_ids: &[ColumnId],
        now: i64,
    ) -> MatrixResult<RowId> {
        let row_id = Uuid::new_v4();
        let record = self.record_mut(matrix_id)?;
        record.matrix.rows.push(row_id);
        record.rows.insert(
            row_id,
            RowRecord {
                label: seed.label,
                color: seed.color,
            },
        );
        record.matrix.updated_at = next_timestamp(record.matrix.updated_at, now);
        let mut created = 0;
        for column_id in column_ids {
            if record.cells.insert_blank(row_id, *column_id) {
                created += 1;
            }
        }
        self.cell_count += created;
        self.pending.row(matrix_id, row_id);
        Ok(row_id)
    }

    /// Updates row label and/or color; never touches cells.
    pub fn update_row(
        &mut self,
        matrix_id: MatrixId,
        row_id: RowId,
        label: Option<String>,
        color: Option<String>,
        now: i64,
    ) -> MatrixResult<()> {
        self.ensure_row(matrix_id, row_id)?;
        let record = self.record_mut(matrix_id)?;
        if let Some(row) = record.rows.get_mut(&row_id) {
            if let Some(label) = label {
                row.label = label;
            }
            if let Some(color) = color {
                row.color = color;
            }
        }
        record.matrix.updated_at = next_timestamp(record.matrix.updated_at, now);
        self.pending.row(matrix_id, row_id);
        Ok(())
    }

    /// Deletes a row and its cells; returns removed cell count.
    pub fn delete_row(
        &mut self,
        matrix_id: MatrixId,
        row_id: RowId,
        now: i64,
    ) -> MatrixResult<usize> {
        self.ensure_row(matrix_id, row_id)?;
        let record = self.record_mut(matrix_id)?;
        record.rows.remove(&row_id);
        record.matrix.rows.retain(|id| *id != row_id);
        record.matrix.updated_at = next_timestamp(record.matrix.updated_at, now);
        let removed = record.cells.remove_row(row_id);
        self.cell_count -= removed;
        self.pending.matrix(matrix_id);
        Ok(removed)
    }

    /// Moves a row to `target_index` (clamped) within its matrix.
    ///
    /// Returns the row's new position.
    pub fn move_row(
        &mut self,
        matrix_id: MatrixId,
        row_id: RowId,
        target_index: usize,
        now: i64,
    ) -> MatrixResult<usize> {
        let current = self
            .record(matrix_id)?
            .matrix
            .rows
            .iter()
            .position(|id| *id == row_id)
            .ok_or(MatrixError::NotFound(EntityRef::Row { matrix_id, row_id }))?;
        let record = self.record_mut(matrix_id)?;
        record.matrix.rows.remove(current);
        let target = target_index.min(record.matrix.rows.len());
        record.matrix.rows.insert(target, row_id);
        record.matrix.updated_at = next_timestamp(record.matrix.updated_at, now);
        self.pending.row(matrix_id, row_id);
        Ok(target)
    }

    /// Inserts a blank cell for `column_id` into every row of every matrix.
    ///
    /// Rows that already hold the column are skipped, so a retried cascade
    /// never duplicates cells. Returns the number of cells created.
    pub fn apply_column_added(
        &mut self,
        column_id: ColumnId,
        now: i64,
        guard: Option<&dyn CascadeGuard>,
    ) -> MatrixResult<usize> {
        let targets = self.cascade_targets(column_id, CascadeKind::ColumnAdded, guard)?;
        let mut created = 0;
        for (matrix_id, row_ids) in &targets {
            let record = self.record_mut(*matrix_id)?;
            for row_id in row_ids {
                if record.cells.insert_blank(*row_id, column_id) {
                    created += 1;
                }
            }
            record.matrix.updated_at = next_timestamp(record.matrix.updated_at, now);
        }
        self.cell_count += created;
        self.pending.everything = true;
        Ok(created)
    }

    /// Removes the cell addressing `column_id` from every row, tolerating
    /// rows that no longer hold it. Returns the number of cells removed.
    pub fn apply_column_deleted(
        &mut self,
        column_id: ColumnId,
        now: i64,
        guard: Option<&dyn CascadeGuard>,
    ) -> MatrixResult<usize> {
        let targets = self.cascade_targets(column_id, CascadeKind::ColumnDeleted, guard)?;
        let mut removed = 0;
        for (matrix_id, row_ids) in &targets {
            let record = self.record_mut(*matrix_id)?;
            for row_id in row_ids {
                if record.cells.remove(*row_id, column_id).is_some() {
                    removed += 1;
                }
            }
            record.matrix.updated_at = next_timestamp(record.matrix.updated_at, now);
        }
        self.cell_count -= removed;
        self.pending.everything = true;
        Ok(removed)
    }

    /// Writes a value into an existing cell.
    ///
    /// The caller has already checked that the column is registered, so a
    /// missing cell means the completeness invariant is broken.
    pub fn set_cell_value(&mut self, key: CellKey, value: String, now: i64) -> MatrixResult<Cell> {
        self.get_cell(key)?;
        let record = self.record_mut(key.matrix_id)?;
        let cell = record
            .cells
            .set_value(key.row_id, key.column_id, value)
            .ok_or_else(|| missing_cell(&key))?;
        record.matrix.updated_at = next_timestamp(record.matrix.updated_at, now);
        self.pending.row(key.matrix_id, key.row_id);
        Ok(cell)
    }

    /// Binds or unbinds an existing cell to a bin.
    pub fn bind_cell_bin(
        &mut self,
        key: CellKey,
        bin_id: Option<BinId>,
        now: i64,
    ) -> MatrixResult<Cell> {
        self.get_cell(key)?;
        let record = self.record_mut(key.matrix_id)?;
        let cell = record
            .cells
            .set_bound_bin(key.row_id, key.column_id, bin_id)
            .ok_or_else(|| missing_cell(&key))?;
        record.matrix.updated_at = next_timestamp(record.matrix.updated_at, now);
        self.pending.row(key.matrix_id, key.row_id);
        Ok(cell)
    }

    /// Reads one cell; same failure semantics as `set_cell_value`.
    pub fn get_cell(&self, key: CellKey) -> MatrixResult<&Cell> {
        self.ensure_row(key.matrix_id, key.row_id)?;
        let record = self.record(key.matrix_id)?;
        record
            .cells
            .get(key.row_id, key.column_id)
            .ok_or_else(|| missing_cell(&key))
    }

    pub fn get_matrix(&self, id: MatrixId) -> Option<&Matrix> {
        self.matrices.get(&id).map(|record| &record.matrix)
    }

    /// Matrices referencing `room_id`, ordered by creation time then id.
    pub fn list_matrices_by_room(&self, room_id: &str) -> Vec<&Matrix> {
        let mut matrices = self
            .matrices
            .values()
            .map(|record| &record.matrix)
            .filter(|matrix| matrix.room_id == room_id)
            .collect::<Vec<_>>();
        matrices.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        matrices
    }

    /// All matrices ordered by id.
    pub fn matrices(&self) -> impl Iterator<Item = &Matrix> {
        self.matrices.values().map(|record| &record.matrix)
    }

    pub fn matrix_count(&self) -> usize {
        self.matrices.len()
    }

    /// Total number of cells across all matrices.
    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    /// Projects one row with its cells in `column_ids` order.
    pub fn get_row(
        &self,
        matrix_id: MatrixId,
        row_id: RowId,
        column_ids: &[ColumnId],
    ) -> MatrixResult<Row> {
        let record = self.record(matrix_id)?;
        let position = record
            .matrix
            .rows
            .iter()
            .position(|id| *id == row_id)
            .ok_or(MatrixError::NotFound(EntityRef::Row { matrix_id, row_id }))?;
        project_row(record, row_id, position, column_ids)
    }

    /// Projects every row of a matrix in position order.
    pub fn rows_of(&self, matrix_id: MatrixId, column_ids: &[ColumnId]) -> MatrixResult<Vec<Row>> {
        let record = self.record(matrix_id)?;
        record
            .matrix
            .rows
            .iter()
            .enumerate()
            .map(|(position, row_id)| project_row(record, *row_id, position, column_ids))
            .collect()
    }

    /// Full consistency check against the registered column set.
    ///
    /// Checks row bookkeeping, completeness (one cell per row per column),
    /// cell back-references and absence of orphan cells.
    pub fn verify(&self, column_ids: &[ColumnId]) -> MatrixResult<()> {
        let distinct = column_ids.iter().collect::<HashSet<_>>();
        if distinct.len() != column_ids.len() {
            return Err(MatrixError::invariant("column registry holds duplicate ids"));
        }

        let mut seen_rows = HashSet::new();
        let mut total_cells = 0usize;
        for record in self.matrices.values() {
            verify_bookkeeping(record, column_ids.len())?;
            for row_id in &record.matrix.rows {
                if !seen_rows.insert(*row_id) {
                    return Err(MatrixError::invariant(format!(
                        "row {row_id} appears in more than one matrix"
                    )));
                }
                verify_row(record, *row_id, column_ids)?;
            }
            total_cells += record.cells.len();
        }

        if total_cells != self.cell_count {
            return Err(MatrixError::invariant(format!(
                "store counts {} cells but holds {total_cells}",
                self.cell_count
            )));
        }
        Ok(())
    }

    /// Checks only what changed since the previous call, then forgets it.
    ///
    /// Column cascades fall back to `verify`. Other commands check the
    /// bookkeeping of each touched matrix in O(1) plus every touched row
    /// against `column_ids`.
    pub fn verify_pending(&mut self, column_ids: &[ColumnId]) -> MatrixResult<()> {
        let pending = std::mem::take(&mut self.pending);
        if pending.everything {
            return self.verify(column_ids);
        }

        for matrix_id in &pending.whole {
            let Some(record) = self.matrices.get(matrix_id) else {
                continue;
            };
            verify_bookkeeping(record, column_ids.len())?;
            for row_id in &record.matrix.rows {
                verify_row(record, *row_id, column_ids)?;
            }
        }
        for (matrix_id, row_ids) in &pending.rows {
            if pending.whole.contains(matrix_id) {
                continue;
            }
            let Some(record) = self.matrices.get(matrix_id) else {
                continue;
            };
            verify_bookkeeping(record, column_ids.len())?;
            for row_id in row_ids {
                verify_row(record, *row_id, column_ids)?;
            }
        }
        Ok(())
    }

    /// Loads a previously projected matrix with its rows and cells.
    ///
    /// Used when rebuilding a store from a snapshot; call `verify` after the
    /// last matrix is restored.
    pub(crate) fn restore_matrix(&mut self, matrix: Matrix, rows: Vec<Row>) -> MatrixResult<()> {
        let matrix_id = matrix.id;
        if self.matrices.contains_key(&matrix_id) {
            return Err(MatrixError::invariant(format!(
                "matrix {matrix_id} appears twice"
            )));
        }
        let provided = rows.iter().map(|row| row.id).collect::<Vec<_>>();
        if matrix.rows != provided {
            return Err(MatrixError::invariant(format!(
                "matrix {matrix_id} row order does not match its rows"
            )));
        }

        let mut records = HashMap::with_capacity(rows.len());
        let mut cells = CellIndex::new();
        for row in rows {
            if row.matrix_id != matrix_id {
                return Err(MatrixError::invariant(format!(
                    "row {} claims matrix {} but is stored under {matrix_id}",
                    row.id, row.matrix_id
                )));
            }
            if records.contains_key(&row.id) {
                return Err(MatrixError::invariant(format!("row {} appears twice", row.id)));
            }
            for cell in row.cells {
                let cell_id = cell.id;
                if cell.row_id != row.id || !cells.insert_cell(cell) {
                    return Err(MatrixError::invariant(format!(
                        "cell {cell_id} is duplicated or misplaced"
                    )));
                }
            }
            records.insert(
                row.id,
                RowRecord {
                    label: row.label,
                    color: row.color,
                },
            );
        }

        self.cell_count += cells.len();
        self.matrices.insert(
            matrix_id,
            Arc::new(MatrixRecord {
                matrix,
                rows: records,
                cells,
            }),
        );
        Ok(())
    }

    /// Runs the guard over every row the cascade would change.
    ///
    /// Nothing is mutated here, so a veto leaves the store as it was.
    fn cascade_targets(
        &self,
        column_id: ColumnId,
        kind: CascadeKind,
        guard: Option<&dyn CascadeGuard>,
    ) -> MatrixResult<Vec<(MatrixId, Vec<RowId>)>> {
        let mut targets = Vec::new();
        for record in self.matrices.values() {
            let matrix_id = record.matrix.id;
            let mut row_ids = Vec::new();
            for row_id in &record.matrix.rows {
                let present = record.cells.contains(*row_id, column_id);
                let wanted = match kind {
                    CascadeKind::ColumnAdded => !present,
                    CascadeKind::ColumnDeleted => present,
                };
                if !wanted {
                    continue;
                }
                check_step(guard, kind, CellKey::new(matrix_id, *row_id, column_id))?;
                row_ids.push(*row_id);
            }
            if !row_ids.is_empty() {
                targets.push((matrix_id, row_ids));
            }
        }
        Ok(targets)
    }

    fn ensure_row(&self, matrix_id: MatrixId, row_id: RowId) -> MatrixResult<()> {
        let record = self.record(matrix_id)?;
        if !record.rows.contains_key(&row_id) {
            return Err(MatrixError::NotFound(EntityRef::Row { matrix_id, row_id }));
        }
        Ok(())
    }

    fn record(&self, id: MatrixId) -> MatrixResult<&MatrixRecord> {
        self.matrices
            .get(&id)
            .map(|record| record.as_ref())
            .ok_or(MatrixError::NotFound(EntityRef::Matrix(id)))
    }

    /// Unshares the matrix before handing out a mutable reference.
    fn record_mut(&mut self, id: MatrixId) -> MatrixResult<&mut MatrixRecord> {
        self.matrices
            .get_mut(&id)
            .map(Arc::make_mut)
            .ok_or(MatrixError::NotFound(EntityRef::Matrix(id)))
    }
}

fn project_row(
    record: &MatrixRecord,
    row_id: RowId,
    position: usize,
    column_ids: &[ColumnId],
) -> MatrixResult<Row> {
    let matrix_id = record.matrix.id;
    let row = record.rows.get(&row_id).ok_or_else(|| {
        MatrixError::invariant(format!(
            "row {row_id} is listed in matrix {matrix_id} but not stored"
        ))
    })?;
    let cells = column_ids
        .iter()
        .map(|column_id| {
            record
                .cells
                .get(row_id, *column_id)
                .cloned()
                .ok_or_else(|| missing_cell(&CellKey::new(matrix_id, row_id, *column_id)))
        })
        .collect::<MatrixResult<Vec<_>>>()?;
    Ok(Row {
        id: row_id,
        matrix_id,
        label: row.label.clone(),
        color: row.color.clone(),
        position,
        cells,
    })
}

/// O(1) count checks: listed rows, stored rows and cells agree.
fn verify_bookkeeping(record: &MatrixRecord, column_count: usize) -> MatrixResult<()> {
    let matrix_id = record.matrix.id;
    let listed = record.matrix.rows.len();
    if listed != record.rows.len() {
        return Err(MatrixError::invariant(format!(
            "matrix {matrix_id} lists {listed} rows but stores {}",
            record.rows.len()
        )));
    }
    let rows_with_cells = if column_count == 0 { 0 } else { listed };
    if record.cells.row_count() != rows_with_cells || record.cells.len() != listed * column_count {
        return Err(MatrixError::invariant(format!(
            "matrix {matrix_id} holds {} cells in {} rows, expected {} in {rows_with_cells}",
            record.cells.len(),
            record.cells.row_count(),
            listed * column_count
        )));
    }
    Ok(())
}

/// Checks one row: stored, complete and free of foreign cells.
fn verify_row(record: &MatrixRecord, row_id: RowId, column_ids: &[ColumnId]) -> MatrixResult<()> {
    let matrix_id = record.matrix.id;
    if !record.rows.contains_key(&row_id) {
        return Err(MatrixError::invariant(format!(
            "row {row_id} in matrix {matrix_id} is listed but not stored"
        )));
    }
    let held = record.cells.row(row_id).map_or(0, |cells| cells.len());
    if held != column_ids.len() {
        return Err(MatrixError::invariant(format!(
            "row {row_id} in matrix {matrix_id} holds {held} cells, expected {}",
            column_ids.len()
        )));
    }
    for column_id in column_ids {
        let key = CellKey::new(matrix_id, row_id, *column_id);
        let cell = record
            .cells
            .get(row_id, *column_id)
            .ok_or_else(|| missing_cell(&key))?;
        if cell.row_id != row_id || cell.column_id != *column_id {
            return Err(MatrixError::invariant(format!(
                "cell {} is stored under a foreign coordinate",
                cell.id
            )));
        }
    }
    Ok(())
}

/// Returns a timestamp strictly greater than `previous`.
fn next_timestamp(previous: i64, now: i64) -> i64 {
    now.max(previous + 1)
}

fn check_step(
    guard: Option<&dyn CascadeGuard>,
    kind: CascadeKind,
    key: CellKey,
) -> MatrixResult<()> {
    let Some(guard) = guard else {
        return Ok(());
    };
    let step = CascadeStep {
        kind,
        column_id: key.column_id,
        matrix_id: key.matrix_id,
        row_id: key.row_id,
    };
    guard.check_row(&step).map_err(|reason| {
        MatrixError::invariant(format!(
            "cascade for column {} aborted at row {}: {reason}",
            key.column_id, key.row_id
        ))
    })
}

fn missing_cell(key: &CellKey) -> MatrixError {
    MatrixError::invariant(format!(
        "row {} in matrix {} has no cell for column {}",
        key.row_id, key.matrix_id, key.column_id
    ))
}

#[cfg(test)]
mod tests {
    use super::{CascadeGuard, CascadeKind, CascadeStep, GridStore, NewMatrix};
    use crate::error::{EntityRef, MatrixError};
    use crate::grid::cell_index::CellKey;
    use crate::model::matrix::RowSeed;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    fn new_matrix(rows: &[&str]) -> NewMatrix {
        NewMatrix {
            room_id: "R1".to_string(),
            room_name: "Room 1".to_string(),
            name: "Unit A".to_string(),
            rows: rows.iter().map(|label| RowSeed::new(*label, "")).collect(),
        }
    }

    struct FailAfter {
        allowed: usize,
        seen: AtomicUsize,
    }

    impl CascadeGuard for FailAfter {
        fn check_row(&self, step: &CascadeStep) -> Result<(), String> {
            assert_eq!(step.kind, CascadeKind::ColumnAdded);
            if self.seen.fetch_add(1, Ordering::SeqCst) >= self.allowed {
                return Err("injected fault".to_string());
            }
            Ok(())
        }
    }

    #[test]
    fn create_matrix_fills_one_cell_per_column() {
        let mut store = GridStore::new();
        let columns = vec![Uuid::new_v4(), Uuid::new_v4()];
        let matrix = store
            .create_matrix(new_matrix(&["Shelf1", "Shelf2"]), &columns, 10)
            .unwrap();

        let rows = store.rows_of(matrix.id, &columns).unwrap();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.cells.len(), 2);
            assert!(row.cells.iter().all(|cell| cell.is_empty()));
        }
        assert_eq!(rows[1].position, 1);
        assert_eq!(store.cell_count(), 4);
        store.verify(&columns).unwrap();
        store.verify_pending(&columns).unwrap();
    }

    #[test]
    fn apply_column_added_twice_does_not_duplicate_cells() {
        let mut store = GridStore::new();
        let mut columns = vec![Uuid::new_v4()];
        let matrix = store
            .create_matrix(new_matrix(&["Shelf1", "Shelf2"]), &columns, 10)
            .unwrap();

        let added = Uuid::new_v4();
        assert_eq!(store.apply_column_added(added, 11, None).unwrap(), 2);
        assert_eq!(store.apply_column_added(added, 12, None).unwrap(), 0);

        columns.push(added);
        store.verify(&columns).unwrap();
        assert_eq!(store.cell_count(), 4);
        let row = store.get_row(matrix.id, matrix.rows[0], &columns).unwrap();
        assert_eq!(
            row.cells
                .iter()
                .filter(|cell| cell.column_id == added)
                .count(),
            1
        );
    }

    #[test]
    fn apply_column_deleted_tolerates_absent_cells() {
        let mut store = GridStore::new();
        let column = Uuid::new_v4();
        store
            .create_matrix(new_matrix(&["Shelf1"]), &[column], 10)
            .unwrap();

        assert_eq!(store.apply_column_deleted(column, 11, None).unwrap(), 1);
        assert_eq!(store.apply_column_deleted(column, 12, None).unwrap(), 0);
        store.verify(&[]).unwrap();
    }

    #[test]
    fn rejected_cascade_leaves_store_untouched() {
        let mut store = GridStore::new();
        let columns = vec![Uuid::new_v4()];
        let first = store
            .create_matrix(new_matrix(&["A", "B"]), &columns, 10)
            .unwrap();
        store
            .create_matrix(new_matrix(&["C", "D"]), &columns, 10)
            .unwrap();

        let guard = FailAfter {
            allowed: 2,
            seen: AtomicUsize::new(0),
        };
        let err = store
            .apply_column_added(Uuid::new_v4(), 20, Some(&guard))
            .unwrap_err();
        assert!(matches!(err, MatrixError::InvariantViolation(_)));
        assert_eq!(store.cell_count(), 4);
        assert_eq!(store.get_matrix(first.id).unwrap().updated_at, 10);
        store.verify(&columns).unwrap();
    }

    #[test]
    fn cascade_refreshes_only_matrices_with_rows() {
        let mut store = GridStore::new();
        let with_rows = store.create_matrix(new_matrix(&["A"]), &[], 10).unwrap();
        let empty = store.create_matrix(new_matrix(&[]), &[], 10).unwrap();

        store.apply_column_added(Uuid::new_v4(), 50, None).unwrap();
        assert_eq!(store.get_matrix(with_rows.id).unwrap().updated_at, 50);
        assert_eq!(store.get_matrix(empty.id).unwrap().updated_at, 10);
    }

    #[test]
    fn updated_at_strictly_increases_even_with_stalled_clock() {
        let mut store = GridStore::new();
        let matrix = store.create_matrix(new_matrix(&[]), &[], 100).unwrap();
        let row_id = store
            .add_row(matrix.id, RowSeed::new("A", ""), &[], 100)
            .unwrap();
        assert_eq!(store.get_matrix(matrix.id).unwrap().updated_at, 101);
        store
            .update_row(matrix.id, row_id, Some("B".to_string()), None, 100)
            .unwrap();
        assert_eq!(store.get_matrix(matrix.id).unwrap().updated_at, 102);
    }

    #[test]
    fn set_cell_value_distinguishes_not_found_from_missing_cell() {
        let mut store = GridStore::new();
        let column = Uuid::new_v4();
        let matrix = store
            .create_matrix(new_matrix(&["A"]), &[column], 10)
            .unwrap();
        let row_id = matrix.rows[0];

        let unknown_row = Uuid::new_v4();
        let err = store
            .set_cell_value(
                CellKey::new(matrix.id, unknown_row, column),
                "x".to_string(),
                11,
            )
            .unwrap_err();
        assert_eq!(
            err,
            MatrixError::NotFound(EntityRef::Row {
                matrix_id: matrix.id,
                row_id: unknown_row
            })
        );

        let err = store
            .set_cell_value(
                CellKey::new(matrix.id, row_id, Uuid::new_v4()),
                "x".to_string(),
                11,
            )
            .unwrap_err();
        assert!(matches!(err, MatrixError::InvariantViolation(_)));
    }

    #[test]
    fn move_row_clamps_target_and_reorders() {
        let mut store = GridStore::new();
        let matrix = store
            .create_matrix(new_matrix(&["A", "B", "C"]), &[], 10)
            .unwrap();
        let first = matrix.rows[0];

        assert_eq!(store.move_row(matrix.id, first, 99, 11).unwrap(), 2);
        let order = &store.get_matrix(matrix.id).unwrap().rows;
        assert_eq!(order, &vec![matrix.rows[1], matrix.rows[2], first]);
    }

    #[test]
    fn verify_detects_orphan_cells() {
        let mut store = GridStore::new();
        let column = Uuid::new_v4();
        store
            .create_matrix(new_matrix(&["A"]), &[column], 10)
            .unwrap();

        let err = store.verify(&[]).unwrap_err();
        assert!(matches!(err, MatrixError::InvariantViolation(_)));
    }

    #[test]
    fn cell_write_copies_only_the_written_matrix() {
        let mut store = GridStore::new();
        let column = Uuid::new_v4();
        let written = store
            .create_matrix(new_matrix(&["A", "B"]), &[column], 10)
            .unwrap();
        let untouched = store
            .create_matrix(new_matrix(&["C"]), &[column], 10)
            .unwrap();
        store.verify_pending(&[column]).unwrap();

        let mut next = store.clone();
        next.set_cell_value(
            CellKey::new(written.id, written.rows[0], column),
            "SKU-1".to_string(),
            11,
        )
        .unwrap();

        assert!(Arc::ptr_eq(
            &store.matrices[&untouched.id],
            &next.matrices[&untouched.id]
        ));
        assert!(!Arc::ptr_eq(
            &store.matrices[&written.id],
            &next.matrices[&written.id]
        ));
        assert_eq!(
            store
                .get_cell(CellKey::new(written.id, written.rows[0], column))
                .unwrap()
                .value,
            ""
        );
        next.verify_pending(&[column]).unwrap();
    }

    #[test]
    fn verify_pending_covers_touched_rows_only() {
        let mut store = GridStore::new();
        let column = Uuid::new_v4();
        let matrix = store
            .create_matrix(new_matrix(&["A"]), &[column], 10)
            .unwrap();
        store.verify_pending(&[column]).unwrap();

        // A column the store never cascaded makes every row incomplete.
        let unknown = Uuid::new_v4();
        store.verify_pending(&[column, unknown]).unwrap();

        store
            .update_row(matrix.id, matrix.rows[0], Some("B".to_string()), None, 11)
            .unwrap();
        let err = store.verify_pending(&[column, unknown]).unwrap_err();
        assert!(matches!(err, MatrixError::InvariantViolation(_)));
    }
}
