//! Snapshot repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Write a full `GridSnapshot` in one transaction with replace semantics.
//! - Read it back with columns, rows and cells in their stored order.
//!
//! # Invariants
//! - Column order is persisted as `position`, row order as per-matrix
//!   `position`; cells are returned in column order.
//! - Read paths reject malformed persisted values instead of masking them.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::column::Column;
use crate::model::matrix::{Cell, Matrix, Row};
use crate::model::snapshot::{GridSnapshot, MatrixSnapshot};
use log::info;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

pub type SnapshotRepoResult<T> = Result<T, SnapshotRepoError>;

/// Errors from snapshot persistence.
#[derive(Debug)]
pub enum SnapshotRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Persisted data cannot be converted to a valid snapshot.
    InvalidData(String),
}

impl Display for SnapshotRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "snapshot repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid snapshot data: {message}"),
        }
    }
}

impl Error for SnapshotRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::UninitializedConnection { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for SnapshotRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SnapshotRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistence contract for full engine snapshots.
pub trait SnapshotRepository {
    /// Replaces the stored snapshot.
    fn save_snapshot(&self, snapshot: &GridSnapshot) -> SnapshotRepoResult<()>;
    /// Loads the stored snapshot; an empty store yields an empty snapshot.
    fn load_snapshot(&self) -> SnapshotRepoResult<GridSnapshot>;
}

/// SQLite-backed snapshot repository.
pub struct SqliteSnapshotRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSnapshotRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> SnapshotRepoResult<Self> {
        let expected_version = latest_version();
        let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if actual_version != expected_version {
            return Err(SnapshotRepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }
}

impl SnapshotRepository for SqliteSnapshotRepository<'_> {
    fn save_snapshot(&self, snapshot: &GridSnapshot) -> SnapshotRepoResult<()> {
        let started_at = Instant::now();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute_batch(
            "DELETE FROM matrix_cells;
             DELETE FROM matrix_rows;
             DELETE FROM matrices;
             DELETE FROM matrix_columns;",
        )?;

        for (position, column) in snapshot.columns.iter().enumerate() {
            tx.execute(
                "INSERT INTO matrix_columns (
                    column_uuid,
                    position,
                    label,
                    bound_bin_id,
                    bin_label,
                    display_width,
                    created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    column.id.to_string(),
                    position as i64,
                    column.label,
                    column.bound_bin_id,
                    column.bin_label,
                    column.display_width,
                    column.created_at,
                ],
            )?;
        }

        for entry in &snapshot.matrices {
            let matrix = &entry.matrix;
            tx.execute(
                "INSERT INTO matrices (
                    matrix_uuid,
                    room_id,
                    room_name,
                    name,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    matrix.id.to_string(),
                    matrix.room_id,
                    matrix.room_name,
                    matrix.name,
                    matrix.created_at,
                    matrix.updated_at,
                ],
            )?;
            for row in &entry.rows {
                insert_row(&tx, row)?;
            }
        }

        tx.commit()?;
        info!(
            "event=snapshot_save module=repo status=ok matrices={} rows={} cells={} duration_ms={}",
            snapshot.matrices.len(),
            snapshot.row_count(),
            snapshot.cell_count(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn load_snapshot(&self) -> SnapshotRepoResult<GridSnapshot> {
        let columns = load_columns(self.conn)?;
        let mut cells_by_row = load_cells(self.conn)?;
        let mut rows_by_matrix = load_rows(self.conn, &mut cells_by_row)?;
        if let Some(row_id) = cells_by_row.keys().next() {
            return Err(SnapshotRepoError::InvalidData(format!(
                "cells reference unknown row {row_id}"
            )));
        }

        let mut stmt = self.conn.prepare(
            "SELECT matrix_uuid, room_id, room_name, name, created_at, updated_at
             FROM matrices
             ORDER BY matrix_uuid ASC;",
        )?;
        let mut query = stmt.query([])?;
        let mut matrices = Vec::new();
        while let Some(row) = query.next()? {
            let id_text: String = row.get(0)?;
            let id = parse_uuid(&id_text, "matrices.matrix_uuid")?;
            let rows = rows_by_matrix.remove(&id).unwrap_or_default();
            matrices.push(MatrixSnapshot {
                matrix: Matrix {
                    id,
                    room_id: row.get(1)?,
                    room_name: row.get(2)?,
                    name: row.get(3)?,
                    rows: rows.iter().map(|row| row.id).collect(),
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                },
                rows,
            });
        }

        Ok(GridSnapshot { columns, matrices })
    }
}

fn insert_row(tx: &Transaction<'_>, row: &Row) -> SnapshotRepoResult<()> {
    tx.execute(
        "INSERT INTO matrix_rows (row_uuid, matrix_uuid, position, label, color)
         VALUES (?1, ?2, ?3, ?4, ?5);",
        params![
            row.id.to_string(),
            row.matrix_id.to_string(),
            row.position as i64,
            row.label,
            row.color,
        ],
    )?;
    for cell in &row.cells {
        tx.execute(
            "INSERT INTO matrix_cells (cell_uuid, row_uuid, column_uuid, value, bound_bin_id)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                cell.id.to_string(),
                row.id.to_string(),
                cell.column_id.to_string(),
                cell.value,
                cell.bound_bin_id,
            ],
        )?;
    }
    Ok(())
}

fn load_columns(conn: &Connection) -> SnapshotRepoResult<Vec<Column>> {
    let mut stmt = conn.prepare(
        "SELECT column_uuid, label, bound_bin_id, bin_label, display_width, created_at
         FROM matrix_columns
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get(0)?;
        columns.push(Column {
            id: parse_uuid(&id_text, "matrix_columns.column_uuid")?,
            label: row.get(1)?,
            bound_bin_id: row.get(2)?,
            bin_label: row.get(3)?,
            display_width: row.get(4)?,
            created_at: row.get(5)?,
        });
    }
    Ok(columns)
}

/// Loads cells grouped by row id, each group in column order.
fn load_cells(conn: &Connection) -> SnapshotRepoResult<HashMap<Uuid, Vec<Cell>>> {
    let mut stmt = conn.prepare(
        "SELECT c.cell_uuid, c.row_uuid, c.column_uuid, c.value, c.bound_bin_id
         FROM matrix_cells c
         INNER JOIN matrix_columns col ON col.column_uuid = c.column_uuid
         ORDER BY c.row_uuid ASC, col.position ASC;",
    )?;
    let mut rows = stmt.query([])?;
    let mut cells: HashMap<Uuid, Vec<Cell>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let cell_id: String = row.get(0)?;
        let row_id: String = row.get(1)?;
        let column_id: String = row.get(2)?;
        let row_id = parse_uuid(&row_id, "matrix_cells.row_uuid")?;
        cells.entry(row_id).or_default().push(Cell {
            id: parse_uuid(&cell_id, "matrix_cells.cell_uuid")?,
            row_id,
            column_id: parse_uuid(&column_id, "matrix_cells.column_uuid")?,
            value: row.get(3)?,
            bound_bin_id: row.get(4)?,
        });
    }
    Ok(cells)
}

/// Loads rows grouped by matrix id in position order, moving their cells
/// out of `cells_by_row`.
fn load_rows(
    conn: &Connection,
    cells_by_row: &mut HashMap<Uuid, Vec<Cell>>,
) -> SnapshotRepoResult<HashMap<Uuid, Vec<Row>>> {
    let mut stmt = conn.prepare(
        "SELECT row_uuid, matrix_uuid, label, color
         FROM matrix_rows
         ORDER BY matrix_uuid ASC, position ASC;",
    )?;
    let mut query = stmt.query([])?;
    let mut rows: HashMap<Uuid, Vec<Row>> = HashMap::new();
    while let Some(row) = query.next()? {
        let row_id: String = row.get(0)?;
        let matrix_id: String = row.get(1)?;
        let row_id = parse_uuid(&row_id, "matrix_rows.row_uuid")?;
        let matrix_id = parse_uuid(&matrix_id, "matrix_rows.matrix_uuid")?;
        let siblings = rows.entry(matrix_id).or_default();
        siblings.push(Row {
            id: row_id,
            matrix_id,
            label: row.get(2)?,
            color: row.get(3)?,
            position: siblings.len(),
            cells: cells_by_row.remove(&row_id).unwrap_or_default(),
        });
    }
    Ok(rows)
}

fn parse_uuid(value: &str, column: &'static str) -> SnapshotRepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| SnapshotRepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}
