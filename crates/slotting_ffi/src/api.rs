//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose matrix commands and queries to Dart via FRB as flat DTOs.
//! - Map engine errors to stable `error_code` strings.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Every response carries `ok`; failures carry `error_code` and `message`.
//! - Ids cross the boundary as hyphenated UUID strings.

use log::warn;
use slotting_core::db::open_db;
use slotting_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    Column, ColumnDraft, Command, CommandOutcome, EngineConfig, Matrix, MatrixEngine, MatrixError,
    MatrixUpdate, Row, RowSeed, RowUpdate, SnapshotRepository, SqliteDirectory,
    SqliteSnapshotRepository,
};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uuid::Uuid;

const SLOTTING_DB_FILE_NAME: &str = "slotting.sqlite3";
const SLOTTING_DB_PATH_ENV: &str = "SLOTTING_DB_PATH";
const ERROR_CODE_STORE: &str = "store_unavailable";

static SLOTTING_DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static ENGINE: OnceLock<Result<FfiEngine, String>> = OnceLock::new();

struct FfiEngine {
    engine: MatrixEngine,
    directory: Arc<SqliteDirectory>,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Initial row for `matrix_create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSeedInput {
    pub label: String,
    /// `#rgb`, `#rrggbb`, a color name, or empty.
    pub color: String,
}

/// Generic command response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixActionResponse {
    pub ok: bool,
    /// Id of the created/updated entity, when the command returns one.
    pub entity_id: Option<String>,
    /// Cells removed by a delete command.
    pub cells_removed: Option<u32>,
    /// `not_found|invalid_argument|invariant_violation|directory_unavailable|timeout|store_unavailable`.
    pub error_code: Option<String>,
    pub message: String,
}

impl MatrixActionResponse {
    fn success(message: impl Into<String>, entity_id: Option<String>) -> Self {
        Self {
            ok: true,
            entity_id,
            cells_removed: None,
            error_code: None,
            message: message.into(),
        }
    }

    fn failure(error_code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            entity_id: None,
            cells_removed: None,
            error_code: Some(error_code.to_string()),
            message: message.into(),
        }
    }
}

/// Matrix summary row for list screens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixItem {
    pub matrix_id: String,
    pub room_id: String,
    pub room_name: String,
    pub name: String,
    pub row_count: u32,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnItem {
    pub column_id: String,
    pub label: String,
    pub bound_bin_id: Option<String>,
    pub bin_label: Option<String>,
    pub display_width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellItem {
    pub cell_id: String,
    pub column_id: String,
    pub value: String,
    pub bound_bin_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowItem {
    pub row_id: String,
    pub label: String,
    pub color: String,
    pub position: u32,
    /// One cell per column, in column order.
    pub cells: Vec<CellItem>,
}

/// Matrix list response; `items` is empty on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixListResponse {
    pub ok: bool,
    pub items: Vec<MatrixItem>,
    pub error_code: Option<String>,
    pub message: String,
}

/// Row list response; `items` is empty on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowListResponse {
    pub ok: bool,
    pub items: Vec<RowItem>,
    pub error_code: Option<String>,
    pub message: String,
}

/// Column list response; `items` is empty on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnListResponse {
    pub ok: bool,
    pub items: Vec<ColumnItem>,
    pub error_code: Option<String>,
    pub message: String,
}

/// Cell value lookup response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellValueResponse {
    pub ok: bool,
    pub value: Option<String>,
    pub error_code: Option<String>,
    pub message: String,
}

/// Registers or renames a room in the local directory.
#[flutter_rust_bridge::frb(sync)]
pub fn directory_upsert_room(room_id: String, display_name: String) -> MatrixActionResponse {
    with_engine_action("directory_upsert_room", |ffi| {
        ffi.directory
            .upsert_room(room_id.trim(), display_name.trim())
            .map(|()| MatrixActionResponse::success("Room saved.", Some(room_id.trim().to_string())))
            .map_err(|err| MatrixActionResponse::failure("directory_unavailable", err.to_string()))
    })
}

/// Registers or relabels a bin in the local directory.
#[flutter_rust_bridge::frb(sync)]
pub fn directory_upsert_bin(
    bin_id: String,
    room_id: Option<String>,
    label: String,
) -> MatrixActionResponse {
    with_engine_action("directory_upsert_bin", |ffi| {
        ffi.directory
            .upsert_bin(bin_id.trim(), room_id.as_deref().map(str::trim), label.trim())
            .map(|()| MatrixActionResponse::success("Bin saved.", Some(bin_id.trim().to_string())))
            .map_err(|err| MatrixActionResponse::failure("directory_unavailable", err.to_string()))
    })
}

/// Creates a matrix in `room_id` with the given initial rows.
///
/// # FFI contract
/// - Sync call; `timeout_ms` bounds the whole command.
/// - Returns the new matrix id on success.
#[flutter_rust_bridge::frb(sync)]
pub fn matrix_create(
    room_id: String,
    name: String,
    rows: Vec<RowSeedInput>,
    timeout_ms: Option<u32>,
) -> MatrixActionResponse {
    let rows = rows
        .into_iter()
        .map(|row| RowSeed::new(row.label, row.color))
        .collect();
    run_command(
        Command::CreateMatrix {
            room_id,
            name,
            rows,
        },
        timeout_ms,
    )
}

/// Renames a matrix and/or moves it to another room.
#[flutter_rust_bridge::frb(sync)]
pub fn matrix_update(
    matrix_id: String,
    name: Option<String>,
    room_id: Option<String>,
    timeout_ms: Option<u32>,
) -> MatrixActionResponse {
    let matrix_id = match parse_id(&matrix_id, "matrix_id") {
        Ok(id) => id,
        Err(response) => return response,
    };
    run_command(
        Command::UpdateMatrix {
            matrix_id,
            update: MatrixUpdate { name, room_id },
        },
        timeout_ms,
    )
}

#[flutter_rust_bridge::frb(sync)]
pub fn matrix_delete(matrix_id: String, timeout_ms: Option<u32>) -> MatrixActionResponse {
    let matrix_id = match parse_id(&matrix_id, "matrix_id") {
        Ok(id) => id,
        Err(response) => return response,
    };
    run_command(Command::DeleteMatrix { matrix_id }, timeout_ms)
}

/// Adds a column to every matrix.
#[flutter_rust_bridge::frb(sync)]
pub fn column_add(
    label: String,
    bound_bin_id: Option<String>,
    display_width: Option<u32>,
    timeout_ms: Option<u32>,
) -> MatrixActionResponse {
    run_command(
        Command::AddColumn {
            draft: column_draft(label, bound_bin_id, display_width),
        },
        timeout_ms,
    )
}

/// Replaces column metadata.
#[flutter_rust_bridge::frb(sync)]
pub fn column_update(
    column_id: String,
    label: String,
    bound_bin_id: Option<String>,
    display_width: Option<u32>,
    timeout_ms: Option<u32>,
) -> MatrixActionResponse {
    let column_id = match parse_id(&column_id, "column_id") {
        Ok(id) => id,
        Err(response) => return response,
    };
    run_command(
        Command::UpdateColumn {
            column_id,
            draft: column_draft(label, bound_bin_id, display_width),
        },
        timeout_ms,
    )
}

#[flutter_rust_bridge::frb(sync)]
pub fn column_delete(column_id: String, timeout_ms: Option<u32>) -> MatrixActionResponse {
    let column_id = match parse_id(&column_id, "column_id") {
        Ok(id) => id,
        Err(response) => return response,
    };
    run_command(Command::DeleteColumn { column_id }, timeout_ms)
}

#[flutter_rust_bridge::frb(sync)]
pub fn row_add(
    matrix_id: String,
    label: String,
    color: String,
    timeout_ms: Option<u32>,
) -> MatrixActionResponse {
    let matrix_id = match parse_id(&matrix_id, "matrix_id") {
        Ok(id) => id,
        Err(response) => return response,
    };
    run_command(
        Command::AddRow {
            matrix_id,
            seed: RowSeed::new(label, color),
        },
        timeout_ms,
    )
}

#[flutter_rust_bridge::frb(sync)]
pub fn row_update(
    matrix_id: String,
    row_id: String,
    label: Option<String>,
    color: Option<String>,
    timeout_ms: Option<u32>,
) -> MatrixActionResponse {
    let (matrix_id, row_id) = match parse_row_ref(&matrix_id, &row_id) {
        Ok(ids) => ids,
        Err(response) => return response,
    };
    run_command(
        Command::UpdateRow {
            matrix_id,
            row_id,
            update: RowUpdate { label, color },
        },
        timeout_ms,
    )
}

#[flutter_rust_bridge::frb(sync)]
pub fn row_delete(matrix_id: String, row_id: String, timeout_ms: Option<u32>) -> MatrixActionResponse {
    let (matrix_id, row_id) = match parse_row_ref(&matrix_id, &row_id) {
        Ok(ids) => ids,
        Err(response) => return response,
    };
    run_command(Command::DeleteRow { matrix_id, row_id }, timeout_ms)
}

/// Moves a row to `target_index` (clamped to the row count).
#[flutter_rust_bridge::frb(sync)]
pub fn row_move(
    matrix_id: String,
    row_id: String,
    target_index: u32,
    timeout_ms: Option<u32>,
) -> MatrixActionResponse {
    let (matrix_id, row_id) = match parse_row_ref(&matrix_id, &row_id) {
        Ok(ids) => ids,
        Err(response) => return response,
    };
    run_command(
        Command::MoveRow {
            matrix_id,
            row_id,
            target_index: target_index as usize,
        },
        timeout_ms,
    )
}

#[flutter_rust_bridge::frb(sync)]
pub fn cell_set_value(
    matrix_id: String,
    row_id: String,
    column_id: String,
    value: String,
    timeout_ms: Option<u32>,
) -> MatrixActionResponse {
    let (matrix_id, row_id, column_id) = match parse_cell_ref(&matrix_id, &row_id, &column_id) {
        Ok(ids) => ids,
        Err(response) => return response,
    };
    run_command(
        Command::SetCellValue {
            matrix_id,
            row_id,
            column_id,
            value,
        },
        timeout_ms,
    )
}

/// Binds a cell to a known bin; `None` unbinds it.
#[flutter_rust_bridge::frb(sync)]
pub fn cell_bind_bin(
    matrix_id: String,
    row_id: String,
    column_id: String,
    bin_id: Option<String>,
    timeout_ms: Option<u32>,
) -> MatrixActionResponse {
    let (matrix_id, row_id, column_id) = match parse_cell_ref(&matrix_id, &row_id, &column_id) {
        Ok(ids) => ids,
        Err(response) => return response,
    };
    run_command(
        Command::BindCellBin {
            matrix_id,
            row_id,
            column_id,
            bin_id,
        },
        timeout_ms,
    )
}

/// Lists matrices of one room ordered by creation time.
#[flutter_rust_bridge::frb(sync)]
pub fn matrix_list_by_room(room_id: String) -> MatrixListResponse {
    match engine() {
        Ok(ffi) => {
            let items = ffi
                .engine
                .view()
                .matrices_for_room(&room_id)
                .iter()
                .map(to_matrix_item)
                .collect::<Vec<_>>();
            MatrixListResponse {
                ok: true,
                message: found_message(items.len()),
                items,
                error_code: None,
            }
        }
        Err(err) => MatrixListResponse {
            ok: false,
            items: Vec::new(),
            error_code: Some(ERROR_CODE_STORE.to_string()),
            message: err,
        },
    }
}

/// Lists a matrix's rows in position order.
#[flutter_rust_bridge::frb(sync)]
pub fn matrix_rows(matrix_id: String) -> RowListResponse {
    let failure = |error_code: &str, message: String| RowListResponse {
        ok: false,
        items: Vec::new(),
        error_code: Some(error_code.to_string()),
        message,
    };
    let matrix_id = match parse_id(&matrix_id, "matrix_id") {
        Ok(id) => id,
        Err(response) => return failure("invalid_argument", response.message),
    };
    let ffi = match engine() {
        Ok(ffi) => ffi,
        Err(err) => return failure(ERROR_CODE_STORE, err),
    };
    match ffi.engine.view().rows_of(matrix_id) {
        Ok(rows) => RowListResponse {
            ok: true,
            message: found_message(rows.len()),
            items: rows.iter().map(to_row_item).collect(),
            error_code: None,
        },
        Err(err) => failure(err.code(), err.to_string()),
    }
}

/// Lists columns in creation order.
#[flutter_rust_bridge::frb(sync)]
pub fn column_list() -> ColumnListResponse {
    match engine() {
        Ok(ffi) => {
            let items = ffi
                .engine
                .view()
                .columns()
                .iter()
                .map(to_column_item)
                .collect::<Vec<_>>();
            ColumnListResponse {
                ok: true,
                message: found_message(items.len()),
                items,
                error_code: None,
            }
        }
        Err(err) => ColumnListResponse {
            ok: false,
            items: Vec::new(),
            error_code: Some(ERROR_CODE_STORE.to_string()),
            message: err,
        },
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn cell_get_value(matrix_id: String, row_id: String, column_id: String) -> CellValueResponse {
    let failure = |error_code: &str, message: String| CellValueResponse {
        ok: false,
        value: None,
        error_code: Some(error_code.to_string()),
        message,
    };
    let (matrix_id, row_id, column_id) = match parse_cell_ref(&matrix_id, &row_id, &column_id) {
        Ok(ids) => ids,
        Err(response) => {
            return failure(
                response.error_code.as_deref().unwrap_or("invalid_argument"),
                response.message,
            )
        }
    };
    let ffi = match engine() {
        Ok(ffi) => ffi,
        Err(err) => return failure(ERROR_CODE_STORE, err),
    };
    match ffi.engine.view().cell(matrix_id, row_id, column_id) {
        Ok(value) => CellValueResponse {
            ok: true,
            value: Some(value),
            error_code: None,
            message: "Cell found.".to_string(),
        },
        Err(err) => failure(err.code(), err.to_string()),
    }
}

/// Writes the committed engine state to the SQLite store.
#[flutter_rust_bridge::frb(sync)]
pub fn snapshot_save() -> MatrixActionResponse {
    with_engine_action("snapshot_save", |ffi| {
        let snapshot = ffi
            .engine
            .snapshot()
            .map_err(|err| MatrixActionResponse::failure(err.code(), err.to_string()))?;
        let conn = open_db(resolve_slotting_db_path()).map_err(store_failure)?;
        let repo = SqliteSnapshotRepository::try_new(&conn).map_err(store_failure)?;
        repo.save_snapshot(&snapshot).map_err(store_failure)?;
        Ok(MatrixActionResponse::success(
            format!("Saved {} matrices.", snapshot.matrices.len()),
            None,
        ))
    })
}

/// Replaces the engine state with the snapshot stored in SQLite.
#[flutter_rust_bridge::frb(sync)]
pub fn snapshot_load() -> MatrixActionResponse {
    with_engine_action("snapshot_load", |ffi| {
        let conn = open_db(resolve_slotting_db_path()).map_err(store_failure)?;
        let repo = SqliteSnapshotRepository::try_new(&conn).map_err(store_failure)?;
        let snapshot = repo.load_snapshot().map_err(store_failure)?;
        let matrices = snapshot.matrices.len();
        ffi.engine
            .restore(snapshot)
            .map_err(|err| MatrixActionResponse::failure(err.code(), err.to_string()))?;
        Ok(MatrixActionResponse::success(
            format!("Loaded {matrices} matrices."),
            None,
        ))
    })
}

fn run_command(command: Command, timeout_ms: Option<u32>) -> MatrixActionResponse {
    let operation = command.name();
    let timeout = timeout_ms.map(|ms| Duration::from_millis(u64::from(ms)));
    with_engine_action(operation, |ffi| {
        ffi.engine
            .execute(command, timeout)
            .map(to_action_response)
            .map_err(|err| command_failure(operation, &err))
    })
}

fn with_engine_action(
    operation: &str,
    f: impl FnOnce(&FfiEngine) -> Result<MatrixActionResponse, MatrixActionResponse>,
) -> MatrixActionResponse {
    match engine() {
        Ok(ffi) => f(ffi).unwrap_or_else(|failure| failure),
        Err(err) => {
            MatrixActionResponse::failure(ERROR_CODE_STORE, format!("{operation} failed: {err}"))
        }
    }
}

fn engine() -> Result<&'static FfiEngine, String> {
    ENGINE
        .get_or_init(|| build_engine(resolve_slotting_db_path()))
        .as_ref()
        .map_err(Clone::clone)
}

fn build_engine(db_path: PathBuf) -> Result<FfiEngine, String> {
    let conn = open_db(&db_path).map_err(|err| format!("slotting DB open failed: {err}"))?;
    let directory = Arc::new(
        SqliteDirectory::try_new(conn).map_err(|err| format!("directory init failed: {err}"))?,
    );
    let engine = MatrixEngine::builder()
        .config(EngineConfig::default())
        .room_directory(directory.clone())
        .bin_directory(directory.clone())
        .build()
        .map_err(|err| format!("engine init failed: {err}"))?;

    let conn = open_db(&db_path).map_err(|err| format!("slotting DB open failed: {err}"))?;
    let snapshot = SqliteSnapshotRepository::try_new(&conn)
        .and_then(|repo| repo.load_snapshot())
        .map_err(|err| format!("snapshot load failed: {err}"))?;
    engine
        .restore(snapshot)
        .map_err(|err| format!("stored snapshot rejected: {err}"))?;
    Ok(FfiEngine { engine, directory })
}

fn resolve_slotting_db_path() -> PathBuf {
    SLOTTING_DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var(SLOTTING_DB_PATH_ENV) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(SLOTTING_DB_FILE_NAME)
        })
        .clone()
}

fn to_action_response(outcome: CommandOutcome) -> MatrixActionResponse {
    match outcome {
        CommandOutcome::Matrix(matrix) => {
            MatrixActionResponse::success("Matrix saved.", Some(matrix.id.to_string()))
        }
        CommandOutcome::Column(column) => {
            MatrixActionResponse::success("Column saved.", Some(column.id.to_string()))
        }
        CommandOutcome::Row(row) => {
            MatrixActionResponse::success("Row saved.", Some(row.id.to_string()))
        }
        CommandOutcome::Cell(cell) => {
            MatrixActionResponse::success("Cell saved.", Some(cell.id.to_string()))
        }
        CommandOutcome::Deleted { cells_removed } => MatrixActionResponse {
            cells_removed: Some(u32::try_from(cells_removed).unwrap_or(u32::MAX)),
            ..MatrixActionResponse::success("Deleted.", None)
        },
    }
}

fn command_failure(operation: &str, err: &MatrixError) -> MatrixActionResponse {
    if !err.is_user_error() {
        warn!(
            "event=ffi_command module=ffi status=error op={} error_code={}",
            operation,
            err.code()
        );
    }
    MatrixActionResponse::failure(err.code(), format!("{operation} failed: {err}"))
}

fn found_message(count: usize) -> String {
    if count == 0 {
        "No results.".to_string()
    } else {
        format!("Found {count} result(s).")
    }
}

fn store_failure(err: impl std::fmt::Display) -> MatrixActionResponse {
    MatrixActionResponse::failure(ERROR_CODE_STORE, err.to_string())
}

fn column_draft(
    label: String,
    bound_bin_id: Option<String>,
    display_width: Option<u32>,
) -> ColumnDraft {
    ColumnDraft {
        label,
        bound_bin_id,
        display_width,
    }
}

fn parse_id(value: &str, field: &str) -> Result<Uuid, MatrixActionResponse> {
    Uuid::parse_str(value.trim()).map_err(|_| {
        MatrixActionResponse::failure(
            "invalid_argument",
            format!("{field} `{value}` is not a valid id"),
        )
    })
}

fn parse_row_ref(matrix_id: &str, row_id: &str) -> Result<(Uuid, Uuid), MatrixActionResponse> {
    Ok((parse_id(matrix_id, "matrix_id")?, parse_id(row_id, "row_id")?))
}

fn parse_cell_ref(
    matrix_id: &str,
    row_id: &str,
    column_id: &str,
) -> Result<(Uuid, Uuid, Uuid), MatrixActionResponse> {
    Ok((
        parse_id(matrix_id, "matrix_id")?,
        parse_id(row_id, "row_id")?,
        parse_id(column_id, "column_id")?,
    ))
}

fn to_matrix_item(matrix: &Matrix) -> MatrixItem {
    MatrixItem {
        matrix_id: matrix.id.to_string(),
        room_id: matrix.room_id.clone(),
        room_name: matrix.room_name.clone(),
        name: matrix.name.clone(),
        row_count: u32::try_from(matrix.rows.len()).unwrap_or(u32::MAX),
        updated_at: matrix.updated_at,
    }
}

fn to_column_item(column: &Column) -> ColumnItem {
    ColumnItem {
        column_id: column.id.to_string(),
        label: column.label.clone(),
        bound_bin_id: column.bound_bin_id.clone(),
        bin_label: column.bin_label.clone(),
        display_width: column.display_width,
    }
}

fn to_row_item(row: &Row) -> RowItem {
    RowItem {
        row_id: row.id.to_string(),
        label: row.label.clone(),
        color: row.color.clone(),
        position: u32::try_from(row.position).unwrap_or(u32::MAX),
        cells: row
            .cells
            .iter()
            .map(|cell| CellItem {
                cell_id: cell.id.to_string(),
                column_id: cell.column_id.to_string(),
                value: cell.value.clone(),
                bound_bin_id: cell.bound_bin_id.clone(),
            })
            .collect(),
    }
}
