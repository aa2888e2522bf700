//! Matrix engine command service.
//!
//! # Responsibility
//! - Validate and normalize command input, resolve external references and
//!   apply the command to the grid state as one atomic unit.
//! - Publish committed state to readers and emit change events afterwards.
//!
//! # Invariants
//! - Commands are serialized by one writer gate; readers never wait on it.
//! - A command mutates a private copy of the committed state. The copy is
//!   published only after it verified and met its deadline, so a failed or
//!   expired command leaves no trace.
//! - The private copy shares every matrix the command does not write, and
//!   the commit check covers only what the command touched (everything
//!   after a column cascade).
//! - Events are emitted in commit order and only for committed commands.
//! - Directory lookups run before the writer gate is taken.

use crate::config::{ConfigError, EngineConfig};
use crate::directory::{BinDirectory, InMemoryDirectory, RoomDirectory};
use crate::error::{EntityRef, MatrixError, MatrixResult};
use crate::grid::grid_store::{CascadeGuard, NewMatrix};
use crate::grid::state::GridState;
use crate::logging::{sanitize_for_log, MAX_LOGGED_TEXT_CHARS};
use crate::model::column::{BinId, Column, ColumnDraft, ColumnId};
use crate::model::matrix::{Cell, Matrix, MatrixId, MatrixUpdate, Row, RowId, RowSeed, RowUpdate};
use crate::model::normalize::{normalize_color, normalize_external_id, normalize_label};
use crate::model::snapshot::GridSnapshot;
use crate::notify::{
    ChangeEvent, ChangeEventKind, ChangeNotifier, DeliveryPolicy, NotificationSink,
};
use crate::query::GridView;
use crate::service::command::{Command, CommandOutcome};
use log::{error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Builder for [`MatrixEngine`].
///
/// Missing directories default to an empty [`InMemoryDirectory`], so every
/// room and bin resolves to its placeholder.
pub struct MatrixEngineBuilder {
    config: EngineConfig,
    rooms: Option<Arc<dyn RoomDirectory>>,
    bins: Option<Arc<dyn BinDirectory>>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    guard: Option<Arc<dyn CascadeGuard>>,
}

impl Default for MatrixEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            rooms: None,
            bins: None,
            sinks: Vec::new(),
            guard: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn room_directory(mut self, rooms: Arc<dyn RoomDirectory>) -> Self {
        self.rooms = Some(rooms);
        self
    }

    pub fn bin_directory(mut self, bins: Arc<dyn BinDirectory>) -> Self {
        self.bins = Some(bins);
        self
    }

    /// Adds a notification sink; may be called repeatedly.
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Installs a veto hook consulted on every per-row cascade step.
    pub fn cascade_guard(mut self, guard: Arc<dyn CascadeGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Validates the config and starts the engine with empty state.
    pub fn build(self) -> Result<MatrixEngine, ConfigError> {
        self.config.validate()?;
        let rooms = self
            .rooms
            .unwrap_or_else(|| Arc::new(InMemoryDirectory::new()));
        let bins = self.bins.unwrap_or_else(|| Arc::new(InMemoryDirectory::new()));
        let notifier = ChangeNotifier::spawn(
            self.sinks,
            DeliveryPolicy {
                max_attempts: self.config.notify_max_attempts,
                backlog_limit: self.config.notify_backlog_limit,
            },
        );
        info!(
            "event=engine_start module=engine status=ok cascade_guard={}",
            self.guard.is_some()
        );
        Ok(MatrixEngine {
            config: self.config,
            rooms,
            bins,
            guard: self.guard,
            notifier,
            state: RwLock::new(Arc::new(GridState::new())),
            writer: Mutex::new(()),
        })
    }
}

/// Single-writer owner of one scope's columns, matrices, rows and cells.
pub struct MatrixEngine {
    config: EngineConfig,
    rooms: Arc<dyn RoomDirectory>,
    bins: Arc<dyn BinDirectory>,
    guard: Option<Arc<dyn CascadeGuard>>,
    notifier: ChangeNotifier,
    state: RwLock<Arc<GridState>>,
    writer: Mutex<()>,
}

struct PreparedColumn {
    label: String,
    bound_bin_id: Option<BinId>,
    bin_label: Option<String>,
    display_width: Option<u32>,
}

impl MatrixEngine {
    pub fn builder() -> MatrixEngineBuilder {
        MatrixEngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read view over the last committed state.
    pub fn view(&self) -> GridView {
        GridView::new(self.current())
    }

    /// Serializable copy of the last committed state.
    pub fn snapshot(&self) -> MatrixResult<GridSnapshot> {
        self.view().snapshot()
    }

    /// Replaces the whole state with `snapshot`.
    ///
    /// The snapshot is fully verified first; on rejection the current state
    /// stays in place. No change events are emitted.
    pub fn restore(&self, snapshot: GridSnapshot) -> MatrixResult<()> {
        let started_at = Instant::now();
        let matrices = snapshot.matrices.len();
        let result = GridState::from_snapshot(snapshot).map(|state| {
            let _writer = self.lock_writer();
            self.publish(state);
        });
        match &result {
            Ok(()) => info!(
                "event=engine_restore module=engine status=ok matrices={} duration_ms={}",
                matrices,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=engine_restore module=engine status=error error_code={} error={}",
                err.code(),
                err
            ),
        }
        result
    }

    /// Blocks until every event emitted so far reached the sinks.
    pub fn flush_notifications(&self) {
        self.notifier.flush();
    }

    /// Runs one command with an optional deadline.
    ///
    /// `None` falls back to `EngineConfig::default_command_timeout_ms`.
    pub fn execute(
        &self,
        command: Command,
        timeout: Option<Duration>,
    ) -> MatrixResult<CommandOutcome> {
        match command {
            Command::CreateMatrix {
                room_id,
                name,
                rows,
            } => self
                .create_matrix_within(&room_id, &name, rows, timeout)
                .map(CommandOutcome::Matrix),
            Command::UpdateMatrix { matrix_id, update } => self
                .update_matrix_within(matrix_id, update, timeout)
                .map(CommandOutcome::Matrix),
            Command::DeleteMatrix { matrix_id } => self
                .delete_matrix_within(matrix_id, timeout)
                .map(|cells_removed| CommandOutcome::Deleted { cells_removed }),
            Command::AddColumn { draft } => self
                .add_column_within(draft, timeout)
                .map(CommandOutcome::Column),
            Command::UpdateColumn { column_id, draft } => self
                .update_column_within(column_id, draft, timeout)
                .map(CommandOutcome::Column),
            Command::DeleteColumn { column_id } => self
                .delete_column_within(column_id, timeout)
                .map(|cells_removed| CommandOutcome::Deleted { cells_removed }),
            Command::AddRow { matrix_id, seed } => self
                .add_row_within(matrix_id, seed, timeout)
                .map(CommandOutcome::Row),
            Command::UpdateRow {
                matrix_id,
                row_id,
                update,
            } => self
                .update_row_within(matrix_id, row_id, update, timeout)
                .map(CommandOutcome::Row),
            Command::DeleteRow { matrix_id, row_id } => self
                .delete_row_within(matrix_id, row_id, timeout)
                .map(|cells_removed| CommandOutcome::Deleted { cells_removed }),
            Command::MoveRow {
                matrix_id,
                row_id,
                target_index,
            } => self
                .move_row_within(matrix_id, row_id, target_index, timeout)
                .map(CommandOutcome::Row),
            Command::SetCellValue {
                matrix_id,
                row_id,
                column_id,
                value,
            } => self
                .set_cell_value_within(matrix_id, row_id, column_id, &value, timeout)
                .map(CommandOutcome::Cell),
            Command::BindCellBin {
                matrix_id,
                row_id,
                column_id,
                bin_id,
            } => self
                .bind_cell_bin_within(matrix_id, row_id, column_id, bin_id.as_deref(), timeout)
                .map(CommandOutcome::Cell),
        }
    }

    /// Creates a matrix with one complete row per seed.
    ///
    /// An unknown room is stored with the configured placeholder name.
    pub fn create_matrix(
        &self,
        room_id: &str,
        name: &str,
        rows: Vec<RowSeed>,
    ) -> MatrixResult<Matrix> {
        self.create_matrix_within(room_id, name, rows, None)
    }

    pub fn update_matrix(&self, matrix_id: MatrixId, update: MatrixUpdate) -> MatrixResult<Matrix> {
        self.update_matrix_within(matrix_id, update, None)
    }

    /// Deletes a matrix with its rows and cells; returns removed cell count.
    pub fn delete_matrix(&self, matrix_id: MatrixId) -> MatrixResult<usize> {
        self.delete_matrix_within(matrix_id, None)
    }

    /// Registers a column and gives every existing row a blank cell for it.
    pub fn add_column(&self, draft: ColumnDraft) -> MatrixResult<Column> {
        self.add_column_within(draft, None)
    }

    /// Replaces column metadata; cells are untouched.
    pub fn update_column(&self, column_id: ColumnId, draft: ColumnDraft) -> MatrixResult<Column> {
        self.update_column_within(column_id, draft, None)
    }

    /// Removes a column and its cell from every row; returns removed cell count.
    pub fn delete_column(&self, column_id: ColumnId) -> MatrixResult<usize> {
        self.delete_column_within(column_id, None)
    }

    pub fn add_row(&self, matrix_id: MatrixId, seed: RowSeed) -> MatrixResult<Row> {
        self.add_row_within(matrix_id, seed, None)
    }

    pub fn update_row(
        &self,
        matrix_id: MatrixId,
        row_id: RowId,
        update: RowUpdate,
    ) -> MatrixResult<Row> {
        self.update_row_within(matrix_id, row_id, update, None)
    }

    pub fn delete_row(&self, matrix_id: MatrixId, row_id: RowId) -> MatrixResult<usize> {
        self.delete_row_within(matrix_id, row_id, None)
    }

    /// Moves a row to `target_index`, clamped to the matrix's row count.
    pub fn move_row(
        &self,
        matrix_id: MatrixId,
        row_id: RowId,
        target_index: usize,
    ) -> MatrixResult<Row> {
        self.move_row_within(matrix_id, row_id, target_index, None)
    }

    pub fn set_cell_value(
        &self,
        matrix_id: MatrixId,
        row_id: RowId,
        column_id: ColumnId,
        value: &str,
    ) -> MatrixResult<Cell> {
        self.set_cell_value_within(matrix_id, row_id, column_id, value, None)
    }

    /// Binds a cell to a known bin, or unbinds it with `None`.
    pub fn bind_cell_bin(
        &self,
        matrix_id: MatrixId,
        row_id: RowId,
        column_id: ColumnId,
        bin_id: Option<&str>,
    ) -> MatrixResult<Cell> {
        self.bind_cell_bin_within(matrix_id, row_id, column_id, bin_id, None)
    }

    fn create_matrix_within(
        &self,
        room_id: &str,
        name: &str,
        rows: Vec<RowSeed>,
        timeout: Option<Duration>,
    ) -> MatrixResult<Matrix> {
        self.run(
            "create_matrix",
            timeout,
            || {
                let room_id = normalize_external_id(room_id, "room id")?;
                let name = self.label(name, "matrix name")?;
                let rows = rows
                    .into_iter()
                    .map(|seed| self.row_seed(seed))
                    .collect::<MatrixResult<Vec<_>>>()?;
                let room_name = self.resolve_room_name(&room_id)?;
                Ok(NewMatrix {
                    room_id,
                    room_name,
                    name,
                    rows,
                })
            },
            |state, input, now| {
                let matrix = state.create_matrix(input, now)?;
                let cells = matrix.rows.len() * state.list_columns().len();
                let event = ChangeEvent::new(ChangeEventKind::MatrixCreated, now)
                    .matrix(matrix.id)
                    .room(matrix.room_id.clone())
                    .cells(cells);
                Ok((matrix, vec![event]))
            },
        )
    }

    fn update_matrix_within(
        &self,
        matrix_id: MatrixId,
        update: MatrixUpdate,
        timeout: Option<Duration>,
    ) -> MatrixResult<Matrix> {
        self.run(
            "update_matrix",
            timeout,
            || {
                if update.name.is_none() && update.room_id.is_none() {
                    return Err(MatrixError::invalid(
                        "matrix update must change the name or the room",
                    ));
                }
                let name = update
                    .name
                    .as_deref()
                    .map(|name| self.label(name, "matrix name"))
                    .transpose()?;
                let room = match update.room_id.as_deref() {
                    Some(room_id) => {
                        let room_id = normalize_external_id(room_id, "room id")?;
                        let room_name = self.resolve_room_name(&room_id)?;
                        Some((room_id, room_name))
                    }
                    None => None,
                };
                Ok((name, room))
            },
            |state, (name, room), now| {
                let matrix = state.update_matrix(matrix_id, name, room, now)?;
                let event = ChangeEvent::new(ChangeEventKind::MatrixUpdated, now)
                    .matrix(matrix.id)
                    .room(matrix.room_id.clone());
                Ok((matrix, vec![event]))
            },
        )
    }

    fn delete_matrix_within(
        &self,
        matrix_id: MatrixId,
        timeout: Option<Duration>,
    ) -> MatrixResult<usize> {
        self.run(
            "delete_matrix",
            timeout,
            || Ok(()),
            |state, (), now| {
                let room_id = state.get_matrix(matrix_id)?.room_id;
                let removed = state.delete_matrix(matrix_id)?;
                let event = ChangeEvent::new(ChangeEventKind::MatrixDeleted, now)
                    .matrix(matrix_id)
                    .room(room_id)
                    .cells(removed);
                Ok((removed, vec![event]))
            },
        )
    }

    fn add_column_within(
        &self,
        draft: ColumnDraft,
        timeout: Option<Duration>,
    ) -> MatrixResult<Column> {
        self.run(
            "add_column",
            timeout,
            || self.prepare_column(draft),
            |state, prepared, now| {
                let cells_before = state.store().cell_count();
                let column = state.add_column(
                    Column {
                        id: Uuid::new_v4(),
                        label: prepared.label,
                        bound_bin_id: prepared.bound_bin_id,
                        bin_label: prepared.bin_label,
                        display_width: prepared.display_width,
                        created_at: now,
                    },
                    now,
                    self.guard.as_deref(),
                )?;
                let created = state.store().cell_count() - cells_before;
                let event = ChangeEvent::new(ChangeEventKind::ColumnAdded, now)
                    .column(column.id)
                    .cells(created);
                Ok((column, vec![event]))
            },
        )
    }

    fn update_column_within(
        &self,
        column_id: ColumnId,
        draft: ColumnDraft,
        timeout: Option<Duration>,
    ) -> MatrixResult<Column> {
        self.run(
            "update_column",
            timeout,
            || self.prepare_column(draft),
            |state, prepared, now| {
                let column = state.update_column(
                    column_id,
                    prepared.label,
                    prepared.bound_bin_id,
                    prepared.bin_label,
                    prepared.display_width,
                )?;
                let event = ChangeEvent::new(ChangeEventKind::ColumnUpdated, now).column(column.id);
                Ok((column, vec![event]))
            },
        )
    }

    fn delete_column_within(
        &self,
        column_id: ColumnId,
        timeout: Option<Duration>,
    ) -> MatrixResult<usize> {
        self.run(
            "delete_column",
            timeout,
            || Ok(()),
            |state, (), now| {
                let removed = state.delete_column(column_id, now, self.guard.as_deref())?;
                let event = ChangeEvent::new(ChangeEventKind::ColumnDeleted, now)
                    .column(column_id)
                    .cells(removed);
                Ok((removed, vec![event]))
            },
        )
    }

    fn add_row_within(
        &self,
        matrix_id: MatrixId,
        seed: RowSeed,
        timeout: Option<Duration>,
    ) -> MatrixResult<Row> {
        self.run(
            "add_row",
            timeout,
            || self.row_seed(seed),
            |state, seed, now| {
                let row = state.add_row(matrix_id, seed, now)?;
                let event = ChangeEvent::new(ChangeEventKind::RowAdded, now)
                    .matrix(matrix_id)
                    .row(row.id)
                    .cells(row.cells.len());
                Ok((row, vec![event]))
            },
        )
    }

    fn update_row_within(
        &self,
        matrix_id: MatrixId,
        row_id: RowId,
        update: RowUpdate,
        timeout: Option<Duration>,
    ) -> MatrixResult<Row> {
        self.run(
            "update_row",
            timeout,
            || {
                if update.label.is_none() && update.color.is_none() {
                    return Err(MatrixError::invalid(
                        "row update must change the label or the color",
                    ));
                }
                let label = update
                    .label
                    .as_deref()
                    .map(|label| self.label(label, "row label"))
                    .transpose()?;
                let color = update.color.as_deref().map(normalize_color).transpose()?;
                Ok((label, color))
            },
            |state, (label, color), now| {
                let row = state.update_row(matrix_id, row_id, label, color, now)?;
                let event = ChangeEvent::new(ChangeEventKind::RowUpdated, now)
                    .matrix(matrix_id)
                    .row(row_id);
                Ok((row, vec![event]))
            },
        )
    }

    fn delete_row_within(
        &self,
        matrix_id: MatrixId,
        row_id: RowId,
        timeout: Option<Duration>,
    ) -> MatrixResult<usize> {
        self.run(
            "delete_row",
            timeout,
            || Ok(()),
            |state, (), now| {
                let removed = state.delete_row(matrix_id, row_id, now)?;
                let event = ChangeEvent::new(ChangeEventKind::RowDeleted, now)
                    .matrix(matrix_id)
                    .row(row_id)
                    .cells(removed);
                Ok((removed, vec![event]))
            },
        )
    }

    fn move_row_within(
        &self,
        matrix_id: MatrixId,
        row_id: RowId,
        target_index: usize,
        timeout: Option<Duration>,
    ) -> MatrixResult<Row> {
        self.run(
            "move_row",
            timeout,
            || Ok(()),
            |state, (), now| {
                let row = state.move_row(matrix_id, row_id, target_index, now)?;
                let event = ChangeEvent::new(ChangeEventKind::RowUpdated, now)
                    .matrix(matrix_id)
                    .row(row_id);
                Ok((row, vec![event]))
            },
        )
    }

    fn set_cell_value_within(
        &self,
        matrix_id: MatrixId,
        row_id: RowId,
        column_id: ColumnId,
        value: &str,
        timeout: Option<Duration>,
    ) -> MatrixResult<Cell> {
        self.run(
            "set_cell_value",
            timeout,
            || self.cell_value(value),
            |state, value, now| {
                let cell = state.set_cell_value(matrix_id, row_id, column_id, value, now)?;
                let event = ChangeEvent::new(ChangeEventKind::CellUpdated, now)
                    .matrix(matrix_id)
                    .row(row_id)
                    .column(column_id);
                Ok((cell, vec![event]))
            },
        )
    }

    fn bind_cell_bin_within(
        &self,
        matrix_id: MatrixId,
        row_id: RowId,
        column_id: ColumnId,
        bin_id: Option<&str>,
        timeout: Option<Duration>,
    ) -> MatrixResult<Cell> {
        self.run(
            "bind_cell_bin",
            timeout,
            || match bin_id {
                Some(bin_id) => {
                    let bin_id = normalize_external_id(bin_id, "bin id")?;
                    self.ensure_bin_exists(&bin_id)?;
                    Ok(Some(bin_id))
                }
                None => Ok(None),
            },
            |state, bin_id, now| {
                let cell = state.bind_cell_bin(matrix_id, row_id, column_id, bin_id, now)?;
                let event = ChangeEvent::new(ChangeEventKind::CellUpdated, now)
                    .matrix(matrix_id)
                    .row(row_id)
                    .column(column_id);
                Ok((cell, vec![event]))
            },
        )
    }

    /// Runs `prepare` outside the writer gate, then `apply` on a private
    /// copy of the committed state, and publishes the copy on success.
    fn run<P, T>(
        &self,
        operation: &'static str,
        timeout: Option<Duration>,
        prepare: impl FnOnce() -> MatrixResult<P>,
        apply: impl FnOnce(&mut GridState, P, i64) -> MatrixResult<(T, Vec<ChangeEvent>)>,
    ) -> MatrixResult<T> {
        let started_at = Instant::now();
        let timeout = timeout.or_else(|| self.config.default_command_timeout());
        let result = prepare().and_then(|input| {
            let _writer = self.lock_writer();
            let mut next = GridState::clone(&self.current());
            let (value, events) = apply(&mut next, input, epoch_millis())?;
            next.verify_changes()?;
            check_deadline(operation, started_at, timeout)?;
            self.publish(next);
            for event in events {
                self.notifier.emit(event);
            }
            Ok(value)
        });

        let duration_ms = started_at.elapsed().as_millis();
        match &result {
            Ok(_) => info!(
                "event=command module=engine status=ok op={} duration_ms={}",
                operation, duration_ms
            ),
            Err(err) if err.is_user_error() => warn!(
                "event=command module=engine status=error op={} duration_ms={} error_code={} error={}",
                operation,
                duration_ms,
                err.code(),
                sanitize_for_log(&err.to_string(), MAX_LOGGED_TEXT_CHARS)
            ),
            Err(err) => error!(
                "event=command module=engine status=error op={} duration_ms={} error_code={} error={}",
                operation,
                duration_ms,
                err.code(),
                sanitize_for_log(&err.to_string(), MAX_LOGGED_TEXT_CHARS)
            ),
        }
        result
    }

    fn current(&self) -> Arc<GridState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, next: GridState) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(next);
    }

    // Committed state is only ever replaced whole, so a gate poisoned by a
    // panicking command still guards consistent state.
    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn label(&self, value: &str, field: &str) -> MatrixResult<String> {
        normalize_label(value, field, self.config.max_label_chars)
    }

    fn row_seed(&self, seed: RowSeed) -> MatrixResult<RowSeed> {
        Ok(RowSeed {
            label: self.label(&seed.label, "row label")?,
            color: normalize_color(&seed.color)?,
        })
    }

    fn cell_value(&self, value: &str) -> MatrixResult<String> {
        let trimmed = value.trim();
        let length = trimmed.chars().count();
        if length > self.config.max_label_chars {
            return Err(MatrixError::invalid(format!(
                "cell value is {length} characters; at most {} allowed",
                self.config.max_label_chars
            )));
        }
        Ok(trimmed.to_string())
    }

    fn prepare_column(&self, draft: ColumnDraft) -> MatrixResult<PreparedColumn> {
        let label = self.label(&draft.label, "column label")?;
        if draft.display_width == Some(0) {
            return Err(MatrixError::invalid(
                "column display width must be greater than zero",
            ));
        }
        let (bound_bin_id, bin_label) = match draft.bound_bin_id.as_deref() {
            Some(bin_id) => {
                let bin_id = normalize_external_id(bin_id, "bin id")?;
                let bin_label = self.resolve_bin_label(&bin_id)?;
                (Some(bin_id), Some(bin_label))
            }
            None => (None, None),
        };
        Ok(PreparedColumn {
            label,
            bound_bin_id,
            bin_label,
            display_width: draft.display_width,
        })
    }

    fn resolve_room_name(&self, room_id: &str) -> MatrixResult<String> {
        match self.rooms.resolve_room_name(room_id) {
            Ok(Some(name)) => Ok(name),
            Ok(None) => {
                warn!(
                    "event=room_resolve module=engine status=fallback room_id={}",
                    room_id
                );
                Ok(self.config.unknown_room_label.clone())
            }
            Err(err) => Err(MatrixError::DirectoryUnavailable(format!(
                "room lookup failed: {err}"
            ))),
        }
    }

    fn resolve_bin_label(&self, bin_id: &str) -> MatrixResult<String> {
        match self.bins.resolve_bin_label(bin_id) {
            Ok(Some(label)) => Ok(label),
            Ok(None) => {
                warn!(
                    "event=bin_resolve module=engine status=fallback bin_id={}",
                    bin_id
                );
                Ok(self.config.unknown_bin_label.clone())
            }
            Err(err) => Err(MatrixError::DirectoryUnavailable(format!(
                "bin lookup failed: {err}"
            ))),
        }
    }

    fn ensure_bin_exists(&self, bin_id: &str) -> MatrixResult<()> {
        match self.bins.resolve_bin_label(bin_id) {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(MatrixError::NotFound(EntityRef::Bin(bin_id.to_string()))),
            Err(err) => Err(MatrixError::DirectoryUnavailable(format!(
                "bin lookup failed: {err}"
            ))),
        }
    }
}

fn check_deadline(
    operation: &'static str,
    started_at: Instant,
    timeout: Option<Duration>,
) -> MatrixResult<()> {
    match timeout {
        Some(limit) if started_at.elapsed() > limit => Err(MatrixError::Timeout {
            operation,
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
        _ => Ok(()),
    }
}

fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{check_deadline, MatrixEngine};
    use crate::config::EngineConfig;
    use crate::error::{ErrorKind, MatrixError};
    use crate::model::column::ColumnDraft;
    use crate::model::matrix::{MatrixUpdate, RowSeed, RowUpdate};
    use std::time::{Duration, Instant};

    #[test]
    fn deadline_is_only_enforced_when_set() {
        let started_at = Instant::now() - Duration::from_millis(50);
        assert!(check_deadline("add_row", started_at, None).is_ok());
        assert!(check_deadline("add_row", started_at, Some(Duration::from_secs(5))).is_ok());
        let err = check_deadline("add_row", started_at, Some(Duration::from_millis(10)))
            .unwrap_err();
        assert_eq!(
            err,
            MatrixError::Timeout {
                operation: "add_row",
                timeout_ms: 10
            }
        );
    }

    #[test]
    fn build_rejects_invalid_config() {
        let config = EngineConfig {
            max_label_chars: 0,
            ..EngineConfig::default()
        };
        assert!(MatrixEngine::builder().config(config).build().is_err());
    }

    #[test]
    fn empty_updates_are_invalid_arguments() {
        let engine = MatrixEngine::builder().build().unwrap();
        let matrix = engine
            .create_matrix("R1", "Unit A", vec![RowSeed::new("Shelf1", "")])
            .unwrap();

        let err = engine
            .update_matrix(matrix.id, MatrixUpdate::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = engine
            .update_row(matrix.id, matrix.rows[0], RowUpdate::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn zero_display_width_is_rejected() {
        let engine = MatrixEngine::builder().build().unwrap();
        let err = engine
            .add_column(ColumnDraft::new("Bin1").width(0))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(engine.view().columns().is_empty());
    }

    #[test]
    fn labels_are_normalized_before_commit() {
        let engine = MatrixEngine::builder().build().unwrap();
        let column = engine.add_column(ColumnDraft::new("  Bin   1 ")).unwrap();
        assert_eq!(column.label, "Bin 1");

        let matrix = engine
            .create_matrix(" R1 ", " Unit  A ", vec![RowSeed::new("Shelf1", "#ABC")])
            .unwrap();
        assert_eq!(matrix.room_id, "R1");
        assert_eq!(matrix.name, "Unit A");
        let rows = engine.view().rows_of(matrix.id).unwrap();
        assert_eq!(rows[0].color, "#abc");
    }
}
