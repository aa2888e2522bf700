//! Core domain logic for the storage-slotting matrix engine.
//! This crate is the single source of truth for grid invariants: every row
//! of every matrix holds exactly one cell per registered column.

pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod grid;
pub mod logging;
pub mod model;
pub mod notify;
pub mod query;
pub mod repo;
pub mod service;

pub use config::{ConfigError, EngineConfig};
pub use directory::{BinDirectory, DirectoryError, InMemoryDirectory, RoomDirectory, SqliteDirectory};
pub use error::{EntityRef, ErrorKind, MatrixError, MatrixResult};
pub use grid::{CascadeGuard, CascadeKind, CascadeStep};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::column::{BinId, Column, ColumnDraft, ColumnId};
pub use model::matrix::{
    Cell, CellId, Matrix, MatrixId, MatrixUpdate, RoomId, Row, RowId, RowSeed, RowUpdate,
};
pub use model::snapshot::{GridSnapshot, MatrixSnapshot};
pub use notify::{
    ChangeEvent, ChangeEventKind, DeliveryPolicy, MemorySink, NotificationSink, SinkError,
};
pub use query::GridView;
pub use repo::snapshot_repo::{
    SnapshotRepoError, SnapshotRepoResult, SnapshotRepository, SqliteSnapshotRepository,
};
pub use service::command::{Command, CommandOutcome};
pub use service::matrix_service::{MatrixEngine, MatrixEngineBuilder};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
