//! SQLite persistence for the slotting engine's external state.
//!
//! The grid itself lives in memory; SQLite only holds what outlives a
//! process: the room/bin directory the engine resolves labels against, and
//! the last saved grid snapshot.
//!
//! # Responsibility
//! - Open connections for `SqliteDirectory` and `SqliteSnapshotRepository`
//!   with the schema brought up to date.
//! - Refuse databases written by a newer slotting build instead of reading
//!   snapshot tables whose layout this build does not know.
//!
//! # Invariants
//! - `PRAGMA user_version` is the number of the last applied schema step
//!   (1: directory tables, 2: matrix snapshot tables).
//! - Adapters check that version before their first query.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
