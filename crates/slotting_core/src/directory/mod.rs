//! Read-only lookups against external room and bin records.
//!
//! # Responsibility
//! - Define the collaborator contracts the engine consults at command time.
//! - Provide in-memory and SQLite-backed implementations.
//!
//! # Invariants
//! - `Ok(None)` means "unknown id"; the engine decides how lenient to be.
//! - `Err(_)` means the lookup itself failed; the command must not apply.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryDirectory;
pub use sqlite::SqliteDirectory;

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Directory lookup failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryError(pub String);

impl Display for DirectoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for DirectoryError {}

/// Resolves room ids to display names.
pub trait RoomDirectory: Send + Sync {
    fn resolve_room_name(&self, room_id: &str) -> Result<Option<String>, DirectoryError>;
}

/// Resolves bin ids to display labels.
pub trait BinDirectory: Send + Sync {
    fn resolve_bin_label(&self, bin_id: &str) -> Result<Option<String>, DirectoryError>;
}
