//! SQLite-backed room/bin directory.
//!
//! # Invariants
//! - The wrapped connection is migrated to the latest schema version.
//! - Lookups are single-row primary-key reads; no lookup writes.

use crate::db::migrations::{latest_version, schema_version};
use crate::directory::{BinDirectory, DirectoryError, RoomDirectory};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard};

/// Room/bin lookups over the `rooms` and `bins` tables.
pub struct SqliteDirectory {
    conn: Mutex<Connection>,
}

impl SqliteDirectory {
    /// Wraps a migrated connection (see `db::open_db`).
    pub fn try_new(conn: Connection) -> Result<Self, DirectoryError> {
        let expected_version = latest_version();
        let actual_version =
            schema_version(&conn).map_err(|err| DirectoryError(err.to_string()))?;
        if actual_version != expected_version {
            return Err(DirectoryError(format!(
                "directory requires schema version {expected_version}, got {actual_version}"
            )));
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Inserts or renames one room.
    pub fn upsert_room(&self, room_id: &str, display_name: &str) -> Result<(), DirectoryError> {
        self.lock()?
            .execute(
                "INSERT INTO rooms (room_id, display_name)
                 VALUES (?1, ?2)
                 ON CONFLICT(room_id) DO UPDATE SET display_name = excluded.display_name;",
                params![room_id, display_name],
            )
            .map_err(sqlite_error)?;
        Ok(())
    }

    /// Inserts or relabels one bin, optionally attached to a room.
    pub fn upsert_bin(
        &self,
        bin_id: &str,
        room_id: Option<&str>,
        label: &str,
    ) -> Result<(), DirectoryError> {
        self.lock()?
            .execute(
                "INSERT INTO bins (bin_id, room_id, label)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(bin_id) DO UPDATE SET
                    room_id = excluded.room_id,
                    label = excluded.label;",
                params![bin_id, room_id, label],
            )
            .map_err(sqlite_error)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DirectoryError> {
        self.conn
            .lock()
            .map_err(|_| DirectoryError("directory connection lock poisoned".to_string()))
    }
}

impl RoomDirectory for SqliteDirectory {
    fn resolve_room_name(&self, room_id: &str) -> Result<Option<String>, DirectoryError> {
        self.lock()?
            .query_row(
                "SELECT display_name FROM rooms WHERE room_id = ?1;",
                [room_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(sqlite_error)
    }
}

impl BinDirectory for SqliteDirectory {
    fn resolve_bin_label(&self, bin_id: &str) -> Result<Option<String>, DirectoryError> {
        self.lock()?
            .query_row(
                "SELECT label FROM bins WHERE bin_id = ?1;",
                [bin_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(sqlite_error)
    }
}

fn sqlite_error(err: rusqlite::Error) -> DirectoryError {
    DirectoryError(format!("directory query failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::SqliteDirectory;
    use crate::db::open_db_in_memory;
    use crate::directory::{BinDirectory, RoomDirectory};
    use rusqlite::Connection;

    #[test]
    fn resolves_rooms_and_bins_after_upsert() {
        let directory = SqliteDirectory::try_new(open_db_in_memory().unwrap()).unwrap();
        directory.upsert_room("R1", "Cold Room").unwrap();
        directory.upsert_bin("B1", Some("R1"), "Bay 1").unwrap();

        assert_eq!(
            directory.resolve_room_name("R1").unwrap().as_deref(),
            Some("Cold Room")
        );
        assert_eq!(directory.resolve_room_name("R2").unwrap(), None);
        assert_eq!(
            directory.resolve_bin_label("B1").unwrap().as_deref(),
            Some("Bay 1")
        );

        directory.upsert_room("R1", "Freezer").unwrap();
        assert_eq!(
            directory.resolve_room_name("R1").unwrap().as_deref(),
            Some("Freezer")
        );
    }

    #[test]
    fn rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().unwrap();
        let err = SqliteDirectory::try_new(conn).err().expect("must reject");
        assert!(err.0.contains("schema version"));
    }
}
