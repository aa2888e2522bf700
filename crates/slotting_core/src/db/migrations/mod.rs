//! Ordered schema steps for the slotting database.
//!
//! # Schema history
//! - v1 `directory`: `rooms` and `bins`, the lookup tables behind
//!   `SqliteDirectory`. Bins may name the room they stand in.
//! - v2 `matrix_snapshot`: `matrix_columns`, `matrices`, `matrix_rows` and
//!   `matrix_cells`, the replace-on-save image written by
//!   `SqliteSnapshotRepository`. Rows and cells cascade with their parent so
//!   a partial snapshot cannot survive a delete.
//!
//! # Invariants
//! - Versions start at 1 and increase by one per step.
//! - Every pending step and its `user_version` bump commit together; an
//!   interrupted upgrade leaves the previous version intact.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "directory",
        sql: include_str!("0001_directory.sql"),
    },
    Migration {
        version: 2,
        name: "matrix_snapshot",
        sql: include_str!("0002_matrix_snapshot.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Brings `conn` up to [`latest_version`].
///
/// Fails with [`DbError::UnsupportedSchemaVersion`] when the database was
/// written by a newer build.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current_version = schema_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }
    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current_version)
    {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
        info!(
            "event=db_migrate module=db status=ok version={} migration={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;
    Ok(())
}

/// Schema step recorded in the database, 0 for a fresh file.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, latest_version, schema_version, MIGRATIONS};
    use rusqlite::Connection;

    #[test]
    fn versions_count_up_from_one() {
        for (index, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version as usize, index + 1, "{}", migration.name);
        }
        assert_eq!(latest_version(), MIGRATIONS.len() as u32);
    }

    #[test]
    fn directory_only_database_gains_snapshot_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0].sql).unwrap();
        conn.execute_batch("PRAGMA user_version = 1;").unwrap();
        conn.execute(
            "INSERT INTO rooms (room_id, display_name) VALUES ('R1', 'Room 1');",
            [],
        )
        .unwrap();

        apply_migrations(&mut conn).unwrap();

        assert_eq!(schema_version(&conn).unwrap(), 2);
        let room: String = conn
            .query_row("SELECT display_name FROM rooms WHERE room_id = 'R1';", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(room, "Room 1");
        let matrices: i64 = conn
            .query_row("SELECT COUNT(*) FROM matrices;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(matrices, 0);
    }
}
