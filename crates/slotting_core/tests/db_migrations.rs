use rusqlite::Connection;
use slotting_core::db::migrations::{self, latest_version};
use slotting_core::db::{open_db, open_db_in_memory, DbError};

const TABLES: &[&str] = &[
    "rooms",
    "bins",
    "matrix_columns",
    "matrices",
    "matrix_rows",
    "matrix_cells",
];

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in TABLES {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slotting.db");

    let conn_first = open_db(&path).unwrap();
    conn_first
        .execute(
            "INSERT INTO rooms (room_id, display_name) VALUES ('R1', 'Room 1');",
            [],
        )
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let rooms: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM rooms;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rooms, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn duplicate_cell_coordinates_are_rejected_by_schema() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO matrix_columns (column_uuid, position, label, created_at)
         VALUES ('c1', 0, 'Bin1', 1);
         INSERT INTO matrices (matrix_uuid, room_id, room_name, name, created_at, updated_at)
         VALUES ('m1', 'R1', 'Room 1', 'Unit A', 1, 1);
         INSERT INTO matrix_rows (row_uuid, matrix_uuid, position, label, color)
         VALUES ('r1', 'm1', 0, 'Shelf1', '');
         INSERT INTO matrix_cells (cell_uuid, row_uuid, column_uuid, value)
         VALUES ('x1', 'r1', 'c1', '');",
    )
    .unwrap();

    let duplicate = conn.execute(
        "INSERT INTO matrix_cells (cell_uuid, row_uuid, column_uuid, value)
         VALUES ('x2', 'r1', 'c1', '');",
        [],
    );
    assert!(duplicate.is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    migrations::schema_version(conn).unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
