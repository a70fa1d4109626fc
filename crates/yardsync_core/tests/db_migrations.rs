use rusqlite::Connection;
use yardsync_core::db::migrations::latest_version;
use yardsync_core::db::{open_db, open_db_in_memory, DbError};
use yardsync_core::{DocumentStore, StoreError};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "records");
    assert_table_exists(&conn, "store_state");
    assert_table_exists(&conn, "record_conflicts");
    assert_table_exists(&conn, "sync_checkpoints");
}

#[test]
fn reopening_a_store_file_keeps_schema_and_identity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("yard.sqlite3");

    let first = open_db(&path).unwrap();
    let store_id: String = first
        .query_row("SELECT store_id FROM store_state;", [], |row| row.get(0))
        .unwrap();
    drop(first);

    let second = open_db(&path).unwrap();
    assert_eq!(schema_version(&second), latest_version());
    let reopened_id: String = second
        .query_row("SELECT store_id FROM store_state;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(store_id, reopened_id);
}

#[test]
fn file_store_uses_wal_journal() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db(dir.path().join("wal.sqlite3")).unwrap();
    let mode: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_ascii_lowercase(), "wal");
}

#[test]
fn newer_schema_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = DocumentStore::open(&path).err().unwrap();
    assert!(matches!(err, StoreError::Db(_)));
    assert_eq!(err.code(), "storage_error");
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
