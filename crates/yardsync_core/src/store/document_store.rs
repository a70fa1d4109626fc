//! SQLite-backed document store handle.
//!
//! # Responsibility
//! - CRUD over the `records` table with schema validation on write.
//! - Bulk reset that is either fully applied or fully rolled back.
//! - Publish a change signal after every committed write.
//!
//! # Invariants
//! - All access goes through one connection mutex; each operation runs in one
//!   transaction, so readers see either the pre- or post-write state.
//! - Change signals are sent after commit and never block writers.
//!
//! # Preconditions
//! - Callers must not issue CRUD calls concurrently with `reset_all`.

use super::query::RecordQuery;
use super::{StoreError, StoreResult};
use crate::db::{open_db, open_db_in_memory};
use crate::model::now_epoch_ms;
use crate::model::record::{Fields, Record, RecordId, RecordType};
use crate::model::schema::schema_for;
use log::{error, info, warn};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use uuid::Uuid;

pub(super) const RECORD_SELECT_SQL: &str = "SELECT
    id,
    type,
    fields,
    created_at,
    updated_at,
    sequence,
    is_deleted,
    pending_push
FROM records";

/// Where the store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// What produced the latest committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    Opened,
    Local,
    Remote,
    Reset,
}

/// Latest change signal. `epoch` increments on every `reset_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChange {
    pub epoch: u64,
    pub sequence: u64,
    pub origin: ChangeOrigin,
}

/// Result of a successful `reset_all`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetReport {
    pub removed_records: usize,
    pub removed_conflicts: usize,
    /// Identity of the freshly initialized store instance.
    pub store_id: String,
}

/// Record as shown by raw document inspection screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawDocument {
    pub id: RecordId,
    pub kind: RecordType,
    pub sequence: u64,
    /// Pretty-printed JSON of the whole record, metadata included.
    pub json: String,
}

struct StoreInner {
    conn: Mutex<Connection>,
    location: StoreLocation,
    changes: watch::Sender<StoreChange>,
}

/// Cloneable handle to one store instance; pass it to every consumer.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<StoreInner>,
}

pub(super) struct StoredRow {
    pub record: Record,
    pub pending_push: bool,
}

impl DocumentStore {
    /// Opens (or creates) the store at `path`. Data survives process restart.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = open_db(&path)?;
        Self::from_connection(conn, StoreLocation::File(path))
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = open_db_in_memory()?;
        Self::from_connection(conn, StoreLocation::Memory)
    }

    fn from_connection(conn: Connection, location: StoreLocation) -> StoreResult<Self> {
        let sequence = last_sequence(&conn)?;
        let (changes, _) = watch::channel(StoreChange {
            epoch: 0,
            sequence,
            origin: ChangeOrigin::Opened,
        });
        Ok(Self {
            inner: Arc::new(StoreInner {
                conn: Mutex::new(conn),
                location,
                changes,
            }),
        })
    }

    pub fn location(&self) -> &StoreLocation {
        &self.inner.location
    }

    /// Identity of the current store instance; changes on `reset_all`.
    pub fn store_id(&self) -> StoreResult<String> {
        self.with_conn(|conn| {
            let store_id = conn.query_row(
                "SELECT store_id FROM store_state WHERE singleton = 1;",
                [],
                |row| row.get::<_, String>(0),
            )?;
            Ok(store_id)
        })
    }

    /// Subscribes to commit signals. Receivers only see the latest value.
    pub fn subscribe_changes(&self) -> watch::Receiver<StoreChange> {
        self.inner.changes.subscribe()
    }

    /// Creates one record and returns its generated id.
    ///
    /// # Errors
    /// - `Schema` when `fields` do not match the `kind` schema.
    /// - `Db` when the medium cannot be written.
    pub fn create(&self, kind: RecordType, fields: Fields) -> StoreResult<RecordId> {
        schema_for(kind).validate(&fields)?;
        let id = Uuid::new_v4();
        let body = encode_fields(&fields)?;
        let now = now_epoch_ms();

        let result = self.with_tx(|tx| {
            let sequence = next_sequence(tx)?;
            tx.execute(
                "INSERT INTO records (
                    id, type, fields, created_at, updated_at, sequence, is_deleted, pending_push
                ) VALUES (?1, ?2, ?3, ?4, ?4, ?5, 0, 1);",
                params![id.to_string(), kind.as_str(), body, now, to_db_sequence(sequence)?],
            )?;
            Ok(sequence)
        });

        let sequence = log_write("record_create", kind.as_str(), result)?;
        self.publish(sequence, ChangeOrigin::Local);
        Ok(id)
    }

    /// Returns all live records of `kind` ordered by `id`.
    pub fn get(&self, kind: RecordType) -> StoreResult<Vec<Record>> {
        self.query(&RecordQuery::of(kind))
    }

    /// Runs a type-scoped listing from one consistent snapshot.
    pub fn query(&self, query: &RecordQuery) -> StoreResult<Vec<Record>> {
        query.validate()?;
        let sql = format!(
            "{RECORD_SELECT_SQL} WHERE type = ?1 AND is_deleted = 0 {};",
            query.order_sql()
        );
        let records = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([query.kind.as_str()])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(parse_row(row)?.record);
            }
            Ok(records)
        })?;
        Ok(query.finish(records))
    }

    /// Gets one live record by id.
    pub fn get_by_id(&self, id: RecordId) -> StoreResult<Option<Record>> {
        self.with_conn(|conn| {
            Ok(load_row(conn, id)?
                .map(|row| row.record)
                .filter(Record::is_active))
        })
    }

    /// Merges `fields` into a live record: given keys replace, others stay.
    ///
    /// Returns the new sequence.
    pub fn update(&self, id: RecordId, fields: Fields) -> StoreResult<u64> {
        self.save(id, fields, true)
    }

    /// Replaces all fields of a live record. Returns the new sequence.
    pub fn replace(&self, id: RecordId, fields: Fields) -> StoreResult<u64> {
        self.save(id, fields, false)
    }

    fn save(&self, id: RecordId, fields: Fields, merge: bool) -> StoreResult<u64> {
        let mut kind_label = "unknown";
        let result = self.with_tx(|tx| {
            let existing = load_row(tx, id)?
                .map(|row| row.record)
                .filter(Record::is_active)
                .ok_or(StoreError::NotFound(id))?;
            kind_label = existing.kind.as_str();

            let next_fields = if merge {
                let mut merged = existing.fields;
                merged.extend(fields);
                merged
            } else {
                fields
            };
            schema_for(existing.kind).validate(&next_fields)?;

            let sequence = next_sequence(tx)?;
            tx.execute(
                "UPDATE records
                 SET
                    fields = ?2,
                    updated_at = ?3,
                    sequence = ?4,
                    pending_push = 1
                 WHERE id = ?1;",
                params![
                    id.to_string(),
                    encode_fields(&next_fields)?,
                    now_epoch_ms(),
                    to_db_sequence(sequence)?
                ],
            )?;
            Ok(sequence)
        });

        let sequence = log_write("record_update", kind_label, result)?;
        self.publish(sequence, ChangeOrigin::Local);
        Ok(sequence)
    }

    /// Tombstones a live record so the deletion can replicate.
    ///
    /// # Errors
    /// - `NotFound` when the id is absent or already deleted.
    pub fn delete(&self, id: RecordId) -> StoreResult<()> {
        let mut kind_label = "unknown";
        let result = self.with_tx(|tx| {
            let existing = load_row(tx, id)?
                .map(|row| row.record)
                .filter(Record::is_active)
                .ok_or(StoreError::NotFound(id))?;
            kind_label = existing.kind.as_str();

            let sequence = next_sequence(tx)?;
            tx.execute(
                "UPDATE records
                 SET
                    fields = '{}',
                    is_deleted = 1,
                    updated_at = ?2,
                    sequence = ?3,
                    pending_push = 1
                 WHERE id = ?1;",
                params![id.to_string(), now_epoch_ms(), to_db_sequence(sequence)?],
            )?;
            Ok(sequence)
        });

        let sequence = log_write("record_delete", kind_label, result)?;
        self.publish(sequence, ChangeOrigin::Local);
        Ok(())
    }

    /// Counts live records of `kind`.
    pub fn count(&self, kind: RecordType) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM records WHERE type = ?1 AND is_deleted = 0;",
                [kind.as_str()],
                |row| row.get::<_, i64>(0),
            )?;
            from_db_count(count)
        })
    }

    /// Counts live records of every type.
    pub fn count_all(&self) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM records WHERE is_deleted = 0;",
                [],
                |row| row.get::<_, i64>(0),
            )?;
            from_db_count(count)
        })
    }

    /// Lists every live record as pretty JSON, ordered by sequence.
    pub fn list_raw(&self) -> StoreResult<Vec<RawDocument>> {
        let records = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{RECORD_SELECT_SQL} WHERE is_deleted = 0 ORDER BY sequence ASC;"
            ))?;
            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(parse_row(row)?.record);
            }
            Ok(records)
        })?;

        records
            .into_iter()
            .map(|record| {
                Ok(RawDocument {
                    id: record.id,
                    kind: record.kind,
                    sequence: record.sequence,
                    json: serde_json::to_string_pretty(&record)?,
                })
            })
            .collect()
    }

    /// Irreversibly destroys every record, conflict and sync checkpoint and
    /// reinitializes the store as a new instance.
    ///
    /// Runs in one transaction: on failure nothing is removed and the store
    /// stays usable. Active sync sessions observe a `Reset` change.
    pub fn reset_all(&self) -> StoreResult<ResetReport> {
        let started_at = Instant::now();
        warn!("event=store_reset module=store status=start");

        let result = self.with_tx(|tx| {
            let removed_records = tx.execute("DELETE FROM records;", [])?;
            let removed_conflicts = tx.execute("DELETE FROM record_conflicts;", [])?;
            tx.execute("DELETE FROM sync_checkpoints;", [])?;
            let store_id = Uuid::new_v4().simple().to_string();
            tx.execute(
                "UPDATE store_state SET store_id = ?1, last_sequence = 0 WHERE singleton = 1;",
                [store_id.as_str()],
            )?;
            Ok(ResetReport {
                removed_records,
                removed_conflicts,
                store_id,
            })
        });

        match result {
            Ok(report) => {
                info!(
                    "event=store_reset module=store status=ok duration_ms={} removed_records={} removed_conflicts={}",
                    started_at.elapsed().as_millis(),
                    report.removed_records,
                    report.removed_conflicts
                );
                self.inner.changes.send_modify(|change| {
                    change.epoch += 1;
                    change.sequence = 0;
                    change.origin = ChangeOrigin::Reset;
                });
                Ok(report)
            }
            Err(err) => {
                error!(
                    "event=store_reset module=store status=error duration_ms={} error_code={} error={err}",
                    started_at.elapsed().as_millis(),
                    err.code()
                );
                Err(err)
            }
        }
    }

    /// Physically removes tombstones that no longer need to be pushed.
    pub fn purge_tombstones(&self) -> StoreResult<usize> {
        let removed = self.with_tx(|tx| {
            Ok(tx.execute(
                "DELETE FROM records WHERE is_deleted = 1 AND pending_push = 0;",
                [],
            )?)
        })?;
        info!("event=tombstone_purge module=store status=ok removed={removed}");
        Ok(removed)
    }

    pub(super) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let conn = self.inner.conn.lock();
        f(&conn)
    }

    /// Runs `f` in an immediate transaction; any error rolls everything back.
    pub(super) fn with_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self.inner.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    pub(super) fn publish(&self, sequence: u64, origin: ChangeOrigin) {
        self.inner.changes.send_modify(|change| {
            change.sequence = sequence;
            change.origin = origin;
        });
    }
}

fn log_write(event: &str, kind: &str, result: StoreResult<u64>) -> StoreResult<u64> {
    match &result {
        Ok(sequence) => info!("event={event} module=store status=ok type={kind} sequence={sequence}"),
        Err(err) => warn!(
            "event={event} module=store status=error type={kind} error_code={} error={err}",
            err.code()
        ),
    }
    result
}

/// Allocates the next store sequence inside the caller's transaction.
pub(super) fn next_sequence(tx: &Transaction<'_>) -> StoreResult<u64> {
    let sequence = tx.query_row(
        "UPDATE store_state
         SET last_sequence = last_sequence + 1
         WHERE singleton = 1
         RETURNING last_sequence;",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    from_db_sequence(sequence)
}

fn last_sequence(conn: &Connection) -> StoreResult<u64> {
    let sequence = conn.query_row(
        "SELECT last_sequence FROM store_state WHERE singleton = 1;",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    from_db_sequence(sequence)
}

pub(super) fn load_row(conn: &Connection, id: RecordId) -> StoreResult<Option<StoredRow>> {
    let mut stmt = conn.prepare(&format!("{RECORD_SELECT_SQL} WHERE id = ?1;"))?;
    let row = stmt
        .query_row([id.to_string()], |row| Ok(parse_row(row)))
        .optional()?;
    row.transpose()
}

pub(super) fn parse_row(row: &Row<'_>) -> StoreResult<StoredRow> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        StoreError::InvalidData(format!("invalid id value `{id_text}` in records.id"))
    })?;

    let type_text: String = row.get("type")?;
    let kind = RecordType::parse(&type_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid record type `{type_text}` in records.type"))
    })?;

    let body: String = row.get("fields")?;
    let fields: Fields = serde_json::from_str(&body).map_err(|err| {
        StoreError::InvalidData(format!("undecodable body for record {id}: {err}"))
    })?;

    Ok(StoredRow {
        record: Record {
            id,
            kind,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            sequence: from_db_sequence(row.get("sequence")?)?,
            fields,
            is_deleted: parse_flag(row.get("is_deleted")?, "records.is_deleted")?,
        },
        pending_push: parse_flag(row.get("pending_push")?, "records.pending_push")?,
    })
}

pub(super) fn encode_fields(fields: &Fields) -> StoreResult<String> {
    Ok(serde_json::to_string(fields)?)
}

pub(super) fn to_db_sequence(sequence: u64) -> StoreResult<i64> {
    i64::try_from(sequence)
        .map_err(|_| StoreError::InvalidData(format!("sequence {sequence} exceeds storage range")))
}

fn from_db_sequence(value: i64) -> StoreResult<u64> {
    u64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("negative sequence `{value}` in storage")))
}

fn from_db_count(value: i64) -> StoreResult<u64> {
    u64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("negative count `{value}`")))
}

fn parse_flag(value: i64, column: &str) -> StoreResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StoreError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}
