//! Replication hooks consumed by the sync coordinator.
//!
//! # Responsibility
//! - Report local changes that still need to be pushed.
//! - Apply remote revisions, resolving conflicts with pending local edits.
//! - Keep losing revisions discoverable in `record_conflicts`.
//! - Persist per-endpoint pull cursors.
//!
//! # Invariants
//! - Remote writes get a fresh local sequence but are never marked for push,
//!   unless a merge produced new content.
//! - A conflict never drops a revision silently: the loser is recorded.

use super::document_store::{
    encode_fields, load_row, next_sequence, parse_row, to_db_sequence, ChangeOrigin,
    DocumentStore, RECORD_SELECT_SQL,
};
use super::{StoreError, StoreResult};
use crate::model::now_epoch_ms;
use crate::model::record::{Fields, Record, RecordId, RecordType};
use crate::model::schema::schema_for;
use log::{debug, info, warn};
use rusqlite::{params, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};

/// One record revision as exchanged with a remote endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub id: RecordId,
    #[serde(rename = "type")]
    pub kind: RecordType,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
    /// Sequence assigned by the sending store; only meaningful to the sender.
    pub sequence: u64,
    pub fields: Fields,
    #[serde(rename = "isDeleted")]
    pub is_deleted: bool,
}

impl From<&Record> for Revision {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            kind: record.kind,
            created_at: record.created_at,
            updated_at: record.updated_at,
            sequence: record.sequence,
            fields: record.fields.clone(),
            is_deleted: record.is_deleted,
        }
    }
}

/// Acknowledgement that the remote stored one pushed revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushedRevision {
    pub id: RecordId,
    pub sequence: u64,
}

/// Decision of a conflict resolver.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    KeepLocal,
    TakeRemote,
    /// Store these fields as a new local revision that is pushed again.
    Merge(Fields),
}

/// Pluggable policy for a remote revision that meets an unpushed local edit.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, local: &Record, remote: &Revision) -> Resolution;
}

impl<F> ConflictResolver for F
where
    F: Fn(&Record, &Revision) -> Resolution + Send + Sync,
{
    fn resolve(&self, local: &Record, remote: &Revision) -> Resolution {
        self(local, remote)
    }
}

/// Which side of a conflict a stored loser came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictSide {
    Local,
    Remote,
}

impl ConflictSide {
    fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "local" => Some(Self::Local),
            "remote" => Some(Self::Remote),
            _ => None,
        }
    }
}

/// Losing revision kept after a conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRecord {
    pub conflict_id: i64,
    pub record_id: RecordId,
    pub losing_side: ConflictSide,
    pub losing_fields: Fields,
    pub losing_deleted: bool,
    pub losing_updated_at: i64,
    pub winning_sequence: u64,
    pub resolved_at: i64,
}

/// What `apply_remote` did with one revision.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Inserted { sequence: u64 },
    Updated { sequence: u64 },
    Deleted { sequence: u64 },
    /// Nothing to do (tombstone for a record that is absent or already deleted).
    Skipped,
    Conflict {
        winner: Resolution,
        sequence: u64,
    },
    /// Revision does not fit the local schema; the local state is untouched.
    Rejected { reason: String },
}

impl DocumentStore {
    /// Lists records (tombstones included) not yet acknowledged by the remote,
    /// oldest sequence first.
    pub fn pending_changes(&self, limit: usize) -> StoreResult<Vec<Record>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{RECORD_SELECT_SQL} WHERE pending_push = 1 ORDER BY sequence ASC LIMIT ?1;"
            ))?;
            let mut rows = stmt.query([limit])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(parse_row(row)?.record);
            }
            Ok(records)
        })
    }

    /// Clears the pending flag of acknowledged revisions.
    ///
    /// A record edited again after it was pushed keeps its flag, because its
    /// stored sequence no longer matches the acknowledged one.
    pub fn mark_pushed(&self, pushed: &[PushedRevision]) -> StoreResult<usize> {
        if pushed.is_empty() {
            return Ok(0);
        }
        let cleared = self.with_tx(|tx| {
            let mut cleared = 0;
            for revision in pushed {
                cleared += tx.execute(
                    "UPDATE records SET pending_push = 0 WHERE id = ?1 AND sequence = ?2;",
                    params![revision.id.to_string(), to_db_sequence(revision.sequence)?],
                )?;
            }
            Ok(cleared)
        })?;
        debug!(
            "event=mark_pushed module=store status=ok acknowledged={} cleared={cleared}",
            pushed.len()
        );
        Ok(cleared)
    }

    /// Applies one remote revision.
    ///
    /// When the local record has an unpushed edit, `resolver` picks the winner
    /// and the losing side is stored in `record_conflicts`.
    pub fn apply_remote(
        &self,
        remote: &Revision,
        resolver: &dyn ConflictResolver,
    ) -> StoreResult<ApplyOutcome> {
        if !remote.is_deleted {
            if let Err(err) = schema_for(remote.kind).validate(&remote.fields) {
                return Ok(reject(remote, err.to_string()));
            }
        }

        let outcome = self.with_tx(|tx| {
            let local = load_row(tx, remote.id)?;
            let Some(local) = local else {
                if remote.is_deleted {
                    return Ok(ApplyOutcome::Skipped);
                }
                let sequence = insert_remote(tx, remote)?;
                return Ok(ApplyOutcome::Inserted { sequence });
            };

            if local.record.kind != remote.kind {
                return Ok(ApplyOutcome::Rejected {
                    reason: format!(
                        "remote type `{}` does not match local type `{}`",
                        remote.kind, local.record.kind
                    ),
                });
            }

            if !local.pending_push {
                return overwrite_with_remote(tx, &local.record, remote);
            }

            let resolution = resolver.resolve(&local.record, remote);
            match &resolution {
                Resolution::KeepLocal => {
                    record_loser(
                        tx,
                        remote.id,
                        ConflictSide::Remote,
                        &remote.fields,
                        remote.is_deleted,
                        remote.updated_at,
                        local.record.sequence,
                    )?;
                    Ok(ApplyOutcome::Conflict {
                        winner: resolution,
                        sequence: local.record.sequence,
                    })
                }
                Resolution::TakeRemote => {
                    let sequence = write_revision(tx, remote, remote.is_deleted, false)?;
                    record_local_loser(tx, &local.record, sequence)?;
                    Ok(ApplyOutcome::Conflict {
                        winner: resolution,
                        sequence,
                    })
                }
                Resolution::Merge(fields) => {
                    schema_for(local.record.kind).validate(fields)?;
                    let merged = Revision {
                        fields: fields.clone(),
                        updated_at: now_epoch_ms().max(remote.updated_at),
                        ..remote.clone()
                    };
                    let sequence = write_revision(tx, &merged, false, true)?;
                    record_local_loser(tx, &local.record, sequence)?;
                    Ok(ApplyOutcome::Conflict {
                        winner: resolution,
                        sequence,
                    })
                }
            }
        })?;

        match &outcome {
            ApplyOutcome::Inserted { sequence }
            | ApplyOutcome::Updated { sequence }
            | ApplyOutcome::Deleted { sequence } => {
                self.publish(*sequence, ChangeOrigin::Remote);
            }
            ApplyOutcome::Conflict { winner, sequence } => {
                info!(
                    "event=conflict_resolved module=store status=ok type={} winner={}",
                    remote.kind,
                    resolution_label(winner)
                );
                let origin = match winner {
                    Resolution::Merge(_) => ChangeOrigin::Local,
                    _ => ChangeOrigin::Remote,
                };
                self.publish(*sequence, origin);
            }
            ApplyOutcome::Rejected { reason } => {
                warn!(
                    "event=apply_remote module=store status=rejected type={} reason={reason}",
                    remote.kind
                );
            }
            ApplyOutcome::Skipped => {}
        }
        Ok(outcome)
    }

    /// Losing revisions recorded for `id`, oldest first.
    pub fn conflicts_for(&self, id: RecordId) -> StoreResult<Vec<ConflictRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT
                    conflict_id,
                    record_id,
                    losing_side,
                    losing_fields,
                    losing_deleted,
                    losing_updated_at,
                    winning_sequence,
                    resolved_at
                 FROM record_conflicts
                 WHERE record_id = ?1
                 ORDER BY conflict_id ASC;",
            )?;
            let mut rows = stmt.query([id.to_string()])?;
            let mut conflicts = Vec::new();
            while let Some(row) = rows.next()? {
                let side_text: String = row.get("losing_side")?;
                let losing_side = ConflictSide::parse(&side_text).ok_or_else(|| {
                    StoreError::InvalidData(format!("invalid conflict side `{side_text}`"))
                })?;
                let body: String = row.get("losing_fields")?;
                let winning_sequence: i64 = row.get("winning_sequence")?;
                conflicts.push(ConflictRecord {
                    conflict_id: row.get("conflict_id")?,
                    record_id: id,
                    losing_side,
                    losing_fields: serde_json::from_str(&body)?,
                    losing_deleted: row.get::<_, i64>("losing_deleted")? == 1,
                    losing_updated_at: row.get("losing_updated_at")?,
                    winning_sequence: u64::try_from(winning_sequence).map_err(|_| {
                        StoreError::InvalidData(format!(
                            "negative winning sequence `{winning_sequence}`"
                        ))
                    })?,
                    resolved_at: row.get("resolved_at")?,
                });
            }
            Ok(conflicts)
        })
    }

    /// Drops conflict history resolved before `resolved_before` (epoch ms).
    pub fn prune_conflicts(&self, resolved_before: i64) -> StoreResult<usize> {
        self.with_tx(|tx| {
            Ok(tx.execute(
                "DELETE FROM record_conflicts WHERE resolved_at < ?1;",
                [resolved_before],
            )?)
        })
    }

    /// Pull cursor saved for `endpoint`, if any.
    pub fn checkpoint(&self, endpoint: &str) -> StoreResult<Option<String>> {
        self.with_conn(|conn| {
            let cursor = conn
                .query_row(
                    "SELECT cursor FROM sync_checkpoints WHERE endpoint = ?1;",
                    [endpoint],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()?;
            Ok(cursor.flatten())
        })
    }

    pub fn save_checkpoint(&self, endpoint: &str, cursor: Option<&str>) -> StoreResult<()> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO sync_checkpoints (endpoint, cursor, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(endpoint) DO UPDATE SET
                    cursor = excluded.cursor,
                    updated_at = excluded.updated_at;",
                params![endpoint, cursor, now_epoch_ms()],
            )?;
            Ok(())
        })
    }
}

fn reject(remote: &Revision, reason: String) -> ApplyOutcome {
    warn!(
        "event=apply_remote module=store status=rejected type={} reason={reason}",
        remote.kind
    );
    ApplyOutcome::Rejected { reason }
}

fn resolution_label(resolution: &Resolution) -> &'static str {
    match resolution {
        Resolution::KeepLocal => "local",
        Resolution::TakeRemote => "remote",
        Resolution::Merge(_) => "merge",
    }
}

fn insert_remote(tx: &Transaction<'_>, remote: &Revision) -> StoreResult<u64> {
    let sequence = next_sequence(tx)?;
    tx.execute(
        "INSERT INTO records (
            id, type, fields, created_at, updated_at, sequence, is_deleted, pending_push
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0);",
        params![
            remote.id.to_string(),
            remote.kind.as_str(),
            encode_fields(&remote.fields)?,
            remote.created_at,
            remote.updated_at,
            to_db_sequence(sequence)?
        ],
    )?;
    Ok(sequence)
}

fn overwrite_with_remote(
    tx: &Transaction<'_>,
    local: &Record,
    remote: &Revision,
) -> StoreResult<ApplyOutcome> {
    if remote.is_deleted {
        if local.is_deleted {
            return Ok(ApplyOutcome::Skipped);
        }
        let sequence = write_revision(tx, remote, true, false)?;
        return Ok(ApplyOutcome::Deleted { sequence });
    }
    let sequence = write_revision(tx, remote, false, false)?;
    Ok(ApplyOutcome::Updated { sequence })
}

/// Rewrites an existing row from a revision. `created_at` is left untouched.
fn write_revision(
    tx: &Transaction<'_>,
    revision: &Revision,
    deleted: bool,
    pending_push: bool,
) -> StoreResult<u64> {
    let sequence = next_sequence(tx)?;
    let body = if deleted {
        "{}".to_string()
    } else {
        encode_fields(&revision.fields)?
    };
    tx.execute(
        "UPDATE records
         SET
            fields = ?2,
            updated_at = ?3,
            sequence = ?4,
            is_deleted = ?5,
            pending_push = ?6
         WHERE id = ?1;",
        params![
            revision.id.to_string(),
            body,
            revision.updated_at,
            to_db_sequence(sequence)?,
            i64::from(deleted),
            i64::from(pending_push)
        ],
    )?;
    Ok(sequence)
}

fn record_local_loser(
    tx: &Transaction<'_>,
    local: &Record,
    winning_sequence: u64,
) -> StoreResult<()> {
    record_loser(
        tx,
        local.id,
        ConflictSide::Local,
        &local.fields,
        local.is_deleted,
        local.updated_at,
        winning_sequence,
    )
}

fn record_loser(
    tx: &Transaction<'_>,
    record_id: RecordId,
    side: ConflictSide,
    fields: &Fields,
    deleted: bool,
    updated_at: i64,
    winning_sequence: u64,
) -> StoreResult<()> {
    tx.execute(
        "INSERT INTO record_conflicts (
            record_id,
            losing_side,
            losing_fields,
            losing_deleted,
            losing_updated_at,
            winning_sequence,
            resolved_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            record_id.to_string(),
            side.as_str(),
            encode_fields(fields)?,
            i64::from(deleted),
            updated_at,
            to_db_sequence(winning_sequence)?,
            now_epoch_ms()
        ],
    )?;
    Ok(())
}
