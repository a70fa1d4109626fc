//! Document store: durable keyed records with type-scoped queries.
//!
//! # Responsibility
//! - Own the `records` table and stamp `id`, `createdAt` and `sequence`.
//! - Serialize writers so no caller observes a torn record.
//! - Expose the replication hooks (`pending_changes`, `apply_remote`, ...)
//!   used by the sync coordinator.
//!
//! # Invariants
//! - Every write validates against the record type schema first.
//! - A deleted record stays as a tombstone until it has been pushed and purged.
//! - `sequence` strictly increases per store instance and is never reused.

mod document_store;
pub mod query;
pub mod replication;

pub use document_store::{
    ChangeOrigin, DocumentStore, RawDocument, ResetReport, StoreChange, StoreLocation,
};
pub use query::{OrderBy, RecordQuery, SortDirection, SortKey};
pub use replication::{
    ApplyOutcome, ConflictRecord, ConflictResolver, ConflictSide, PushedRevision, Resolution,
    Revision,
};

use crate::db::DbError;
use crate::model::record::RecordId;
use crate::model::schema::SchemaError;
use crate::model::ProjectionError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Error returned by every synchronous store operation.
#[derive(Debug)]
pub enum StoreError {
    /// Caller supplied fields or a query shape the schema does not accept.
    Schema(SchemaError),
    /// No live record with this id.
    NotFound(RecordId),
    /// Storage medium failure (disk full, corruption, locked database).
    Db(DbError),
    /// Persisted state cannot be decoded.
    InvalidData(String),
    Serialization(serde_json::Error),
}

impl StoreError {
    /// Stable code for log lines and FFI envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Schema(_) => "configuration_error",
            Self::NotFound(_) => "not_found",
            Self::Db(_) => "storage_error",
            Self::InvalidData(_) => "invalid_data",
            Self::Serialization(_) => "serialization_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schema(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted record data: {message}"),
            Self::Serialization(err) => write!(f, "record body serialization failed: {err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Schema(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<SchemaError> for StoreError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

impl From<ProjectionError> for StoreError {
    fn from(value: ProjectionError) -> Self {
        Self::InvalidData(value.to_string())
    }
}
