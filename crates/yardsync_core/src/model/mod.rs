//! Record model and typed yard projections.
//!
//! # Responsibility
//! - Define the generic stored record (`Record`) and its field values.
//! - Describe per-type schemas enforced at the store write boundary.
//! - Project records into typed tasks, wagons and yard operations.
//!
//! # Invariants
//! - Every record is identified by a stable `RecordId`.
//! - `type` partitions records and never changes after creation.

pub mod operation;
pub mod record;
pub mod schema;
pub mod task;
pub mod wagon;

use record::{Record, RecordType};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// A stored record could not be read back as its typed projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionError {
    pub kind: RecordType,
    pub field: &'static str,
    pub reason: String,
}

impl ProjectionError {
    pub(crate) fn new(kind: RecordType, field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            field,
            reason: reason.into(),
        }
    }
}

impl Display for ProjectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cannot read `{}` field `{}`: {}",
            self.kind, self.field, self.reason
        )
    }
}

impl Error for ProjectionError {}

pub(crate) fn expect_kind(
    record: &Record,
    kind: RecordType,
) -> Result<(), ProjectionError> {
    if record.kind != kind {
        return Err(ProjectionError::new(
            kind,
            "type",
            format!("record is a `{}`", record.kind),
        ));
    }
    Ok(())
}

pub(crate) fn read_string(record: &Record, field: &'static str) -> String {
    record
        .field(field)
        .and_then(|value| value.as_str())
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn read_bool(record: &Record, field: &'static str) -> bool {
    record
        .field(field)
        .and_then(|value| value.as_bool())
        .unwrap_or(false)
}

pub(crate) fn read_timestamp(record: &Record, field: &'static str) -> Option<i64> {
    record.field(field).and_then(|value| value.as_timestamp())
}
