//! Generic stored record.
//!
//! # Invariants
//! - `id`, `kind` and `created_at` are assigned once by the store.
//! - `sequence` is assigned by the store on every save and never reused.
//! - Tombstones (`is_deleted`) carry no fields.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for every stored record.
pub type RecordId = Uuid;

/// Field name to value mapping. Ordered so serialized bodies are deterministic.
pub type Fields = BTreeMap<String, FieldValue>;

/// Discriminator that partitions records into independently queried sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Task,
    Wagon,
    Operation,
}

impl RecordType {
    pub const ALL: [RecordType; 3] = [Self::Task, Self::Wagon, Self::Operation];

    /// Storage/wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Wagon => "wagon",
            Self::Operation => "operation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "task" => Some(Self::Task),
            "wagon" => Some(Self::Wagon),
            "operation" => Some(Self::Operation),
            _ => None,
        }
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored value.
///
/// Serialized untagged so stored bodies read as plain JSON; timestamps use a
/// `{"$timestamp": <epoch ms>}` wrapper to stay distinguishable from numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Timestamp {
        #[serde(rename = "$timestamp")]
        epoch_ms: i64,
    },
    String(String),
    Map(Fields),
}

impl FieldValue {
    pub fn timestamp(epoch_ms: i64) -> Self {
        Self::Timestamp { epoch_ms }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Self::Timestamp { epoch_ms } => Some(*epoch_ms),
            _ => None,
        }
    }

    /// Short name of the value shape, used in validation messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Timestamp { .. } => "timestamp",
            Self::String(_) => "string",
            Self::Map(_) => "map",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Number(_) => 1,
            Self::Timestamp { .. } => 2,
            Self::String(_) => 3,
            Self::Map(_) => 4,
        }
    }

    /// Total order used by field-keyed queries.
    ///
    /// Values of different shapes order by shape; maps compare equal.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Timestamp { epoch_ms: a }, Self::Timestamp { epoch_ms: b }) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Map(_), Self::Map(_)) => Ordering::Equal,
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// One stored document with metadata stamped by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Serialized as `type` to match the external document shape.
    #[serde(rename = "type")]
    pub kind: RecordType,
    /// Epoch milliseconds, immutable after creation.
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    /// Epoch milliseconds of the last save; input to last-writer-wins.
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
    pub sequence: u64,
    pub fields: Fields,
    #[serde(rename = "isDeleted")]
    pub is_deleted: bool,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}

/// Builds a `Fields` map from string keys and convertible values.
pub fn fields<K, V, I>(entries: I) -> Fields
where
    K: Into<String>,
    V: Into<FieldValue>,
    I: IntoIterator<Item = (K, V)>,
{
    entries
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}
