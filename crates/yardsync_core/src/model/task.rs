//! Task projection (`type = "task"`).

use crate::model::record::{FieldValue, Fields, Record, RecordId, RecordType};
use crate::model::{expect_kind, read_bool, read_string, ProjectionError};

/// Caller-supplied task content, without store metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub is_completed: bool,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("title".to_string(), self.title.as_str().into());
        fields.insert(
            "description".to_string(),
            self.description.as_str().into(),
        );
        fields.insert(
            "isCompleted".to_string(),
            FieldValue::Bool(self.is_completed),
        );
        fields
    }
}

/// Stored task read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: RecordId,
    pub title: String,
    pub description: String,
    pub is_completed: bool,
    pub created_at: i64,
    pub sequence: u64,
}

impl Task {
    pub fn from_record(record: &Record) -> Result<Self, ProjectionError> {
        expect_kind(record, RecordType::Task)?;
        Ok(Self {
            id: record.id,
            title: read_string(record, "title"),
            description: read_string(record, "description"),
            is_completed: read_bool(record, "isCompleted"),
            created_at: record.created_at,
            sequence: record.sequence,
        })
    }

    pub fn to_draft(&self) -> TaskDraft {
        TaskDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            is_completed: self.is_completed,
        }
    }
}
