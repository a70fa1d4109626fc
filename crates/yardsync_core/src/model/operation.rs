//! Yard operation projection (`type = "operation"`).
//!
//! A yard operation is a unit of work scheduled against one wagon
//! (shunting, inspection, loading), with priority and completion tracking.

use crate::model::record::{FieldValue, Fields, Record, RecordId, RecordType};
use crate::model::{expect_kind, read_string, read_timestamp, ProjectionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl OperationPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Normal => "Normal",
            Self::High => "High",
            Self::Urgent => "Urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Low" => Some(Self::Low),
            "Normal" => Some(Self::Normal),
            "High" => Some(Self::High),
            "Urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl OperationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pending" => Some(Self::Pending),
            "InProgress" => Some(Self::InProgress),
            "Completed" => Some(Self::Completed),
            "Cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Caller-supplied operation content, without store metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OperationDraft {
    pub title: String,
    pub description: String,
    pub wagon_id: Option<RecordId>,
    pub wagon_number: String,
    pub operation_type: String,
    pub assigned_to: String,
    pub priority: OperationPriority,
    pub status: OperationStatus,
    pub completed_at: Option<i64>,
    /// Checklist item name to done flag.
    pub checklist: Fields,
}

impl OperationDraft {
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
        if let Some(wagon_id) = self.wagon_id {
            fields.insert("wagonId".to_string(), wagon_id.to_string().into());
        }
        fields.insert(
            "wagonNumber".to_string(),
            self.wagon_number.as_str().into(),
        );
        fields.insert(
            "operationType".to_string(),
            self.operation_type.as_str().into(),
        );
        fields.insert("assignedTo".to_string(), self.assigned_to.as_str().into());
        fields.insert("priority".to_string(), self.priority.as_str().into());
        fields.insert("status".to_string(), self.status.as_str().into());
        if let Some(epoch_ms) = self.completed_at {
            fields.insert("completedAt".to_string(), FieldValue::timestamp(epoch_ms));
        }
        if !self.checklist.is_empty() {
            fields.insert(
                "checklist".to_string(),
                FieldValue::Map(self.checklist.clone()),
            );
        }
        fields
    }
}

/// Stored yard operation read model.
#[derive(Debug, Clone, PartialEq)]
pub struct YardOperation {
    pub id: RecordId,
    pub draft: OperationDraft,
    pub created_at: i64,
    pub sequence: u64,
}

impl YardOperation {
    pub fn from_record(record: &Record) -> Result<Self, ProjectionError> {
        expect_kind(record, RecordType::Operation)?;

        let priority_text = record
            .field("priority")
            .and_then(|value| value.as_str())
            .unwrap_or("Normal");
        let priority = OperationPriority::parse(priority_text).ok_or_else(|| {
            ProjectionError::new(
                RecordType::Operation,
                "priority",
                format!("unknown priority `{priority_text}`"),
            )
        })?;

        let status_text = record
            .field("status")
            .and_then(|value| value.as_str())
            .unwrap_or("Pending");
        let status = OperationStatus::parse(status_text).ok_or_else(|| {
            ProjectionError::new(
                RecordType::Operation,
                "status",
                format!("unknown operation status `{status_text}`"),
            )
        })?;

        let wagon_id = match record.field("wagonId").and_then(|value| value.as_str()) {
            Some(text) if !text.is_empty() => Some(RecordId::parse_str(text).map_err(|_| {
                ProjectionError::new(
                    RecordType::Operation,
                    "wagonId",
                    format!("invalid wagon id `{text}`"),
                )
            })?),
            _ => None,
        };

        let checklist = match record.field("checklist") {
            Some(FieldValue::Map(items)) => items.clone(),
            _ => Fields::new(),
        };

        Ok(Self {
            id: record.id,
            draft: OperationDraft {
                title: read_string(record, "title"),
                description: read_string(record, "description"),
                wagon_id,
                wagon_number: read_string(record, "wagonNumber"),
                operation_type: read_string(record, "operationType"),
                assigned_to: read_string(record, "assignedTo"),
                priority,
                status,
                completed_at: read_timestamp(record, "completedAt"),
                checklist,
            },
            created_at: record.created_at,
            sequence: record.sequence,
        })
    }
}
