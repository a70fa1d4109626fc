//! Wagon projection (`type = "wagon"`).
//!
//! # Invariants
//! - `wagon_number` is the natural sort key for wagon listings.
//! - Status is persisted with its display label (`"In Transit"`, ...).

use crate::model::record::{FieldValue, Fields, Record, RecordId, RecordType};
use crate::model::{expect_kind, read_bool, read_string, read_timestamp, ProjectionError};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WagonStatus {
    #[default]
    Available,
    InTransit,
    UnderInspection,
    Maintenance,
}

impl WagonStatus {
    pub const ALL: [WagonStatus; 4] = [
        Self::Available,
        Self::InTransit,
        Self::UnderInspection,
        Self::Maintenance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::InTransit => "In Transit",
            Self::UnderInspection => "Under Inspection",
            Self::Maintenance => "Maintenance",
        }
    }

    /// Accepts display labels and their compact spellings (`InTransit`).
    pub fn parse(value: &str) -> Option<Self> {
        let compact: String = value
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match compact.as_str() {
            "available" => Some(Self::Available),
            "intransit" => Some(Self::InTransit),
            "underinspection" => Some(Self::UnderInspection),
            "maintenance" => Some(Self::Maintenance),
            _ => None,
        }
    }
}

impl Display for WagonStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied wagon content, without store metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WagonDraft {
    pub wagon_number: String,
    pub wagon_type: String,
    pub status: WagonStatus,
    pub current_location: String,
    pub destination: String,
    pub requires_legal_check: bool,
    /// Epoch milliseconds.
    pub last_inspection: Option<i64>,
    pub notes: String,
}

impl WagonDraft {
    pub fn new(wagon_number: impl Into<String>) -> Self {
        Self {
            wagon_number: wagon_number.into(),
            ..Self::default()
        }
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("wagonNumber".to_string(), self.wagon_number.as_str().into());
        fields.insert("wagonType".to_string(), self.wagon_type.as_str().into());
        fields.insert("status".to_string(), self.status.as_str().into());
        fields.insert(
            "currentLocation".to_string(),
            self.current_location.as_str().into(),
        );
        fields.insert("destination".to_string(), self.destination.as_str().into());
        fields.insert(
            "requiresLegalCheck".to_string(),
            FieldValue::Bool(self.requires_legal_check),
        );
        if let Some(epoch_ms) = self.last_inspection {
            fields.insert("lastInspection".to_string(), FieldValue::timestamp(epoch_ms));
        }
        fields.insert("notes".to_string(), self.notes.as_str().into());
        fields
    }
}

/// Stored wagon read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wagon {
    pub id: RecordId,
    pub wagon_number: String,
    pub wagon_type: String,
    pub status: WagonStatus,
    pub current_location: String,
    pub destination: String,
    pub requires_legal_check: bool,
    pub last_inspection: Option<i64>,
    pub notes: String,
    pub created_at: i64,
    pub sequence: u64,
}

impl Wagon {
    pub fn from_record(record: &Record) -> Result<Self, ProjectionError> {
        expect_kind(record, RecordType::Wagon)?;
        let status_text = read_string(record, "status");
        let status = WagonStatus::parse(&status_text).ok_or_else(|| {
            ProjectionError::new(
                RecordType::Wagon,
                "status",
                format!("unknown wagon status `{status_text}`"),
            )
        })?;

        Ok(Self {
            id: record.id,
            wagon_number: read_string(record, "wagonNumber"),
            wagon_type: read_string(record, "wagonType"),
            status,
            current_location: read_string(record, "currentLocation"),
            destination: read_string(record, "destination"),
            requires_legal_check: read_bool(record, "requiresLegalCheck"),
            last_inspection: read_timestamp(record, "lastInspection"),
            notes: read_string(record, "notes"),
            created_at: record.created_at,
            sequence: record.sequence,
        })
    }

    pub fn to_draft(&self) -> WagonDraft {
        WagonDraft {
            wagon_number: self.wagon_number.clone(),
            wagon_type: self.wagon_type.clone(),
            status: self.status,
            current_location: self.current_location.clone(),
            destination: self.destination.clone(),
            requires_legal_check: self.requires_legal_check,
            last_inspection: self.last_inspection,
            notes: self.notes.clone(),
        }
    }
}
