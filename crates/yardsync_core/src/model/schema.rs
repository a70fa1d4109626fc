//! Per-type record schemas enforced on every write.
//!
//! # Responsibility
//! - List the fields each `RecordType` accepts, their shapes and constraints.
//! - Reject unknown, missing, mistyped or reserved fields before persistence.
//!
//! # Invariants
//! - Metadata names (`id`, `type`, `createdAt`, `sequence`) never live in `fields`.
//! - Keys starting with `$` are reserved for value encoding.
//! - Numbers are finite at every nesting level; JSON has no NaN or infinity.

use crate::model::record::{FieldValue, Fields, RecordType};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Metadata names owned by the store.
pub const RESERVED_FIELDS: &[&str] = &["id", "type", "createdAt", "updatedAt", "sequence"];

/// Wagon status labels, in display order.
pub const WAGON_STATUSES: &[&str] = &["Available", "In Transit", "Under Inspection", "Maintenance"];
pub const OPERATION_PRIORITIES: &[&str] = &["Low", "Normal", "High", "Urgent"];
pub const OPERATION_STATUSES: &[&str] = &["Pending", "InProgress", "Completed", "Cancelled"];

/// Expected shape of one field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Bool,
    Timestamp,
    Map,
}

impl FieldKind {
    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Timestamp => "timestamp",
            Self::Map => "map",
        }
    }

    fn matches(self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (Self::String, FieldValue::String(_))
                | (Self::Number, FieldValue::Number(_))
                | (Self::Bool, FieldValue::Bool(_))
                | (Self::Timestamp, FieldValue::Timestamp { .. })
                | (Self::Map, FieldValue::Map(_))
        )
    }
}

/// One accepted field of a record type.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Required strings must also be non-blank.
    pub required: bool,
    pub allowed: Option<&'static [&'static str]>,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
        allowed: None,
    }
}

const fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
        allowed: None,
    }
}

const fn one_of(name: &'static str, required: bool, allowed: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::String,
        required,
        allowed: Some(allowed),
    }
}

/// Schema of one record type.
#[derive(Debug)]
pub struct RecordSchema {
    pub kind: RecordType,
    pub fields: &'static [FieldSpec],
}

static TASK_SCHEMA: RecordSchema = RecordSchema {
    kind: RecordType::Task,
    fields: &[
        required("title", FieldKind::String),
        field("description", FieldKind::String),
        field("isCompleted", FieldKind::Bool),
    ],
};

static WAGON_SCHEMA: RecordSchema = RecordSchema {
    kind: RecordType::Wagon,
    fields: &[
        required("wagonNumber", FieldKind::String),
        field("wagonType", FieldKind::String),
        one_of("status", true, WAGON_STATUSES),
        field("currentLocation", FieldKind::String),
        field("destination", FieldKind::String),
        field("requiresLegalCheck", FieldKind::Bool),
        field("lastInspection", FieldKind::Timestamp),
        field("notes", FieldKind::String),
    ],
};

static OPERATION_SCHEMA: RecordSchema = RecordSchema {
    kind: RecordType::Operation,
    fields: &[
        required("title", FieldKind::String),
        field("description", FieldKind::String),
        field("wagonId", FieldKind::String),
        field("wagonNumber", FieldKind::String),
        field("operationType", FieldKind::String),
        field("assignedTo", FieldKind::String),
        one_of("priority", false, OPERATION_PRIORITIES),
        one_of("status", false, OPERATION_STATUSES),
        field("completedAt", FieldKind::Timestamp),
        field("checklist", FieldKind::Map),
    ],
};

/// Returns the schema registered for `kind`.
pub fn schema_for(kind: RecordType) -> &'static RecordSchema {
    match kind {
        RecordType::Task => &TASK_SCHEMA,
        RecordType::Wagon => &WAGON_SCHEMA,
        RecordType::Operation => &OPERATION_SCHEMA,
    }
}

/// Write-boundary validation failure. Always a caller mistake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    ReservedField(String),
    UnknownField {
        kind: RecordType,
        field: String,
    },
    MissingField {
        kind: RecordType,
        field: &'static str,
    },
    WrongKind {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },
    EmptyField(&'static str),
    /// `path` is dotted for values nested in maps (`checklist.pressure`).
    NonFiniteNumber {
        path: String,
    },
    UnsupportedValue {
        field: &'static str,
        value: String,
    },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReservedField(name) => write!(f, "field `{name}` is reserved for store metadata"),
            Self::UnknownField { kind, field } => {
                write!(f, "field `{field}` is not part of the `{kind}` schema")
            }
            Self::MissingField { kind, field } => {
                write!(f, "`{kind}` requires field `{field}`")
            }
            Self::WrongKind {
                field,
                expected,
                actual,
            } => write!(f, "field `{field}` expects {expected}, got {actual}"),
            Self::EmptyField(name) => write!(f, "field `{name}` must not be empty"),
            Self::NonFiniteNumber { path } => {
                write!(f, "field `{path}` must be a finite number")
            }
            Self::UnsupportedValue { field, value } => {
                write!(f, "field `{field}` does not accept `{value}`")
            }
        }
    }
}

impl Error for SchemaError {}

impl RecordSchema {
    pub fn spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    /// Validates a complete field set for this record type.
    pub fn validate(&self, fields: &Fields) -> Result<(), SchemaError> {
        for (name, value) in fields {
            if RESERVED_FIELDS.contains(&name.as_str()) {
                return Err(SchemaError::ReservedField(name.clone()));
            }
            let spec = self.spec(name).ok_or_else(|| SchemaError::UnknownField {
                kind: self.kind,
                field: name.clone(),
            })?;
            check_value(spec, value)?;
        }

        for spec in self.fields.iter().filter(|spec| spec.required) {
            if !fields.contains_key(spec.name) {
                return Err(SchemaError::MissingField {
                    kind: self.kind,
                    field: spec.name,
                });
            }
        }
        Ok(())
    }
}

fn check_value(spec: &FieldSpec, value: &FieldValue) -> Result<(), SchemaError> {
    if !spec.kind.matches(value) {
        return Err(SchemaError::WrongKind {
            field: spec.name.to_string(),
            expected: spec.kind.name(),
            actual: value.kind_name(),
        });
    }

    match value {
        FieldValue::String(text) => {
            if spec.required && text.trim().is_empty() {
                return Err(SchemaError::EmptyField(spec.name));
            }
            if let Some(allowed) = spec.allowed {
                if !allowed.contains(&text.as_str()) {
                    return Err(SchemaError::UnsupportedValue {
                        field: spec.name,
                        value: text.clone(),
                    });
                }
            }
            Ok(())
        }
        FieldValue::Number(number) => check_finite(spec.name, *number),
        FieldValue::Map(inner) => check_map(spec.name, spec.name, inner),
        _ => Ok(()),
    }
}

fn check_finite(path: &str, number: f64) -> Result<(), SchemaError> {
    if number.is_finite() {
        Ok(())
    } else {
        Err(SchemaError::NonFiniteNumber {
            path: path.to_string(),
        })
    }
}

fn check_map(field: &'static str, path: &str, map: &Fields) -> Result<(), SchemaError> {
    for (key, value) in map {
        if key.starts_with('$') {
            return Err(SchemaError::UnsupportedValue {
                field,
                value: key.clone(),
            });
        }
        let nested = format!("{path}.{key}");
        match value {
            FieldValue::Number(number) => check_finite(&nested, *number)?,
            FieldValue::Map(inner) => check_map(field, &nested, inner)?,
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{schema_for, SchemaError};
    use crate::model::record::{fields, FieldValue, Fields, RecordType};

    fn wagon_fields() -> Fields {
        fields([("wagonNumber", "WGN-1001"), ("status", "Available")])
    }

    #[test]
    fn accepts_minimal_wagon() {
        schema_for(RecordType::Wagon)
            .validate(&wagon_fields())
            .expect("minimal wagon should validate");
    }

    #[test]
    fn rejects_missing_required_field() {
        let err = schema_for(RecordType::Wagon)
            .validate(&fields([("wagonNumber", "WGN-1")]))
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingField {
                kind: RecordType::Wagon,
                field: "status"
            }
        );
    }

    #[test]
    fn rejects_unknown_and_reserved_fields() {
        let mut unknown = wagon_fields();
        unknown.insert("color".to_string(), "red".into());
        assert!(matches!(
            schema_for(RecordType::Wagon).validate(&unknown),
            Err(SchemaError::UnknownField { .. })
        ));

        let mut reserved = wagon_fields();
        reserved.insert("createdAt".to_string(), FieldValue::timestamp(1));
        assert_eq!(
            schema_for(RecordType::Wagon).validate(&reserved),
            Err(SchemaError::ReservedField("createdAt".to_string()))
        );
    }

    #[test]
    fn rejects_blank_required_string_and_unknown_status() {
        let blank = fields([("title", "   ")]);
        assert_eq!(
            schema_for(RecordType::Task).validate(&blank),
            Err(SchemaError::EmptyField("title"))
        );

        let bad_status = fields([("wagonNumber", "WGN-1"), ("status", "Lost")]);
        assert!(matches!(
            schema_for(RecordType::Wagon).validate(&bad_status),
            Err(SchemaError::UnsupportedValue { field: "status", .. })
        ));
    }

    #[test]
    fn rejects_wrong_value_shape() {
        let mut body = fields([("title", "Inspect brakes")]);
        body.insert("isCompleted".to_string(), "yes".into());
        assert!(matches!(
            schema_for(RecordType::Task).validate(&body),
            Err(SchemaError::WrongKind { expected: "bool", actual: "string", .. })
        ));
    }

    #[test]
    fn rejects_non_finite_numbers_at_any_depth() {
        let mut inner = Fields::new();
        inner.insert("psi".to_string(), FieldValue::Number(f64::INFINITY));
        let mut checklist = Fields::new();
        checklist.insert("brakes".to_string(), true.into());
        checklist.insert("pressure".to_string(), FieldValue::Map(inner));
        let mut body = fields([("title", "Brake test")]);
        body.insert("checklist".to_string(), FieldValue::Map(checklist));
        assert_eq!(
            schema_for(RecordType::Operation).validate(&body),
            Err(SchemaError::NonFiniteNumber {
                path: "checklist.pressure.psi".to_string()
            })
        );
    }

    #[test]
    fn rejects_dollar_keys_inside_nested_maps() {
        let mut checklist = Fields::new();
        checklist.insert("$timestamp".to_string(), true.into());
        let mut body = fields([("title", "Coupling check")]);
        body.insert("checklist".to_string(), FieldValue::Map(checklist));
        assert!(matches!(
            schema_for(RecordType::Operation).validate(&body),
            Err(SchemaError::UnsupportedValue { field: "checklist", .. })
        ));
    }
}
