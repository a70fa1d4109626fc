//! Query shapes supported by the store.
//!
//! Two shapes only: equality on `type`, optionally ordered by one key.
//! Equal keys always tie-break by `id` ascending so listings are stable.

use crate::model::record::{Record, RecordType};
use crate::model::schema::{schema_for, SchemaError};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Key a listing is ordered by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    CreatedAt,
    UpdatedAt,
    Sequence,
    /// A schema field of the queried type, e.g. `wagonNumber`.
    Field(String),
}

impl SortKey {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    fn column(&self) -> Option<&'static str> {
        match self {
            Self::CreatedAt => Some("created_at"),
            Self::UpdatedAt => Some("updated_at"),
            Self::Sequence => Some("sequence"),
            Self::Field(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub key: SortKey,
    pub direction: SortDirection,
}

/// Type-scoped listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub kind: RecordType,
    pub order: Option<OrderBy>,
    pub limit: Option<u32>,
}

impl RecordQuery {
    /// All live records of `kind`, ordered by `id`.
    pub fn of(kind: RecordType) -> Self {
        Self {
            kind,
            order: None,
            limit: None,
        }
    }

    pub fn order_by(mut self, key: SortKey, direction: SortDirection) -> Self {
        self.order = Some(OrderBy { key, direction });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Rejects ordering by a field the queried type does not define.
    pub(crate) fn validate(&self) -> Result<(), SchemaError> {
        if let Some(OrderBy {
            key: SortKey::Field(name),
            ..
        }) = &self.order
        {
            if schema_for(self.kind).spec(name).is_none() {
                return Err(SchemaError::UnknownField {
                    kind: self.kind,
                    field: name.clone(),
                });
            }
        }
        Ok(())
    }

    /// `ORDER BY` clause for metadata keys. Field keys are sorted after loading.
    pub(crate) fn order_sql(&self) -> String {
        match &self.order {
            Some(order) => match order.key.column() {
                Some(column) => format!("ORDER BY {column} {}, id ASC", order.direction.sql()),
                None => "ORDER BY id ASC".to_string(),
            },
            None => "ORDER BY id ASC".to_string(),
        }
    }

    /// Applies field ordering and the limit to rows loaded in `id` order.
    pub(crate) fn finish(&self, mut records: Vec<Record>) -> Vec<Record> {
        if let Some(OrderBy {
            key: SortKey::Field(name),
            direction,
        }) = &self.order
        {
            // sort_by is stable: rows arrive in id order, so ties keep it.
            records.sort_by(|a, b| {
                let ordering = compare_field(a, b, name);
                match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            records.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        records
    }
}

fn compare_field(a: &Record, b: &Record, name: &str) -> Ordering {
    match (a.field(name), b.field(name)) {
        (Some(left), Some(right)) => left.sort_cmp(right),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::{RecordQuery, SortDirection, SortKey};
    use crate::model::record::RecordType;

    #[test]
    fn metadata_keys_render_sql_with_id_tie_break() {
        let query =
            RecordQuery::of(RecordType::Task).order_by(SortKey::CreatedAt, SortDirection::Desc);
        assert_eq!(query.order_sql(), "ORDER BY created_at DESC, id ASC");
        assert_eq!(
            RecordQuery::of(RecordType::Task).order_sql(),
            "ORDER BY id ASC"
        );
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        let query = RecordQuery::of(RecordType::Wagon)
            .order_by(SortKey::field("title"), SortDirection::Asc);
        assert!(query.validate().is_err());

        let query = RecordQuery::of(RecordType::Wagon)
            .order_by(SortKey::field("wagonNumber"), SortDirection::Asc);
        assert!(query.validate().is_ok());
    }
}
