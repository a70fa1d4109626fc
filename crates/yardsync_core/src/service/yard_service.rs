//! Record-type wrappers for tasks, wagons and yard operations.
//!
//! # Invariants
//! - A wrapper only ever reads or writes records of its own type; an id of
//!   another type is reported as `NotFound`.
//! - Drafts describe the full content, so updates replace all fields.

use crate::model::now_epoch_ms;
use crate::model::operation::{OperationDraft, OperationStatus, YardOperation};
use crate::model::record::{fields, FieldValue, Record, RecordId, RecordType};
use crate::model::task::{Task, TaskDraft};
use crate::model::wagon::{Wagon, WagonDraft, WagonStatus};
use crate::store::{
    DocumentStore, RawDocument, RecordQuery, SortDirection, SortKey, StoreError, StoreResult,
};

const SAMPLE_TYPES: [&str; 4] = ["Boxcar", "Flatcar", "Hopper", "Tank"];
const SAMPLE_LOCATIONS: [&str; 5] = ["Track 1", "Track 2", "Track 3", "Hump", "Repair Shop"];
const SAMPLE_DESTINATIONS: [&str; 4] = ["North Terminal", "Port Yard", "Steel Works", "Depot"];

/// Type-specific CRUD entry points for UI and CLI callers.
#[derive(Clone)]
pub struct YardService {
    store: DocumentStore,
}

impl YardService {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn create_task(&self, draft: &TaskDraft) -> StoreResult<RecordId> {
        self.store.create(RecordType::Task, draft.to_fields())
    }

    /// Newest first.
    pub fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        let query = RecordQuery::of(RecordType::Task)
            .order_by(SortKey::CreatedAt, SortDirection::Desc);
        self.store
            .query(&query)?
            .iter()
            .map(|record| Task::from_record(record).map_err(StoreError::from))
            .collect()
    }

    pub fn get_task(&self, id: RecordId) -> StoreResult<Option<Task>> {
        self.find(id, RecordType::Task)?
            .map(|record| Task::from_record(&record).map_err(StoreError::from))
            .transpose()
    }

    pub fn update_task(&self, id: RecordId, draft: &TaskDraft) -> StoreResult<u64> {
        self.require(id, RecordType::Task)?;
        self.store.replace(id, draft.to_fields())
    }

    pub fn set_task_completed(&self, id: RecordId, is_completed: bool) -> StoreResult<u64> {
        self.require(id, RecordType::Task)?;
        self.store.update(id, fields([("isCompleted", is_completed)]))
    }

    pub fn delete_task(&self, id: RecordId) -> StoreResult<()> {
        self.require(id, RecordType::Task)?;
        self.store.delete(id)
    }

    pub fn create_wagon(&self, draft: &WagonDraft) -> StoreResult<RecordId> {
        self.store.create(RecordType::Wagon, draft.to_fields())
    }

    /// Ordered by wagon number; ties keep id order.
    pub fn list_wagons(&self) -> StoreResult<Vec<Wagon>> {
        let query = RecordQuery::of(RecordType::Wagon)
            .order_by(SortKey::field("wagonNumber"), SortDirection::Asc);
        self.store
            .query(&query)?
            .iter()
            .map(|record| Wagon::from_record(record).map_err(StoreError::from))
            .collect()
    }

    pub fn get_wagon(&self, id: RecordId) -> StoreResult<Option<Wagon>> {
        self.find(id, RecordType::Wagon)?
            .map(|record| Wagon::from_record(&record).map_err(StoreError::from))
            .transpose()
    }

    pub fn update_wagon(&self, id: RecordId, draft: &WagonDraft) -> StoreResult<u64> {
        self.require(id, RecordType::Wagon)?;
        self.store.replace(id, draft.to_fields())
    }

    pub fn set_wagon_status(&self, id: RecordId, status: WagonStatus) -> StoreResult<u64> {
        self.require(id, RecordType::Wagon)?;
        self.store.update(id, fields([("status", status.as_str())]))
    }

    pub fn delete_wagon(&self, id: RecordId) -> StoreResult<()> {
        self.require(id, RecordType::Wagon)?;
        self.store.delete(id)
    }

    pub fn create_operation(&self, draft: &OperationDraft) -> StoreResult<RecordId> {
        self.store.create(RecordType::Operation, draft.to_fields())
    }

    /// Newest first.
    pub fn list_operations(&self) -> StoreResult<Vec<YardOperation>> {
        let query = RecordQuery::of(RecordType::Operation)
            .order_by(SortKey::CreatedAt, SortDirection::Desc);
        self.store
            .query(&query)?
            .iter()
            .map(|record| YardOperation::from_record(record).map_err(StoreError::from))
            .collect()
    }

    pub fn operations_for_wagon(&self, wagon_id: RecordId) -> StoreResult<Vec<YardOperation>> {
        Ok(self
            .list_operations()?
            .into_iter()
            .filter(|operation| operation.draft.wagon_id == Some(wagon_id))
            .collect())
    }

    pub fn get_operation(&self, id: RecordId) -> StoreResult<Option<YardOperation>> {
        self.find(id, RecordType::Operation)?
            .map(|record| YardOperation::from_record(&record).map_err(StoreError::from))
            .transpose()
    }

    pub fn update_operation(&self, id: RecordId, draft: &OperationDraft) -> StoreResult<u64> {
        self.require(id, RecordType::Operation)?;
        self.store.replace(id, draft.to_fields())
    }

    /// Marks an operation completed now. Checklist and other fields stay.
    pub fn complete_operation(&self, id: RecordId) -> StoreResult<u64> {
        self.require(id, RecordType::Operation)?;
        let mut changes = fields([("status", OperationStatus::Completed.as_str())]);
        changes.insert(
            "completedAt".to_string(),
            FieldValue::timestamp(now_epoch_ms()),
        );
        self.store.update(id, changes)
    }

    pub fn delete_operation(&self, id: RecordId) -> StoreResult<()> {
        self.require(id, RecordType::Operation)?;
        self.store.delete(id)
    }

    /// Creates `count` sample wagons numbered after the wagons already stored.
    ///
    /// Content depends only on the running index, so two empty stores seeded
    /// with the same count hold the same wagons.
    pub fn seed_sample_wagons(&self, count: usize) -> StoreResult<Vec<RecordId>> {
        let offset = usize::try_from(self.store.count(RecordType::Wagon)?)
            .map_err(|_| StoreError::InvalidData("wagon count exceeds usize".to_string()))?;
        (offset..offset + count)
            .map(|index| self.create_wagon(&sample_wagon(index)))
            .collect()
    }

    pub fn total_count(&self) -> StoreResult<u64> {
        self.store.count_all()
    }

    pub fn raw_documents(&self) -> StoreResult<Vec<RawDocument>> {
        self.store.list_raw()
    }

    fn find(&self, id: RecordId, kind: RecordType) -> StoreResult<Option<Record>> {
        Ok(self
            .store
            .get_by_id(id)?
            .filter(|record| record.kind == kind))
    }

    fn require(&self, id: RecordId, kind: RecordType) -> StoreResult<Record> {
        self.find(id, kind)?.ok_or(StoreError::NotFound(id))
    }
}

fn sample_wagon(index: usize) -> WagonDraft {
    let number = index + 1;
    WagonDraft {
        wagon_number: format!("WGN-{:04}", 1000 + number),
        wagon_type: SAMPLE_TYPES[index % SAMPLE_TYPES.len()].to_string(),
        status: WagonStatus::ALL[index % WagonStatus::ALL.len()],
        current_location: SAMPLE_LOCATIONS[index % SAMPLE_LOCATIONS.len()].to_string(),
        destination: SAMPLE_DESTINATIONS[index % SAMPLE_DESTINATIONS.len()].to_string(),
        requires_legal_check: index % 3 == 0,
        last_inspection: None,
        notes: format!("Sample wagon {number}"),
    }
}

#[cfg(test)]
mod tests {
    use super::sample_wagon;
    use crate::model::wagon::WagonStatus;

    #[test]
    fn sample_wagons_cycle_through_statuses() {
        let first = sample_wagon(0);
        assert_eq!(first.wagon_number, "WGN-1001");
        assert_eq!(first.status, WagonStatus::Available);
        assert_eq!(sample_wagon(1).status, WagonStatus::InTransit);
        assert_eq!(sample_wagon(4).status, WagonStatus::Available);
        assert_eq!(sample_wagon(9).wagon_number, "WGN-1010");
    }
}
