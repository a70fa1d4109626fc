//! Core of the yard app: document store, typed record wrappers and the
//! sync coordinator.
//! Every business invariant lives in this crate; boundary crates only map
//! inputs and errors.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;
pub mod sync;

pub use config::{ConfigError, CoreConfig, SyncSection};
pub use logging::{init_logging, init_logging_with, logging_status, LogLevel, LogSettings};
pub use model::operation::{OperationDraft, OperationPriority, OperationStatus, YardOperation};
pub use model::record::{FieldValue, Fields, Record, RecordId, RecordType};
pub use model::schema::SchemaError;
pub use model::task::{Task, TaskDraft};
pub use model::wagon::{Wagon, WagonDraft, WagonStatus};
pub use service::workspace::{ResetConfirmation, Workspace, RESET_PHRASE};
pub use service::yard_service::YardService;
pub use store::{DocumentStore, RecordQuery, SortDirection, SortKey, StoreError, StoreResult};
pub use sync::{SyncConfig, SyncCoordinator, SyncError, SyncState};

/// Health check for boundary integration.
pub fn ping() -> &'static str {
    "pong"
}

pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
