//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose yard record CRUD to Dart via FRB with flat DTOs.
//! - Map core errors to envelope messages.
//!
//! # Invariants
//! - Exported functions never panic across the FFI boundary.
//! - Ids travel as hyphenated UUID strings.
//! - A reset only runs when the caller passes the confirmation phrase.

use log::warn;
use std::path::PathBuf;
use std::sync::OnceLock;
use uuid::Uuid;
use yardsync_core::config::DB_PATH_ENV;
use yardsync_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    DocumentStore, RecordType, ResetConfirmation, StoreResult, Task, TaskDraft, Wagon,
    WagonDraft, WagonStatus, YardService,
};

const DB_FILE_NAME: &str = "yardsync.sqlite3";
const SEED_LIMIT: u32 = 500;
static DB_PATH: OnceLock<PathBuf> = OnceLock::new();

#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes core logging once per process.
///
/// # FFI contract
/// - Idempotent for the same `level + log_dir`.
/// - Returns an empty string on success and the error message otherwise.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Pins the database file used by every later call.
///
/// Returns `false` when a path was already resolved.
#[flutter_rust_bridge::frb(sync)]
pub fn configure_db_path(path: String) -> bool {
    let trimmed = path.trim();
    !trimmed.is_empty() && DB_PATH.set(PathBuf::from(trimmed)).is_ok()
}

/// Wagon fields as edited by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WagonInput {
    pub wagon_number: String,
    pub wagon_type: String,
    /// Display label, e.g. `In Transit`.
    pub status: String,
    pub current_location: String,
    pub destination: String,
    pub requires_legal_check: bool,
    pub last_inspection_epoch_ms: Option<i64>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WagonItem {
    pub id: String,
    pub wagon_number: String,
    pub wagon_type: String,
    pub status: String,
    pub current_location: String,
    pub destination: String,
    pub requires_legal_check: bool,
    pub last_inspection_epoch_ms: Option<i64>,
    pub notes: String,
    pub created_at_epoch_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub is_completed: bool,
    pub created_at_epoch_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WagonListResponse {
    pub ok: bool,
    pub items: Vec<WagonItem>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskListResponse {
    pub ok: bool,
    pub items: Vec<TaskItem>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocumentItem {
    pub id: String,
    pub kind: String,
    pub json: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocumentsResponse {
    pub ok: bool,
    pub items: Vec<RawDocumentItem>,
    pub message: String,
}

/// Generic result envelope for mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub ok: bool,
    /// Affected record id, when there is exactly one.
    pub record_id: Option<String>,
    /// Number of records counted, created or removed, when relevant.
    pub count: Option<u64>,
    /// Stable machine-readable error code; empty on success.
    pub error_code: String,
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            record_id: None,
            count: None,
            error_code: String::new(),
            message: message.into(),
        }
    }

    fn with_id(mut self, id: Uuid) -> Self {
        self.record_id = Some(id.to_string());
        self
    }

    fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    fn failure(error_code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            record_id: None,
            count: None,
            error_code: error_code.to_string(),
            message: message.into(),
        }
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn wagon_create(input: WagonInput) -> ActionResponse {
    action("wagon_create", |service| {
        let draft = match to_wagon_draft(&input) {
            Ok(draft) => draft,
            Err(response) => return Ok(response),
        };
        let id = service.create_wagon(&draft)?;
        Ok(ActionResponse::success("Wagon created.").with_id(id))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn wagon_list() -> WagonListResponse {
    match with_service(|service| service.list_wagons()) {
        Ok(wagons) => WagonListResponse {
            ok: true,
            message: format!("{} wagon(s).", wagons.len()),
            items: wagons.into_iter().map(to_wagon_item).collect(),
        },
        Err(message) => WagonListResponse {
            ok: false,
            items: Vec::new(),
            message: format!("wagon_list failed: {message}"),
        },
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn wagon_update(id: String, input: WagonInput) -> ActionResponse {
    action("wagon_update", |service| {
        let id = match parse_id(&id) {
            Ok(id) => id,
            Err(response) => return Ok(response),
        };
        let draft = match to_wagon_draft(&input) {
            Ok(draft) => draft,
            Err(response) => return Ok(response),
        };
        service.update_wagon(id, &draft)?;
        Ok(ActionResponse::success("Wagon updated.").with_id(id))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn wagon_delete(id: String) -> ActionResponse {
    action("wagon_delete", |service| {
        let id = match parse_id(&id) {
            Ok(id) => id,
            Err(response) => return Ok(response),
        };
        service.delete_wagon(id)?;
        Ok(ActionResponse::success("Wagon deleted.").with_id(id))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn task_create(title: String, description: String) -> ActionResponse {
    action("task_create", |service| {
        let draft = TaskDraft {
            title: title.trim().to_string(),
            description: description.trim().to_string(),
            is_completed: false,
        };
        let id = service.create_task(&draft)?;
        Ok(ActionResponse::success("Task created.").with_id(id))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn task_list() -> TaskListResponse {
    match with_service(|service| service.list_tasks()) {
        Ok(tasks) => TaskListResponse {
            ok: true,
            message: format!("{} task(s).", tasks.len()),
            items: tasks.into_iter().map(to_task_item).collect(),
        },
        Err(message) => TaskListResponse {
            ok: false,
            items: Vec::new(),
            message: format!("task_list failed: {message}"),
        },
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn task_set_completed(id: String, is_completed: bool) -> ActionResponse {
    action("task_set_completed", |service| {
        let id = match parse_id(&id) {
            Ok(id) => id,
            Err(response) => return Ok(response),
        };
        service.set_task_completed(id, is_completed)?;
        Ok(ActionResponse::success("Task updated.").with_id(id))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn task_delete(id: String) -> ActionResponse {
    action("task_delete", |service| {
        let id = match parse_id(&id) {
            Ok(id) => id,
            Err(response) => return Ok(response),
        };
        service.delete_task(id)?;
        Ok(ActionResponse::success("Task deleted.").with_id(id))
    })
}

/// Creates up to 500 sample wagons.
#[flutter_rust_bridge::frb(sync)]
pub fn seed_sample_wagons(count: u32) -> ActionResponse {
    let count = count.min(SEED_LIMIT);
    action("seed_sample_wagons", |service| {
        let created = service.seed_sample_wagons(count as usize)?;
        Ok(ActionResponse::success(format!("Created {} wagon(s).", created.len()))
            .with_count(created.len() as u64))
    })
}

/// Counts live records of `kind` (`task|wagon|operation`), or of every kind.
#[flutter_rust_bridge::frb(sync)]
pub fn record_count(kind: Option<String>) -> ActionResponse {
    let kind = match kind.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match RecordType::parse(raw) {
            Some(kind) => Some(kind),
            None => {
                return ActionResponse::failure(
                    "configuration_error",
                    format!("unknown record type `{raw}`"),
                )
            }
        },
    };
    action("record_count", |service| {
        let count = match kind {
            Some(kind) => service.store().count(kind)?,
            None => service.total_count()?,
        };
        Ok(ActionResponse::success(format!("{count} record(s).")).with_count(count))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn raw_documents() -> RawDocumentsResponse {
    match with_service(|service| service.raw_documents()) {
        Ok(documents) => RawDocumentsResponse {
            ok: true,
            message: format!("{} document(s).", documents.len()),
            items: documents
                .into_iter()
                .map(|document| RawDocumentItem {
                    id: document.id.to_string(),
                    kind: document.kind.as_str().to_string(),
                    json: document.json,
                })
                .collect(),
        },
        Err(message) => RawDocumentsResponse {
            ok: false,
            items: Vec::new(),
            message: format!("raw_documents failed: {message}"),
        },
    }
}

/// Irreversibly deletes every record.
///
/// # FFI contract
/// - `confirm_phrase` must equal `RESET`; anything else changes nothing.
/// - On failure the store is left exactly as before.
#[flutter_rust_bridge::frb(sync)]
pub fn reset_all(confirm_phrase: String) -> ActionResponse {
    let Some(_confirmation) = ResetConfirmation::confirm(confirm_phrase.as_str()) else {
        return ActionResponse::failure(
            "confirmation_required",
            "reset_all requires the confirmation phrase",
        );
    };
    action("reset_all", |service| {
        let report = service.store().reset_all()?;
        Ok(ActionResponse::success("Store reset.").with_count(report.removed_records as u64))
    })
}

fn resolve_db_path() -> PathBuf {
    DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var(DB_PATH_ENV) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(DB_FILE_NAME)
        })
        .clone()
}

fn with_service<T>(f: impl FnOnce(&YardService) -> StoreResult<T>) -> Result<T, String> {
    let store = DocumentStore::open(resolve_db_path())
        .map_err(|err| format!("store open failed: {err}"))?;
    f(&YardService::new(store)).map_err(|err| err.to_string())
}

fn action(
    name: &str,
    f: impl FnOnce(&YardService) -> StoreResult<ActionResponse>,
) -> ActionResponse {
    let store = match DocumentStore::open(resolve_db_path()) {
        Ok(store) => store,
        Err(err) => {
            warn!(
                "event=ffi_call module=ffi status=error call={name} error_code={}",
                err.code()
            );
            return ActionResponse::failure(err.code(), format!("{name} failed: {err}"));
        }
    };
    match f(&YardService::new(store)) {
        Ok(response) => response,
        Err(err) => {
            warn!(
                "event=ffi_call module=ffi status=error call={name} error_code={}",
                err.code()
            );
            ActionResponse::failure(err.code(), format!("{name} failed: {err}"))
        }
    }
}

fn parse_id(raw: &str) -> Result<Uuid, ActionResponse> {
    Uuid::parse_str(raw.trim()).map_err(|_| {
        ActionResponse::failure("configuration_error", format!("invalid record id `{raw}`"))
    })
}

fn to_wagon_draft(input: &WagonInput) -> Result<WagonDraft, ActionResponse> {
    let status = WagonStatus::parse(&input.status).ok_or_else(|| {
        ActionResponse::failure(
            "configuration_error",
            format!("unknown wagon status `{}`", input.status),
        )
    })?;
    Ok(WagonDraft {
        wagon_number: input.wagon_number.trim().to_string(),
        wagon_type: input.wagon_type.trim().to_string(),
        status,
        current_location: input.current_location.trim().to_string(),
        destination: input.destination.trim().to_string(),
        requires_legal_check: input.requires_legal_check,
        last_inspection: input.last_inspection_epoch_ms,
        notes: input.notes.clone(),
    })
}

fn to_wagon_item(wagon: Wagon) -> WagonItem {
    WagonItem {
        id: wagon.id.to_string(),
        wagon_number: wagon.wagon_number,
        wagon_type: wagon.wagon_type,
        status: wagon.status.as_str().to_string(),
        current_location: wagon.current_location,
        destination: wagon.destination,
        requires_legal_check: wagon.requires_legal_check,
        last_inspection_epoch_ms: wagon.last_inspection,
        notes: wagon.notes,
        created_at_epoch_ms: wagon.created_at,
    }
}

fn to_task_item(task: Task) -> TaskItem {
    TaskItem {
        id: task.id.to_string(),
        title: task.title,
        description: task.description,
        is_completed: task.is_completed,
        created_at_epoch_ms: task.created_at,
    }
}
