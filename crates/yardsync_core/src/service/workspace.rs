//! Explicitly constructed application context: one store, one coordinator.
//!
//! # Invariants
//! - `reset_all` stops sync before touching the store and restarts the last
//!   session afterwards, so observers reconnect without a process restart.
//! - A reset can only be requested with a [`ResetConfirmation`].

use super::yard_service::YardService;
use crate::store::{DocumentStore, ResetReport, StoreResult};
use crate::sync::{SyncConfig, SyncCoordinator, SyncResult, SyncTransport};
use log::{info, warn};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// Phrase a user must type (or pass) to confirm a full reset.
pub const RESET_PHRASE: &str = "RESET";

/// Proof that the boundary asked for and received explicit confirmation.
#[derive(Debug)]
pub struct ResetConfirmation {
    _private: (),
}

impl ResetConfirmation {
    /// Returns a token only when `phrase` is exactly [`RESET_PHRASE`].
    pub fn confirm(phrase: &str) -> Option<Self> {
        (phrase == RESET_PHRASE).then_some(Self { _private: () })
    }
}

pub struct Workspace {
    store: DocumentStore,
    service: YardService,
    sync: SyncCoordinator,
    active_config: Mutex<Option<SyncConfig>>,
}

impl Workspace {
    pub fn new(store: DocumentStore, transport: Arc<dyn SyncTransport>) -> Self {
        Self {
            service: YardService::new(store.clone()),
            sync: SyncCoordinator::new(store.clone(), transport),
            store,
            active_config: Mutex::new(None),
        }
    }

    pub fn open(path: impl AsRef<Path>, transport: Arc<dyn SyncTransport>) -> StoreResult<Self> {
        Ok(Self::new(DocumentStore::open(path)?, transport))
    }

    pub fn open_in_memory(transport: Arc<dyn SyncTransport>) -> StoreResult<Self> {
        Ok(Self::new(DocumentStore::open_in_memory()?, transport))
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn service(&self) -> &YardService {
        &self.service
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    pub async fn start_sync(&self, config: SyncConfig) -> SyncResult<()> {
        self.sync.start(config.clone()).await?;
        *self.active_config.lock() = Some(config);
        Ok(())
    }

    pub async fn stop_sync(&self) {
        self.active_config.lock().take();
        self.sync.stop().await;
    }

    /// Destroys every record and reinitializes the store.
    ///
    /// # Preconditions
    /// - No CRUD call may run concurrently with the reset.
    ///
    /// # Errors
    /// - Store errors from the reset itself; the store is then unchanged.
    pub async fn reset_all(&self, _confirmation: ResetConfirmation) -> StoreResult<ResetReport> {
        let resume = self.active_config.lock().clone();
        self.sync.stop().await;

        let result = self.store.reset_all();

        if let Some(config) = resume {
            if let Err(err) = self.sync.start(config).await {
                warn!(
                    "event=sync_resume module=service status=error error_code={}",
                    err.code()
                );
            }
        }

        let report = result?;
        info!(
            "event=workspace_reset module=service status=ok removed_records={}",
            report.removed_records
        );
        Ok(report)
    }
}
