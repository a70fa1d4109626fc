//! Session lifecycle: start, stop and the background push/pull worker.
//!
//! # Invariants
//! - `start` fully stops the previous session before the next one publishes.
//! - `stop` emits exactly one `Stopped`, after the worker has closed its
//!   transport.
//! - The worker only publishes under its own generation, so a superseded
//!   session can never leak a late transition.
//! - Store calls from the worker run on the blocking pool, never on the
//!   runtime thread.

use super::conflict::LastWriterWins;
use super::config::{Endpoint, SyncConfig};
use super::state::{StatusHub, StatusSubscription, SyncState};
use super::transport::{PullBatch, SyncTransport, TransportErrorKind, TransportSession};
use super::{SyncError, SyncResult};
use crate::model::now_epoch_ms;
use crate::store::{
    ApplyOutcome, ChangeOrigin, ConflictResolver, DocumentStore, Revision, StoreResult,
};
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

struct ActiveSession {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns at most one replication session for one store.
///
/// `start` spawns onto the ambient tokio runtime.
pub struct SyncCoordinator {
    store: DocumentStore,
    transport: Arc<dyn SyncTransport>,
    resolver: Arc<dyn ConflictResolver>,
    hub: Arc<StatusHub>,
    session: Mutex<Option<ActiveSession>>,
}

impl SyncCoordinator {
    /// Coordinator resolving conflicts with [`LastWriterWins`].
    pub fn new(store: DocumentStore, transport: Arc<dyn SyncTransport>) -> Self {
        Self {
            store,
            transport,
            resolver: Arc::new(LastWriterWins),
            hub: Arc::new(StatusHub::new()),
            session: Mutex::new(None),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Starts a session, replacing any active one.
    ///
    /// # Errors
    /// - `Configuration` when the config does not validate. Connection and
    ///   auth failures are reported through status events instead.
    pub async fn start(&self, config: SyncConfig) -> SyncResult<()> {
        let endpoint = match config.validate() {
            Ok(endpoint) => endpoint,
            Err(err) => {
                warn!(
                    "event=sync_start module=sync status=error error_code={}",
                    err.code()
                );
                return Err(err);
            }
        };

        let mut slot = self.session.lock().await;
        self.stop_locked(&mut slot).await;

        let generation = self.hub.advance_generation();
        self.hub.publish(generation, SyncState::Connecting);
        info!(
            "event=sync_start module=sync status=start scheme={} direction={} continuous={}",
            endpoint.scheme(),
            config.direction.as_str(),
            config.continuous
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = SessionWorker {
            store: self.store.clone(),
            transport: Arc::clone(&self.transport),
            resolver: Arc::clone(&self.resolver),
            hub: Arc::clone(&self.hub),
            generation,
            endpoint,
            config,
        };
        let handle = tokio::spawn(worker.run(shutdown_rx));
        *slot = Some(ActiveSession { shutdown, handle });
        Ok(())
    }

    /// Stops the active session. No session means no notification.
    pub async fn stop(&self) {
        let mut slot = self.session.lock().await;
        self.stop_locked(&mut slot).await;
    }

    async fn stop_locked(&self, slot: &mut Option<ActiveSession>) {
        let Some(active) = slot.take() else {
            return;
        };
        let started_at = Instant::now();
        self.hub.advance_generation();
        // Send fails only when the worker already exited on its own.
        let _ = active.shutdown.send(true);
        if let Err(err) = active.handle.await {
            warn!("event=sync_stop module=sync status=error error_code=join_failed error={err}");
        }
        self.hub.publish_current(SyncState::Stopped);
        info!(
            "event=sync_stop module=sync status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
    }

    /// `true` while a session is connected, idle or transferring.
    pub fn is_syncing(&self) -> bool {
        self.hub.snapshot().is_syncing()
    }

    pub fn status(&self) -> String {
        self.hub.snapshot().status_text()
    }

    pub fn state(&self) -> SyncState {
        self.hub.snapshot()
    }

    /// Subscribes to every transition published from now on.
    pub fn subscribe(&self) -> StatusSubscription {
        self.hub.subscribe()
    }

    /// `true` when a session was started and not yet stopped.
    ///
    /// One-shot sessions stay here until `stop` even after finishing.
    pub async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }
}

enum SessionEnd {
    Shutdown,
    /// One-shot session finished its cycle.
    Completed,
    Failed(SyncError),
}

struct SessionWorker {
    store: DocumentStore,
    transport: Arc<dyn SyncTransport>,
    resolver: Arc<dyn ConflictResolver>,
    hub: Arc<StatusHub>,
    generation: u64,
    endpoint: Endpoint,
    config: SyncConfig,
}

impl SessionWorker {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = self.config.retry.backoff();
        loop {
            let connect = self
                .transport
                .connect(&self.endpoint, &self.config.credentials);
            let end = match until_shutdown(&mut shutdown, connect).await {
                None => SessionEnd::Shutdown,
                Some(Err(err)) => SessionEnd::Failed(err.into()),
                Some(Ok(mut session)) => {
                    backoff.reset();
                    info!("event=sync_connect module=sync status=ok");
                    let end = self.drive(session.as_mut(), &mut shutdown).await;
                    session.close().await;
                    end
                }
            };

            match end {
                SessionEnd::Shutdown => return,
                SessionEnd::Completed => {
                    self.publish(SyncState::Stopped);
                    return;
                }
                SessionEnd::Failed(err) => {
                    self.report_failure(&err);
                    if !self.config.continuous || !is_retryable(&err) {
                        return;
                    }
                    let delay = backoff.next_delay();
                    debug!(
                        "event=sync_retry module=sync status=start attempt={} delay_ms={}",
                        backoff.attempt(),
                        delay.as_millis()
                    );
                    if until_shutdown(&mut shutdown, tokio::time::sleep(delay))
                        .await
                        .is_none()
                    {
                        return;
                    }
                    self.publish(SyncState::Connecting);
                }
            }
        }
    }

    /// Runs cycles on one connected session until it fails or shuts down.
    async fn drive(
        &self,
        session: &mut dyn TransportSession,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let mut changes = self.store.subscribe_changes();
        let mut epoch = changes.borrow_and_update().epoch;

        loop {
            match until_shutdown(shutdown, self.cycle(&mut *session)).await {
                None => return SessionEnd::Shutdown,
                Some(Err(err)) => return SessionEnd::Failed(err),
                Some(Ok(())) => {}
            }
            if !self.config.continuous {
                return SessionEnd::Completed;
            }

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_requested(shutdown) => return SessionEnd::Shutdown,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            return SessionEnd::Shutdown;
                        }
                        let change = *changes.borrow_and_update();
                        if change.epoch != epoch {
                            epoch = change.epoch;
                            info!("event=sync_store_reset module=sync status=ok epoch={epoch}");
                            break;
                        }
                        // Writes made by this session's own pulls need no new cycle.
                        if change.origin != ChangeOrigin::Remote {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(self.config.poll_interval) => break,
                }
            }
        }
    }

    /// Pull first so remote winners are in place before local changes go up.
    async fn cycle(&self, session: &mut dyn TransportSession) -> SyncResult<()> {
        let started_at = Instant::now();
        let batch_size = self.config.batch_size;
        let mut pulled = 0usize;
        let mut conflicts = 0usize;
        let mut pushed = 0usize;

        if self.config.direction.pulls() {
            loop {
                let key = self.endpoint.as_str().to_string();
                let cursor = self.on_store(move |store| store.checkpoint(&key)).await?;
                let PullBatch {
                    revisions,
                    next_cursor,
                    has_more,
                } = session.pull(cursor.as_deref(), batch_size).await?;
                if !revisions.is_empty() {
                    self.publish(SyncState::Busy);
                }

                let key = self.endpoint.as_str().to_string();
                let resolver = Arc::clone(&self.resolver);
                let (applied, conflicted) = self
                    .on_store(move |store| {
                        let mut conflicted = 0usize;
                        for revision in &revisions {
                            let outcome = store.apply_remote(revision, resolver.as_ref())?;
                            if matches!(outcome, ApplyOutcome::Conflict { .. }) {
                                conflicted += 1;
                            }
                        }
                        if let Some(next) = next_cursor.as_deref() {
                            store.save_checkpoint(&key, Some(next))?;
                        }
                        Ok((revisions.len(), conflicted))
                    })
                    .await?;
                pulled += applied;
                conflicts += conflicted;
                if !has_more {
                    break;
                }
            }
        }

        if self.config.direction.pushes() {
            loop {
                let pending = self
                    .on_store(move |store| store.pending_changes(batch_size))
                    .await?;
                if pending.is_empty() {
                    break;
                }
                self.publish(SyncState::Busy);
                let revisions: Vec<Revision> = pending.iter().map(Revision::from).collect();
                let accepted = session.push(&revisions).await?.accepted;
                let cleared = self
                    .on_store(move |store| store.mark_pushed(&accepted))
                    .await?;
                pushed += cleared;
                if cleared == 0 || pending.len() < batch_size {
                    break;
                }
            }
            if pushed > 0 {
                self.compact().await?;
            }
        }

        self.publish(SyncState::Idle);
        debug!(
            "event=sync_cycle module=sync status=ok duration_ms={} pulled={pulled} pushed={pushed} conflicts={conflicts}",
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Drops pushed tombstones and conflict history past the retention window.
    async fn compact(&self) -> SyncResult<()> {
        let retention_ms = i64::try_from(self.config.conflict_retention.as_millis())
            .unwrap_or(i64::MAX);
        let (purged, pruned) = self
            .on_store(move |store| {
                let cutoff = now_epoch_ms().saturating_sub(retention_ms);
                Ok((store.purge_tombstones()?, store.prune_conflicts(cutoff)?))
            })
            .await?;
        debug!("event=sync_compact module=sync status=ok purged={purged} pruned={pruned}");
        Ok(())
    }

    async fn on_store<T, F>(&self, job: F) -> SyncResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&DocumentStore) -> StoreResult<T> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || job(&store))
            .await
            .map_err(|err| SyncError::Worker(format!("store task join failed: {err}")))?
            .map_err(SyncError::from)
    }

    fn publish(&self, state: SyncState) {
        let label = state.label();
        if self.hub.publish(self.generation, state) {
            debug!("event=sync_state module=sync status=ok state={label}");
        }
    }

    fn report_failure(&self, err: &SyncError) {
        let state = match err {
            SyncError::Transport(transport) if transport.kind == TransportErrorKind::Network => {
                SyncState::Offline
            }
            SyncError::Transport(transport) => SyncState::Error(transport.message.clone()),
            other => SyncState::Error(other.to_string()),
        };
        warn!(
            "event=sync_session module=sync status=error error_code={} state={}",
            err.code(),
            state.label()
        );
        self.publish(state);
    }
}

fn is_retryable(err: &SyncError) -> bool {
    match err {
        SyncError::Transport(transport) => transport.retryable,
        SyncError::Store(_) | SyncError::Worker(_) => true,
        SyncError::Configuration(_) => false,
    }
}

/// Runs `future` unless shutdown is requested first.
async fn until_shutdown<F: Future>(
    shutdown: &mut watch::Receiver<bool>,
    future: F,
) -> Option<F::Output> {
    if *shutdown.borrow() {
        return None;
    }
    tokio::select! {
        biased;
        _ = shutdown_requested(shutdown) => None,
        output = future => Some(output),
    }
}

/// Resolves once shutdown is signalled or the coordinator is dropped.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
