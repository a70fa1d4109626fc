//! In-process remote used by tests and the CLI demo.
//!
//! # Responsibility
//! - Keep an ordered change log shared by every connected transport.
//! - Let callers inject faults (offline, rejected credentials, failing pushes).
//!
//! # Invariants
//! - Pull cursors are decimal offsets into the change log.
//! - A transport never pulls back the revisions it pushed itself.

use super::config::{Credentials, Endpoint};
use super::transport::{PullBatch, PushAck, SyncTransport, TransportError, TransportSession};
use crate::model::record::RecordId;
use crate::store::{PushedRevision, Revision};
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

struct LogEntry {
    origin: Uuid,
    revision: Revision,
}

#[derive(Default)]
struct RemoteState {
    required: Option<Credentials>,
    offline: bool,
    connect_faults: VecDeque<TransportError>,
    push_faults: VecDeque<TransportError>,
    log: Vec<LogEntry>,
    documents: BTreeMap<RecordId, Revision>,
    connect_count: usize,
    open_sessions: usize,
}

/// Shared remote; clones see the same state.
#[derive(Clone, Default)]
pub struct LoopbackRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl LoopbackRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remote that only accepts `credentials`.
    pub fn with_credentials(credentials: Credentials) -> Self {
        let remote = Self::new();
        remote.state.lock().required = Some(credentials);
        remote
    }

    /// New transport with its own peer identity.
    pub fn transport(&self) -> LoopbackTransport {
        LoopbackTransport {
            remote: self.clone(),
            peer: Uuid::new_v4(),
        }
    }

    /// While offline, connects and open sessions fail with network errors.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn fail_next_connect(&self, error: TransportError) {
        self.state.lock().connect_faults.push_back(error);
    }

    pub fn fail_next_push(&self, error: TransportError) {
        self.state.lock().push_faults.push_back(error);
    }

    /// Stores a revision as if another peer had pushed it.
    pub fn inject(&self, revision: Revision) {
        let mut state = self.state.lock();
        append(&mut state, Uuid::nil(), revision);
    }

    /// Latest revision per record, tombstones included.
    pub fn documents(&self) -> Vec<Revision> {
        self.state.lock().documents.values().cloned().collect()
    }

    pub fn document(&self, id: RecordId) -> Option<Revision> {
        self.state.lock().documents.get(&id).cloned()
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().connect_count
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().open_sessions
    }

    pub fn log_len(&self) -> usize {
        self.state.lock().log.len()
    }
}

fn append(state: &mut RemoteState, origin: Uuid, revision: Revision) {
    state.documents.insert(revision.id, revision.clone());
    state.log.push(LogEntry { origin, revision });
}

pub struct LoopbackTransport {
    remote: LoopbackRemote,
    peer: Uuid,
}

#[async_trait]
impl SyncTransport for LoopbackTransport {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Box<dyn TransportSession>, TransportError> {
        let mut state = self.remote.state.lock();
        state.connect_count += 1;
        if let Some(error) = state.connect_faults.pop_front() {
            return Err(error);
        }
        if state.offline {
            return Err(TransportError::network(format!(
                "{} is unreachable",
                endpoint.host()
            )));
        }
        if let Some(required) = &state.required {
            if required != credentials {
                return Err(TransportError::auth("credentials rejected"));
            }
        }
        state.open_sessions += 1;
        debug!(
            "event=loopback_connect module=sync status=ok connect_count={}",
            state.connect_count
        );
        Ok(Box::new(LoopbackSession {
            remote: self.remote.clone(),
            peer: self.peer,
            open: true,
        }))
    }
}

struct LoopbackSession {
    remote: LoopbackRemote,
    peer: Uuid,
    open: bool,
}

impl LoopbackSession {
    fn check_open(&self, state: &RemoteState) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::protocol("session already closed").fatal());
        }
        if state.offline {
            return Err(TransportError::network("connection lost"));
        }
        Ok(())
    }
}

#[async_trait]
impl TransportSession for LoopbackSession {
    async fn push(&mut self, revisions: &[Revision]) -> Result<PushAck, TransportError> {
        let mut state = self.remote.state.lock();
        self.check_open(&state)?;
        if let Some(error) = state.push_faults.pop_front() {
            return Err(error);
        }
        let mut accepted = Vec::with_capacity(revisions.len());
        for revision in revisions {
            append(&mut state, self.peer, revision.clone());
            accepted.push(PushedRevision {
                id: revision.id,
                sequence: revision.sequence,
            });
        }
        Ok(PushAck { accepted })
    }

    async fn pull(
        &mut self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<PullBatch, TransportError> {
        let state = self.remote.state.lock();
        self.check_open(&state)?;
        let start = match cursor {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| TransportError::protocol(format!("invalid cursor `{raw}`")))?,
            None => 0,
        };
        if start > state.log.len() {
            return Err(TransportError::protocol(format!(
                "cursor {start} is past the end of the log"
            )));
        }

        let mut revisions = Vec::new();
        let mut position = start;
        for entry in &state.log[start..] {
            if revisions.len() == limit {
                break;
            }
            position += 1;
            if entry.origin != self.peer {
                revisions.push(entry.revision.clone());
            }
        }

        Ok(PullBatch {
            revisions,
            next_cursor: Some(position.to_string()),
            has_more: position < state.log.len(),
        })
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            let mut state = self.remote.state.lock();
            state.open_sessions = state.open_sessions.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::{fields, RecordType};
    use crate::sync::TransportErrorKind;

    fn revision(title: &str, sequence: u64) -> Revision {
        Revision {
            id: Uuid::new_v4(),
            kind: RecordType::Task,
            created_at: 1,
            updated_at: 1,
            sequence,
            fields: fields([("title", title)]),
            is_deleted: false,
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::parse("ws://loopback/yard").unwrap()
    }

    #[tokio::test]
    async fn pull_skips_own_pushes_and_pages_by_cursor() {
        let remote = LoopbackRemote::new();
        let credentials = Credentials::new("yard", "secret");
        let mut mine = remote
            .transport()
            .connect(&endpoint(), &credentials)
            .await
            .unwrap();

        mine.push(&[revision("own", 1)]).await.unwrap();
        remote.inject(revision("a", 1));
        remote.inject(revision("b", 2));

        let first = mine.pull(None, 1).await.unwrap();
        assert_eq!(first.revisions.len(), 1);
        assert_eq!(first.revisions[0].fields, fields([("title", "a")]));
        assert!(first.has_more);

        let second = mine.pull(first.next_cursor.as_deref(), 10).await.unwrap();
        assert_eq!(second.revisions.len(), 1);
        assert!(!second.has_more);
        assert_eq!(second.next_cursor.as_deref(), Some("3"));

        mine.close().await;
        assert_eq!(remote.open_sessions(), 0);
    }

    #[tokio::test]
    async fn connect_reports_injected_faults_and_bad_credentials() {
        let remote = LoopbackRemote::with_credentials(Credentials::new("yard", "secret"));
        let transport = remote.transport();

        let rejected = transport
            .connect(&endpoint(), &Credentials::new("yard", "wrong"))
            .await
            .err()
            .unwrap();
        assert_eq!(rejected.kind, TransportErrorKind::Auth);

        remote.set_offline(true);
        let offline = transport
            .connect(&endpoint(), &Credentials::new("yard", "secret"))
            .await
            .err()
            .unwrap();
        assert_eq!(offline.kind, TransportErrorKind::Network);
        assert_eq!(remote.connect_count(), 2);
    }
}
