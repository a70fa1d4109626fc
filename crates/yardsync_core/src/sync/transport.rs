//! Transport seam between the coordinator and a remote endpoint.
//!
//! The coordinator owns the session lifecycle; implementations own the wire.

use super::config::{Credentials, Endpoint};
use crate::store::{PushedRevision, Revision};
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Remote unreachable or connection dropped.
    Network,
    /// Credentials rejected.
    Auth,
    /// Remote answered with something the session cannot use.
    Protocol,
}

impl TransportErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Protocol => "protocol",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Network,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Auth,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Protocol,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(mut self) -> Self {
        self.retryable = false;
        self
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error: {}", self.kind.as_str(), self.message)
    }
}

impl Error for TransportError {}

/// Revisions the remote accepted from one push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushAck {
    pub accepted: Vec<PushedRevision>,
}

/// One page of remote changes after a cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullBatch {
    pub revisions: Vec<Revision>,
    /// Cursor to resume from; `None` keeps the previous one.
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Box<dyn TransportSession>, TransportError>;
}

#[async_trait]
pub trait TransportSession: Send {
    async fn push(&mut self, revisions: &[Revision]) -> Result<PushAck, TransportError>;

    async fn pull(
        &mut self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<PullBatch, TransportError>;

    /// Releases the connection. Called exactly once per session.
    async fn close(&mut self);
}
