//! Sync coordinator: one replication session per store instance.
//!
//! # Responsibility
//! - Validate endpoint, credentials and direction before a session starts.
//! - Drive push/pull cycles on a background tokio task.
//! - Publish every connection-state transition to subscribers, in order.
//!
//! # Invariants
//! - At most one session is active per coordinator.
//! - Session failures surface only as status events, never as `Err` to callers.
//!
//! # See also
//! - `store::replication` for the store side of push/pull.

mod config;
mod conflict;
mod coordinator;
pub mod loopback;
mod state;
mod transport;

pub use config::{Backoff, Credentials, Endpoint, RetryPolicy, SyncConfig, SyncDirection};
pub use conflict::LastWriterWins;
pub use coordinator::SyncCoordinator;
pub use loopback::{LoopbackRemote, LoopbackTransport};
pub use state::{StatusEvent, StatusSubscription, SyncState};
pub use transport::{
    PullBatch, PushAck, SyncTransport, TransportError, TransportErrorKind, TransportSession,
};

use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug)]
pub enum SyncError {
    /// Endpoint, credentials or session options are malformed.
    Configuration(String),
    Store(StoreError),
    Transport(TransportError),
    /// A background store job panicked or was cancelled.
    Worker(String),
}

impl SyncError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Store(err) => err.code(),
            Self::Transport(_) | Self::Worker(_) => "sync_error",
        }
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(message) => write!(f, "invalid sync configuration: {message}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Transport(err) => write!(f, "{err}"),
            Self::Worker(message) => write!(f, "sync worker failed: {message}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Configuration(_) | Self::Worker(_) => None,
            Self::Store(err) => Some(err),
            Self::Transport(err) => Some(err),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<TransportError> for SyncError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}
