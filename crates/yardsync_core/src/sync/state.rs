//! Connection-state snapshot and ordered status fan-out.
//!
//! # Invariants
//! - Subscribers receive each transition exactly once, in publish order.
//! - Events tagged with a superseded session generation are dropped.
//! - Publishing a state equal to the current one emits nothing.

use parking_lot::Mutex;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Disconnected,
    Connecting,
    Idle,
    Busy,
    /// Transport lost; the session keeps retrying.
    Offline,
    /// Auth, protocol or local storage failure; the session keeps retrying.
    Error(String),
    Stopped,
}

impl SyncState {
    /// Human-readable status line shown by UI and CLI.
    pub fn status_text(&self) -> String {
        match self {
            Self::Disconnected => "Not Connected".to_string(),
            Self::Connecting => "Connecting...".to_string(),
            Self::Idle => "Connected (Idle)".to_string(),
            Self::Busy => "Syncing...".to_string(),
            Self::Offline => "Offline".to_string(),
            Self::Error(message) => format!("Error: {message}"),
            Self::Stopped => "Stopped".to_string(),
        }
    }

    /// `true` while connected, whether idle or transferring.
    pub fn is_syncing(&self) -> bool {
        matches!(self, Self::Idle | Self::Busy)
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Offline => "offline",
            Self::Error(_) => "error",
            Self::Stopped => "stopped",
        }
    }
}

/// One delivered transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub state: SyncState,
    pub status: String,
}

/// Receiving end of a status subscription.
pub struct StatusSubscription {
    rx: mpsc::UnboundedReceiver<StatusEvent>,
}

impl StatusSubscription {
    /// Waits for the next transition. `None` once the coordinator is gone.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        self.rx.try_recv().ok()
    }

    /// Takes every transition already delivered.
    pub fn drain(&mut self) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

struct HubInner {
    state: SyncState,
    generation: u64,
    subscribers: Vec<mpsc::UnboundedSender<StatusEvent>>,
}

pub(crate) struct StatusHub {
    inner: Mutex<HubInner>,
}

impl StatusHub {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(HubInner {
                state: SyncState::Disconnected,
                generation: 0,
                subscribers: Vec::new(),
            }),
        }
    }

    pub(crate) fn snapshot(&self) -> SyncState {
        self.inner.lock().state.clone()
    }

    pub(crate) fn subscribe(&self) -> StatusSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().subscribers.push(tx);
        StatusSubscription { rx }
    }

    /// Starts a new generation; events from older ones are ignored from now on.
    pub(crate) fn advance_generation(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.generation
    }

    /// Publishes on behalf of session `generation`.
    ///
    /// Returns `true` when the event was delivered.
    pub(crate) fn publish(&self, generation: u64, state: SyncState) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.state == state {
            return false;
        }
        deliver(&mut inner, state);
        true
    }

    /// Publishes on behalf of the coordinator itself, bypassing the
    /// generation check.
    pub(crate) fn publish_current(&self, state: SyncState) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == state {
            return false;
        }
        deliver(&mut inner, state);
        true
    }
}

fn deliver(inner: &mut HubInner, state: SyncState) {
    let event = StatusEvent {
        status: state.status_text(),
        state: state.clone(),
    };
    inner.state = state;
    // Dropped subscriptions are pruned on the next send.
    inner
        .subscribers
        .retain(|subscriber| subscriber.send(event.clone()).is_ok());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_matches_labels() {
        assert_eq!(SyncState::Disconnected.status_text(), "Not Connected");
        assert_eq!(SyncState::Connecting.status_text(), "Connecting...");
        assert_eq!(SyncState::Idle.status_text(), "Connected (Idle)");
        assert_eq!(SyncState::Busy.status_text(), "Syncing...");
        assert_eq!(SyncState::Offline.status_text(), "Offline");
        assert_eq!(
            SyncState::Error("auth rejected".to_string()).status_text(),
            "Error: auth rejected"
        );
        assert_eq!(SyncState::Stopped.status_text(), "Stopped");
    }

    #[test]
    fn hub_suppresses_duplicates_and_stale_generations() {
        let hub = StatusHub::new();
        let mut sub = hub.subscribe();

        let first = hub.advance_generation();
        assert!(hub.publish(first, SyncState::Connecting));
        assert!(!hub.publish(first, SyncState::Connecting));

        let second = hub.advance_generation();
        assert!(!hub.publish(first, SyncState::Idle));
        assert!(hub.publish(second, SyncState::Idle));
        assert!(hub.publish_current(SyncState::Stopped));

        let states: Vec<_> = sub.drain().into_iter().map(|event| event.state).collect();
        assert_eq!(
            states,
            vec![SyncState::Connecting, SyncState::Idle, SyncState::Stopped]
        );
        assert_eq!(hub.snapshot(), SyncState::Stopped);
    }

    #[test]
    fn dropped_subscription_does_not_block_others() {
        let hub = StatusHub::new();
        let dropped = hub.subscribe();
        let mut kept = hub.subscribe();
        drop(dropped);

        hub.publish_current(SyncState::Connecting);
        assert_eq!(kept.drain().len(), 1);
        assert_eq!(hub.inner.lock().subscribers.len(), 1);
    }
}
