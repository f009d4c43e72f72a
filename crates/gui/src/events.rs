//! Fan-out of client events to connected observers
//!
//! Observers are notified synchronously in registration order. The observer
//! list is copied before dispatch, so handlers may subscribe or unsubscribe
//! (themselves included) without deadlocking; changes apply from the next
//! publish on. Events are not stored: an observer only sees what is published
//! while it is registered.

use parking_lot::Mutex;
use refshot_common::ImageRef;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::report::FormattedResult;

/// Events pushed to observers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientEvent {
    /// A test started running
    BeginState(FormattedResult),

    /// A test settled (passed, failed, errored or was skipped)
    TestResult(FormattedResult),

    /// A failed attempt that will be retried
    Retry(FormattedResult),

    /// One reference image was replaced
    #[serde(rename_all = "camelCase")]
    UpdateReference { ref_img: ImageRef, state: String },

    /// The engine finished a run
    End,

    /// Named event relayed on behalf of a client
    Custom {
        name: String,
        data: serde_json::Value,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &str {
        match self {
            ClientEvent::BeginState(_) => "BEGIN_STATE",
            ClientEvent::TestResult(_) => "TEST_RESULT",
            ClientEvent::Retry(_) => "RETRY",
            ClientEvent::UpdateReference { .. } => "UPDATE_REFERENCE",
            ClientEvent::End => "END",
            ClientEvent::Custom { name, .. } => name,
        }
    }
}

/// Receiver of client events
pub trait Observer: Send + Sync {
    fn notify(&self, event: &ClientEvent);

    /// Closed observers are dropped after the next publish
    fn is_closed(&self) -> bool {
        false
    }
}

impl<F> Observer for F
where
    F: Fn(&ClientEvent) + Send + Sync,
{
    fn notify(&self, event: &ClientEvent) {
        self(event)
    }
}

/// A connected client fed through an unbounded channel
#[derive(Debug, Clone)]
pub struct Connection {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl Connection {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Observer for Connection {
    fn notify(&self, event: &ClientEvent) {
        // A send error means the client went away; is_closed reports it
        let _ = self.tx.send(event.clone());
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    observers: Vec<(SubscriptionId, Arc<dyn Observer>)>,
}

/// Multi-subscriber event emitter; clones share the same observer set
#[derive(Clone, Default)]
pub struct EventSource {
    registry: Arc<Mutex<Registry>>,
}

impl EventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: impl Observer + 'static) -> SubscriptionId {
        self.subscribe_arc(Arc::new(observer))
    }

    pub fn subscribe_arc(&self, observer: Arc<dyn Observer>) -> SubscriptionId {
        let mut registry = self.registry.lock();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.observers.push((id, observer));
        id
    }

    /// Returns false when the id was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.observers.len();
        registry.observers.retain(|(sid, _)| *sid != id);
        registry.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.registry.lock().observers.len()
    }

    /// Deliver `event` once to every observer registered right now
    pub fn publish(&self, event: ClientEvent) {
        let snapshot: Vec<(SubscriptionId, Arc<dyn Observer>)> =
            self.registry.lock().observers.clone();

        debug!("Publishing {} to {} observer(s)", event.name(), snapshot.len());

        let mut closed = Vec::new();
        for (id, observer) in &snapshot {
            observer.notify(&event);
            if observer.is_closed() {
                closed.push(*id);
            }
        }

        if !closed.is_empty() {
            self.registry
                .lock()
                .observers
                .retain(|(id, _)| !closed.contains(id));
        }
    }
}

impl std::fmt::Debug for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("observers", &self.observer_count())
            .finish()
    }
}
