/*
[INPUT]:  Wallet lifecycle events from adapters and engines
[OUTPUT]: Typed listener fan-out with exact unsubscribe handles
[POS]:    Event layer - publish/subscribe shared by all backends
[UPDATE]: When adding event kinds or changing listener semantics
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, error};

use crate::types::{EventSource, WalletAddress};

/// Unified wallet lifecycle event emitted by every backend
#[derive(Debug, Clone)]
pub enum WalletEvent {
    ConnectStart {
        source: EventSource,
    },
    Connect {
        addresses: Vec<WalletAddress>,
        source: EventSource,
    },
    ConnectError {
        message: String,
        source: EventSource,
    },
    Disconnect {
        source: EventSource,
    },
}

impl WalletEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WalletEvent::ConnectStart { .. } => EventKind::ConnectStart,
            WalletEvent::Connect { .. } => EventKind::Connect,
            WalletEvent::ConnectError { .. } => EventKind::ConnectError,
            WalletEvent::Disconnect { .. } => EventKind::Disconnect,
        }
    }
}

/// Event name listeners register against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ConnectStart,
    Connect,
    ConnectError,
    Disconnect,
}

type Callback = Arc<dyn Fn(&WalletEvent) + Send + Sync>;

/// Handle returned from `on`; passing it to `off` removes exactly that
/// listener. Dropping the handle without calling `off` leaves the listener
/// installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

/// Thread-safe typed event bus keyed by event kind
#[derive(Clone)]
pub struct EventBus {
    listeners: Arc<RwLock<HashMap<EventKind, Vec<(u64, Callback)>>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a listener for one event kind
    pub fn on<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&WalletEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.listeners.write().unwrap();
        guard
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        debug!(?kind, id, "event listener added");
        Subscription { kind, id }
    }

    /// Remove the listener identified by the subscription handle
    pub fn off(&self, subscription: &Subscription) {
        let mut guard = self.listeners.write().unwrap();
        if let Some(entries) = guard.get_mut(&subscription.kind) {
            entries.retain(|(id, _)| *id != subscription.id);
            if entries.is_empty() {
                guard.remove(&subscription.kind);
            }
        }
    }

    /// Deliver an event to every listener of its kind.
    ///
    /// A panicking listener must not poison delivery for the others, so each
    /// callback runs behind `catch_unwind`.
    pub fn emit(&self, event: &WalletEvent) {
        let callbacks: Vec<Callback> = {
            let guard = self.listeners.read().unwrap();
            guard
                .get(&event.kind())
                .map(|entries| entries.iter().map(|(_, cb)| cb.clone()).collect())
                .unwrap_or_default()
        };

        debug!(kind = ?event.kind(), listeners = callbacks.len(), "emitting event");
        for callback in callbacks {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(event);
            }));
            if result.is_err() {
                error!(kind = ?event.kind(), "event listener panicked");
            }
        }
    }

    /// Number of listeners currently registered for a kind
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .read()
            .unwrap()
            .get(&kind)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
