//! Typed event emitter
//!
//! Listeners are snapshotted before dispatch, so a listener may register,
//! remove, or even tear down its emitter's owner from inside a callback.
//! A panicking listener is logged and skipped; the remaining listeners still
//! run.

use crate::core::connection_state::ConnectionState;
use crate::traits::LiveWireError;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::error;

/// An event with a discriminant listeners can filter on
pub trait Event: Send + Sync + 'static {
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registration<E: Event> {
    id: u64,
    kind: Option<E::Kind>,
    listener: Listener<E>,
}

struct EmitterInner<E: Event> {
    next_id: Mutex<u64>,
    listeners: Mutex<Vec<Registration<E>>>,
}

/// Multi-listener pub/sub for a single event type
pub struct EventEmitter<E: Event> {
    inner: Arc<EmitterInner<E>>,
}

impl<E: Event> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                next_id: Mutex::new(0),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a listener for one event kind
    pub fn on<F>(&self, kind: E::Kind, listener: F) -> ListenerHandle<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(listener))
    }

    /// Register a listener for every event kind
    pub fn on_any<F>(&self, listener: F) -> ListenerHandle<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(listener))
    }

    fn register(&self, kind: Option<E::Kind>, listener: Listener<E>) -> ListenerHandle<E> {
        let id = {
            let mut next = self.inner.next_id.lock();
            *next += 1;
            *next
        };
        self.inner
            .listeners
            .lock()
            .push(Registration { id, kind, listener });
        ListenerHandle {
            id,
            emitter: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to every matching listener
    pub fn emit(&self, event: &E) {
        let kind = event.kind();
        let targets: Vec<Listener<E>> = self
            .inner
            .listeners
            .lock()
            .iter()
            .filter(|r| r.kind.map_or(true, |k| k == kind))
            .map(|r| Arc::clone(&r.listener))
            .collect();

        for listener in targets {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(event))) {
                error!(
                    "Listener for {:?} panicked: {}",
                    kind,
                    panic_message(panic.as_ref())
                );
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Drop every listener
    pub fn clear(&self) {
        self.inner.listeners.lock().clear();
    }
}

impl<E: Event> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Returned by `on`/`on_any`; call [`ListenerHandle::remove`] to unregister
///
/// Dropping the handle keeps the listener registered.
pub struct ListenerHandle<E: Event> {
    id: u64,
    emitter: Weak<EmitterInner<E>>,
}

impl<E: Event> ListenerHandle<E> {
    /// Unregister the listener. Returns false if it was already gone.
    pub fn remove(self) -> bool {
        let Some(emitter) = self.emitter.upgrade() else {
            return false;
        };
        let mut listeners = emitter.listeners.lock();
        let before = listeners.len();
        listeners.retain(|r| r.id != self.id);
        listeners.len() != before
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Lifecycle notifications published by the connection manager
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    StateChange {
        from: ConnectionState,
        to: ConnectionState,
    },
    Error {
        subscription_id: Option<String>,
        error: LiveWireError,
    },
    SubscriptionAdded {
        id: String,
        topic: String,
    },
    SubscriptionRemoved {
        id: String,
        reason: Option<String>,
    },
    ReconnectAttempt {
        attempt: usize,
        delay: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerEventKind {
    StateChange,
    Error,
    SubscriptionAdded,
    SubscriptionRemoved,
    ReconnectAttempt,
}

impl Event for ManagerEvent {
    type Kind = ManagerEventKind;

    fn kind(&self) -> ManagerEventKind {
        match self {
            ManagerEvent::StateChange { .. } => ManagerEventKind::StateChange,
            ManagerEvent::Error { .. } => ManagerEventKind::Error,
            ManagerEvent::SubscriptionAdded { .. } => ManagerEventKind::SubscriptionAdded,
            ManagerEvent::SubscriptionRemoved { .. } => ManagerEventKind::SubscriptionRemoved,
            ManagerEvent::ReconnectAttempt { .. } => ManagerEventKind::ReconnectAttempt,
        }
    }
}
