use crate::core::{ConnectionHealth, ListenerHandle, ManagerEvent};
use crate::manager::{ConnectionManager, WeakConnectionManager};
use crate::traits::{LiveWireError, Result};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

/// Connection health published through a `tokio::sync::watch` channel
///
/// Refreshed on every manager event. Heartbeat and latency values change
/// without an event, so call [`HealthWatch::refresh`] when polling them.
///
/// The sender lives inside the manager listener, so receivers close once the
/// manager is destroyed.
pub struct HealthWatch {
    manager: WeakConnectionManager,
    tx: Weak<watch::Sender<ConnectionHealth>>,
    rx: watch::Receiver<ConnectionHealth>,
    listener: Option<ListenerHandle<ManagerEvent>>,
}

impl HealthWatch {
    pub fn new(manager: &ConnectionManager) -> Self {
        let (tx, rx) = watch::channel(manager.health());
        let tx = Arc::new(tx);

        let weak = manager.downgrade();
        let sender = Arc::clone(&tx);
        let tx = Arc::downgrade(&tx);
        let listener = manager.on_any(move |_| {
            if let Some(manager) = weak.upgrade() {
                sender.send_replace(manager.health());
            }
        });

        Self {
            manager: manager.downgrade(),
            tx,
            rx,
            listener: Some(listener),
        }
    }

    pub fn current(&self) -> ConnectionHealth {
        self.rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.rx.borrow().is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.rx.borrow().is_connecting()
    }

    pub fn has_error(&self) -> bool {
        self.rx.borrow().has_error()
    }

    /// Re-read health from the manager
    pub fn refresh(&self) -> ConnectionHealth {
        if let (Some(manager), Some(tx)) = (self.manager.upgrade(), self.tx.upgrade()) {
            tx.send_replace(manager.health());
        }
        self.current()
    }

    /// Wait for the next health update
    ///
    /// Fails with `Destroyed` once the manager is destroyed or dropped.
    pub async fn changed(&mut self) -> Result<ConnectionHealth> {
        if self.manager.upgrade().map_or(true, |m| m.is_destroyed()) {
            return Err(LiveWireError::Destroyed);
        }
        self.rx
            .changed()
            .await
            .map_err(|_| LiveWireError::Destroyed)?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Extra receiver for another task
    pub fn receiver(&self) -> watch::Receiver<ConnectionHealth> {
        self.rx.clone()
    }
}

impl Drop for HealthWatch {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.remove();
        }
    }
}
