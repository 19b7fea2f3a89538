use crate::core::SubscriptionConfig;
use crate::manager::{ConnectionManager, WeakConnectionManager};
use crate::optimizer::PerformanceOptimizer;
use crate::traits::{LiveWireError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Scoped subscription: subscribes on mount, unsubscribes on drop
///
/// When an optimizer is given, every (re)subscription goes through
/// [`PerformanceOptimizer::optimize_subscription`].
pub struct TopicSubscription<T> {
    manager: WeakConnectionManager,
    optimizer: Option<PerformanceOptimizer>,
    config: SubscriptionConfig<T>,
    active: Option<String>,
}

impl<T> TopicSubscription<T>
where
    T: DeserializeOwned + Serialize + Send + 'static,
{
    pub fn mount(
        manager: &ConnectionManager,
        optimizer: Option<&PerformanceOptimizer>,
        config: SubscriptionConfig<T>,
    ) -> Result<Self> {
        let mut subscription = Self {
            manager: manager.downgrade(),
            optimizer: optimizer.cloned(),
            config,
            active: None,
        };
        subscription.attach()?;
        Ok(subscription)
    }

    /// Replace the config and resubscribe
    pub fn update(&mut self, config: SubscriptionConfig<T>) -> Result<()> {
        self.detach("config_changed");
        self.config = config;
        self.attach()
    }

    fn attach(&mut self) -> Result<()> {
        let manager = self.manager.upgrade().ok_or(LiveWireError::Destroyed)?;
        let config = match &self.optimizer {
            Some(optimizer) => optimizer.optimize_subscription(self.config.clone()),
            None => self.config.clone(),
        };
        let handle = manager.subscribe(config)?;
        self.active = Some(handle.id().to_string());
        Ok(())
    }
}

impl<T> TopicSubscription<T> {
    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    /// True while the manager still holds this subscription
    pub fn is_active(&self) -> bool {
        match (&self.active, self.manager.upgrade()) {
            (Some(id), Some(manager)) => manager.subscriptions().iter().any(|s| &s.id == id),
            _ => false,
        }
    }

    /// Pause or resume without unsubscribing
    pub fn set_enabled(&self, enabled: bool) -> bool {
        match (&self.active, self.manager.upgrade()) {
            (Some(id), Some(manager)) => manager.toggle_subscription(id, enabled),
            _ => false,
        }
    }

    fn detach(&mut self, reason: &str) {
        if let Some(id) = self.active.take() {
            if let Some(manager) = self.manager.upgrade() {
                manager.unsubscribe(&id, Some(reason));
            }
        }
    }
}

impl<T> Drop for TopicSubscription<T> {
    fn drop(&mut self) {
        self.detach("unmounted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ManagerConfig, ManagerEvent, ManagerEventKind};
    use crate::transports::MockTransport;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, Serialize, Deserialize)]
    struct Row {
        id: u32,
    }

    #[tokio::test]
    async fn test_mount_update_unmount() {
        let transport = Arc::new(MockTransport::new());
        let manager = ConnectionManager::new(ManagerConfig::default(), transport);
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reasons);
        let _listener = manager.on(ManagerEventKind::SubscriptionRemoved, move |event| {
            if let ManagerEvent::SubscriptionRemoved { reason, .. } = event {
                sink.lock().push(reason.clone().unwrap_or_default());
            }
        });

        let mut subscription =
            TopicSubscription::mount(&manager, None, SubscriptionConfig::<Row>::new("rows", "rows", |_| Ok(())))
                .unwrap();
        assert!(subscription.is_active());

        subscription
            .update(SubscriptionConfig::new("rows", "rows", |_| Ok(())).server_filter("id=eq.1"))
            .unwrap();
        assert_eq!(
            manager.subscriptions()[0].server_filter.as_deref(),
            Some("id=eq.1")
        );

        drop(subscription);
        assert!(manager.subscriptions().is_empty());
        assert_eq!(*reasons.lock(), vec!["config_changed", "unmounted"]);
    }
}
