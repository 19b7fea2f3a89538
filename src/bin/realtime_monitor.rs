//! Realtime monitor
//!
//! Connects the subscription stack to the configured realtime endpoint (or an
//! in-memory transport when no URL is set), subscribes to every configured
//! topic through the performance optimizer, and logs connection health and
//! the performance report until Ctrl+C.

use anyhow::{Context, Result};
use realtime_hub::bin_common::cli::config_path_from_args;
use realtime_hub::bin_common::{
    init_tracing, parse_args, BinaryRunner, ConfigType, RunConfig, ShutdownSignal,
};
use realtime_hub::livewire::{
    ChangeEvent, ConnectionManager, ListenerHandle, ManagerEvent, ManagerEventKind, MockTransport,
    PerformanceOptimizer, RealtimeConfig, RealtimeTransport, SubscriptionConfig, TopicConfig,
    WsTransport,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct Monitor {
    run_config: RunConfig,
    manager: ConnectionManager,
    optimizer: PerformanceOptimizer,
    shutdown: ShutdownSignal,
    listeners: Vec<ListenerHandle<ManagerEvent>>,
}

impl Monitor {
    fn new(config: &RealtimeConfig) -> Result<Self> {
        let transport: Arc<dyn RealtimeTransport> = match &config.transport.url {
            Some(url) => {
                info!("Using WebSocket transport: {}", url);
                Arc::new(WsTransport::from_config(&config.transport)?)
            }
            None => {
                warn!("No transport.url configured, using in-memory transport");
                Arc::new(MockTransport::new().with_auto_open())
            }
        };

        let manager = ConnectionManager::new(config.manager.clone(), transport);
        let optimizer = PerformanceOptimizer::new(config.optimizer.clone());
        optimizer.observe(&manager);

        let listeners = vec![
            manager.on(ManagerEventKind::StateChange, |event| {
                if let ManagerEvent::StateChange { from, to } = event {
                    info!("Connection {} -> {}", from, to);
                }
            }),
            manager.on(ManagerEventKind::Error, |event| {
                if let ManagerEvent::Error {
                    subscription_id,
                    error,
                } = event
                {
                    match subscription_id {
                        Some(id) => warn!("Subscription '{}' error: {}", id, error),
                        None => warn!("Connection error: {}", error),
                    }
                }
            }),
            manager.on(ManagerEventKind::ReconnectAttempt, |event| {
                if let ManagerEvent::ReconnectAttempt { attempt, delay } = event {
                    info!("Reconnect attempt {} in {:?}", attempt, delay);
                }
            }),
        ];

        for topic in &config.topics {
            let subscription = optimizer.optimize_subscription(topic_subscription(topic));
            manager
                .subscribe(subscription)
                .with_context(|| format!("Failed to subscribe to '{}'", topic.topic))?;
        }

        Ok(Self {
            run_config: RunConfig::new("Realtime Monitor"),
            manager,
            optimizer,
            shutdown: ShutdownSignal::new(),
            listeners,
        })
    }

    fn log_status(&self) {
        let health = self.manager.health();
        info!(
            "Health: {} | subscriptions={} | latency={} | reconnect attempts={}",
            health.state,
            health.subscription_count,
            health
                .latency_ms
                .map(|ms| format!("{:.1}ms", ms))
                .unwrap_or_else(|| "n/a".to_string()),
            health.reconnect_attempts
        );
        for line in self.optimizer.generate_report().to_string().lines() {
            info!("{}", line);
        }
    }
}

impl BinaryRunner for Monitor {
    async fn run(&mut self) -> Result<()> {
        self.shutdown.spawn_signal_handler();

        while self.shutdown.is_running() {
            self.shutdown
                .interruptible_sleep(self.run_config.report_interval())
                .await;
            if self.shutdown.is_running() {
                self.log_status();
            }
        }

        for listener in self.listeners.drain(..) {
            listener.remove();
        }
        self.optimizer.destroy();
        self.manager.destroy();
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn stats(&self) -> Option<String> {
        let metrics = self.manager.metrics();
        Some(format!(
            "Dispatched {} messages, {} callback errors, {} reconnect attempts",
            metrics.messages_dispatched, metrics.callback_errors, metrics.reconnect_count
        ))
    }
}

fn topic_subscription(topic: &TopicConfig) -> SubscriptionConfig<Value> {
    let id = format!("monitor-{}", topic.topic);
    let mut subscription =
        SubscriptionConfig::new(id, topic.topic.clone(), |event: ChangeEvent<Value>| {
            debug!(
                "{} {:?} (committed {:?})",
                event.topic,
                event.change.kind(),
                event.commit_timestamp
            );
            Ok(())
        })
        .event_filter(topic.event);
    if let Some(filter) = &topic.filter {
        subscription = subscription.server_filter(filter.clone());
    }
    subscription
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Load config first (before logging is initialized)
    let args = parse_args();
    let config_path = config_path_from_args(&args, ConfigType::Realtime);
    let config = RealtimeConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    init_tracing(&config.log_level);
    info!(
        "Loaded {} with {} topics",
        config_path.display(),
        config.topics.len()
    );

    let mut monitor = Monitor::new(&config)?;
    monitor.execute().await
}
