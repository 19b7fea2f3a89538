use super::metrics::{
    estimate_memory_mb, PerformanceMetrics, PerformanceReport, HISTORY_AFTER_CLEANUP,
};
use super::priority::{narrowed_filter, priority_for, BYPASS_ABOVE};
use super::queue::{Deliver, Delivery, MessageQueue};
use super::throttle::{self, ThrottleMap};
use crate::core::events::panic_message;
use crate::core::{
    spawn_ticker, Callback, CallbackResult, ChangeEvent, ConnectionState, ErrorCallback,
    ListenerHandle, ManagerEvent, ManagerEventKind, OptimizerConfig, SubscriptionConfig, TickFlow,
    Ticker,
};
use crate::manager::{ConnectionManager, WeakConnectionManager};
use crate::traits::LiveWireError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// The original callbacks of one optimized subscription
///
/// Queued messages only hold a weak reference, so once the subscription is
/// dropped by the manager its pending messages turn into no-ops.
struct DeliverySlot<T> {
    id: String,
    callback: Callback<T>,
    on_error: Option<ErrorCallback>,
}

impl<T> DeliverySlot<T> {
    fn deliver(&self, event: ChangeEvent<T>) -> Delivery {
        let error = match catch_unwind(AssertUnwindSafe(|| (self.callback)(event))) {
            Ok(Ok(())) => return Delivery::Delivered,
            Ok(Err(e)) => LiveWireError::Callback {
                subscription_id: self.id.clone(),
                message: e.to_string(),
            },
            Err(panic) => LiveWireError::Callback {
                subscription_id: self.id.clone(),
                message: format!("callback panicked: {}", panic_message(panic.as_ref())),
            },
        };

        if let Some(on_error) = &self.on_error {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| on_error(&error))) {
                error!(
                    "on_error handler for '{}' panicked: {}",
                    self.id,
                    panic_message(panic.as_ref())
                );
            }
        }
        Delivery::Failed(error)
    }
}

#[derive(Debug, Default)]
struct Counters {
    throttled: u64,
    batched: u64,
    dropped: u64,
    messages_since_sample: u64,
    latency_total_ms: f64,
    latency_samples: u64,
}

struct OptimizerState {
    throttle: ThrottleMap,
    queue: MessageQueue,
    slots: Vec<Weak<dyn Any + Send + Sync>>,
    counters: Counters,
    messages_per_second: f64,
    last_sample: Instant,
    history: VecDeque<PerformanceMetrics>,
    connected_at: Option<DateTime<Utc>>,
    destroyed: bool,
}

impl OptimizerState {
    fn new(config: &OptimizerConfig) -> Self {
        Self {
            throttle: ThrottleMap::new(config.throttle_window()),
            queue: MessageQueue::new(config.max_queued_messages),
            slots: Vec::new(),
            counters: Counters::default(),
            messages_per_second: 0.0,
            last_sample: Instant::now(),
            history: VecDeque::new(),
            connected_at: None,
            destroyed: false,
        }
    }

    fn live_subscriptions(&mut self) -> usize {
        self.slots.retain(|slot| slot.strong_count() > 0);
        self.slots.len()
    }

    fn memory_usage_mb(&mut self) -> f64 {
        let subscriptions = self.live_subscriptions();
        estimate_memory_mb(self.queue.len(), subscriptions, self.history.len())
    }

    fn snapshot(&mut self) -> PerformanceMetrics {
        let average_latency_ms = if self.counters.latency_samples > 0 {
            self.counters.latency_total_ms / self.counters.latency_samples as f64
        } else {
            0.0
        };
        let connection_uptime = self
            .connected_at
            .and_then(|at| (Utc::now() - at).to_std().ok())
            .unwrap_or(Duration::ZERO);

        PerformanceMetrics {
            sampled_at: Utc::now(),
            subscriptions: self.live_subscriptions(),
            messages_per_second: self.messages_per_second,
            average_latency_ms,
            memory_usage_mb: self.memory_usage_mb(),
            queued_messages: self.queue.len(),
            throttled_messages: self.counters.throttled,
            batched_messages: self.counters.batched,
            dropped_messages: self.counters.dropped,
            connection_uptime,
        }
    }
}

struct Shared {
    config: OptimizerConfig,
    state: Mutex<OptimizerState>,
    tickers: Mutex<Vec<Ticker>>,
    observer: Mutex<Option<ListenerHandle<ManagerEvent>>>,
    manager: Mutex<Option<WeakConnectionManager>>,
}

/// Load shaping between the transport and subscription callbacks
///
/// Wraps subscription callbacks so each message passes through a throttle,
/// then is either delivered immediately (priority topics) or queued for the
/// next batch flush.
///
/// Delivery is best-effort: identical payloads within `throttle_ms` are
/// dropped, queue overflow evicts the oldest lowest-priority message, and a
/// memory-pressure cleanup discards stale queued messages without reporting
/// an error.
#[derive(Clone)]
pub struct PerformanceOptimizer {
    shared: Arc<Shared>,
}

impl PerformanceOptimizer {
    /// Create an optimizer and start its flush/metrics/cleanup timers
    ///
    /// Outside a Tokio runtime no timers are started; use the `flush_batch`,
    /// `sample_metrics`, `run_memory_check` and `cleanup_throttle` methods
    /// directly.
    pub fn new(config: OptimizerConfig) -> Self {
        let optimizer = Self::manual(config);
        optimizer.start();
        optimizer
    }

    /// Create an optimizer without background timers
    pub fn manual(config: OptimizerConfig) -> Self {
        let state = OptimizerState::new(&config);
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(state),
                tickers: Mutex::new(Vec::new()),
                observer: Mutex::new(None),
                manager: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.shared.config
    }

    /// Start the periodic timers. No-op if they are already running.
    pub fn start(&self) {
        let mut tickers = self.shared.tickers.lock();
        if !tickers.is_empty() || self.shared.state.lock().destroyed {
            return;
        }

        let config = &self.shared.config;
        let timers: [(&'static str, Duration, fn(&PerformanceOptimizer)); 3] = [
            ("batch-flush", config.batch_timeout(), |o| {
                o.flush_batch();
            }),
            ("metrics", config.metrics_interval(), |o| {
                o.sample_metrics();
                o.run_memory_check();
            }),
            ("throttle-cleanup", config.throttle_cleanup_interval(), |o| {
                o.cleanup_throttle();
            }),
        ];

        for (name, interval, body) in timers {
            let weak = Arc::downgrade(&self.shared);
            let ticker = spawn_ticker(name, interval, move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(shared) => {
                            body(&PerformanceOptimizer { shared });
                            TickFlow::Continue
                        }
                        None => TickFlow::Stop,
                    }
                }
            });
            tickers.extend(ticker);
        }
    }

    /// Track connection uptime from a manager's state changes and report
    /// batched callback failures as manager `Error` events
    pub fn observe(&self, manager: &ConnectionManager) {
        let weak = Arc::downgrade(&self.shared);
        let handle = manager.on(ManagerEventKind::StateChange, move |event| {
            let ManagerEvent::StateChange { to, .. } = event else {
                return;
            };
            if let Some(shared) = weak.upgrade() {
                let mut st = shared.state.lock();
                match to {
                    ConnectionState::Connected => st.connected_at = Some(Utc::now()),
                    _ => st.connected_at = None,
                }
            }
        });

        self.shared.state.lock().connected_at = manager.health().connected_at;
        *self.shared.manager.lock() = Some(manager.downgrade());
        if let Some(previous) = self.shared.observer.lock().replace(handle) {
            previous.remove();
        }
    }

    /// Narrow the server filter for known high-volume topics and route the
    /// callback through the throttle/priority pipeline
    ///
    /// Touches no connection state; the returned config is handed to
    /// [`ConnectionManager::subscribe`] by the caller.
    pub fn optimize_subscription<T>(&self, mut config: SubscriptionConfig<T>) -> SubscriptionConfig<T>
    where
        T: Serialize + Send + 'static,
    {
        let settings = &self.shared.config;
        if settings.enable_filtering && config.server_filter.is_none() {
            if let Some(filter) = narrowed_filter(settings, &config.topic, Utc::now()) {
                debug!("Narrowed '{}' with server filter {}", config.topic, filter);
                config.server_filter = Some(filter);
            }
        }

        let priority = priority_for(settings, &config.topic);
        let slot = Arc::new(DeliverySlot {
            id: config.id.clone(),
            callback: Arc::clone(&config.callback),
            on_error: config.on_error.clone(),
        });
        let marker: Arc<dyn Any + Send + Sync> = slot.clone();
        self.shared
            .state
            .lock()
            .slots
            .push(Arc::downgrade(&marker));

        let optimizer = Arc::downgrade(&self.shared);
        config.callback = Arc::new(move |event: ChangeEvent<T>| match optimizer.upgrade() {
            Some(shared) => shared.route(&slot, priority, event),
            None => (slot.callback)(event),
        });
        config
    }

    /// Deliver up to `batch_size` queued messages; returns how many callbacks ran
    pub fn flush_batch(&self) -> usize {
        self.shared.flush_batch()
    }

    /// Push a metrics sample into the history
    pub fn sample_metrics(&self) -> PerformanceMetrics {
        let mut st = self.shared.state.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(st.last_sample).as_secs_f64();
        if elapsed > 0.0 {
            st.messages_per_second = st.counters.messages_since_sample as f64 / elapsed;
        }
        st.counters.messages_since_sample = 0;
        st.last_sample = now;

        let sample = st.snapshot();
        st.history.push_back(sample.clone());
        while st.history.len() > self.shared.config.history_capacity {
            st.history.pop_front();
        }
        sample
    }

    /// Lossy cleanup when the memory estimate exceeds the limit
    ///
    /// Returns true if a cleanup ran.
    pub fn run_memory_check(&self) -> bool {
        let config = &self.shared.config;
        let mut st = self.shared.state.lock();
        let usage = st.memory_usage_mb();
        if usage <= config.memory_limit_mb {
            return false;
        }

        let max_age = config.batch_timeout() * 2;
        let dropped = Instant::now()
            .checked_sub(max_age)
            .map_or(0, |cutoff| st.queue.drop_older_than(cutoff));
        st.counters.dropped += dropped as u64;

        let excess = st.history.len().saturating_sub(HISTORY_AFTER_CLEANUP);
        st.history.drain(..excess);

        warn!(
            "Memory estimate {:.2}MB over {:.2}MB limit: dropped {} stale messages, trimmed {} samples",
            usage, config.memory_limit_mb, dropped, excess
        );
        true
    }

    /// Forget expired throttle entries
    pub fn cleanup_throttle(&self) -> usize {
        let removed = self.shared.state.lock().throttle.cleanup(Instant::now());
        if removed > 0 {
            debug!("Removed {} expired throttle entries", removed);
        }
        removed
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.shared.state.lock().snapshot()
    }

    pub fn metrics_history(&self) -> Vec<PerformanceMetrics> {
        self.shared.state.lock().history.iter().cloned().collect()
    }

    pub fn generate_report(&self) -> PerformanceReport {
        PerformanceReport::new(self.metrics(), &self.shared.config)
    }

    /// Zero the counters and clear the history. Queue and throttle state are kept.
    pub fn reset_metrics(&self) {
        let mut st = self.shared.state.lock();
        st.counters = Counters::default();
        st.messages_per_second = 0.0;
        st.history.clear();
        st.last_sample = Instant::now();
        debug!("Optimizer metrics reset");
    }

    /// Stop all timers and discard queued messages. Safe to call repeatedly.
    ///
    /// Callbacks wrapped by a destroyed optimizer deliver directly.
    pub fn destroy(&self) {
        let discarded = {
            let mut st = self.shared.state.lock();
            if st.destroyed {
                return;
            }
            st.destroyed = true;
            let discarded = st.queue.len();
            st.queue.clear();
            st.throttle.clear();
            st.slots.clear();
            discarded
        };

        self.shared.tickers.lock().clear();
        if let Some(observer) = self.shared.observer.lock().take() {
            observer.remove();
        }
        self.shared.manager.lock().take();
        info!("Performance optimizer destroyed ({} queued messages discarded)", discarded);
    }
}

impl Shared {
    fn route<T>(&self, slot: &Arc<DeliverySlot<T>>, priority: u8, event: ChangeEvent<T>) -> CallbackResult
    where
        T: Serialize + Send + 'static,
    {
        let bypass = priority > BYPASS_ABOVE || !self.config.enable_filtering;
        let now = Instant::now();
        let signature = throttle::signature(&event.change);

        {
            let mut st = self.state.lock();
            if st.destroyed {
                drop(st);
                return (slot.callback)(event);
            }

            if let Some(signature) = signature {
                if !st.throttle.admit(&slot.id, signature, now) {
                    st.counters.throttled += 1;
                    debug!("Throttled duplicate message for '{}'", slot.id);
                    return Ok(());
                }
            }
            st.counters.messages_since_sample += 1;

            if !bypass {
                let weak = Arc::downgrade(slot);
                let deliver: Deliver = Box::new(move || match weak.upgrade() {
                    Some(slot) => slot.deliver(event),
                    None => Delivery::Orphaned,
                });
                if let Some(evicted) = st.queue.push(slot.id.clone(), priority, now, deliver) {
                    st.counters.dropped += 1;
                    warn!(
                        "Message queue full, dropped message for '{}' (priority {})",
                        evicted.subscription_id, evicted.priority
                    );
                }
                return Ok(());
            }
        }

        (slot.callback)(event)
    }

    fn flush_batch(&self) -> usize {
        let batch = {
            let mut st = self.state.lock();
            if st.destroyed {
                return 0;
            }
            st.queue.take_batch(self.config.batch_size)
        };
        if batch.is_empty() {
            return 0;
        }

        let mut invoked = 0u64;
        let mut latency_total_ms = 0.0;
        for message in batch {
            let waited = message.enqueued_at.elapsed();
            let subscription_id = message.subscription_id.clone();
            match message.deliver() {
                Delivery::Delivered => {}
                Delivery::Failed(e) => {
                    let manager = self.manager.lock().as_ref().and_then(|m| m.upgrade());
                    match manager {
                        Some(manager) => manager.report_deferred_error(&subscription_id, e),
                        None => {
                            warn!("Batched delivery for '{}' failed: {}", subscription_id, e)
                        }
                    }
                }
                Delivery::Orphaned => {
                    debug!("Skipped queued message for removed subscription '{}'", subscription_id);
                    continue;
                }
            }
            invoked += 1;
            latency_total_ms += waited.as_secs_f64() * 1000.0;
        }

        let mut st = self.state.lock();
        st.counters.batched += invoked;
        st.counters.latency_total_ms += latency_total_ms;
        st.counters.latency_samples += invoked;
        invoked as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Row {
        id: u32,
    }

    fn event(topic: &str, id: u32) -> ChangeEvent<Row> {
        ChangeEvent::from_raw(topic, crate::traits::RawChange::insert(json!({ "id": id }))).unwrap()
    }

    fn counting(id: &str, topic: &str, count: &Arc<AtomicUsize>) -> SubscriptionConfig<Row> {
        let count = Arc::clone(count);
        SubscriptionConfig::new(id, topic, move |_| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_filter_narrowing_keeps_caller_filter() {
        let optimizer = PerformanceOptimizer::manual(OptimizerConfig::default());
        let count = Arc::new(AtomicUsize::new(0));

        let narrowed = optimizer.optimize_subscription(counting("a", "whatsapp_conversations", &count));
        assert_eq!(narrowed.server_filter.as_deref(), Some("status=eq.active"));

        let explicit = optimizer.optimize_subscription(
            counting("b", "whatsapp_conversations", &count).server_filter("id=eq.7"),
        );
        assert_eq!(explicit.server_filter.as_deref(), Some("id=eq.7"));
    }

    #[test]
    fn test_throttle_drops_identical_payload() {
        let optimizer = PerformanceOptimizer::manual(OptimizerConfig::default());
        let count = Arc::new(AtomicUsize::new(0));
        let config = optimizer.optimize_subscription(counting("a", "system_alerts", &count));

        (config.callback)(event("system_alerts", 1)).unwrap();
        (config.callback)(event("system_alerts", 1)).unwrap();
        (config.callback)(event("system_alerts", 2)).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(optimizer.metrics().throttled_messages, 1);
    }

    #[test]
    fn test_orphaned_messages_are_skipped() {
        let optimizer = PerformanceOptimizer::manual(OptimizerConfig::default());
        let count = Arc::new(AtomicUsize::new(0));
        let config = optimizer.optimize_subscription(counting("a", "leads", &count));

        (config.callback)(event("leads", 1)).unwrap();
        assert_eq!(optimizer.metrics().queued_messages, 1);
        assert_eq!(optimizer.metrics().subscriptions, 1);

        drop(config);
        assert_eq!(optimizer.flush_batch(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(optimizer.metrics().subscriptions, 0);
    }

    #[test]
    fn test_batched_failure_goes_to_on_error() {
        let optimizer = PerformanceOptimizer::manual(OptimizerConfig::default());
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&errors);
        let config = optimizer.optimize_subscription(
            SubscriptionConfig::<Row>::new("a", "leads", |_| Err("boom".into()))
                .on_error(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
        );

        assert!((config.callback)(event("leads", 1)).is_ok());
        assert_eq!(optimizer.flush_batch(), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_filtering_delivers_synchronously() {
        let optimizer = PerformanceOptimizer::manual(OptimizerConfig {
            enable_filtering: false,
            ..Default::default()
        });
        let count = Arc::new(AtomicUsize::new(0));
        let config = optimizer.optimize_subscription(counting("a", "audit_log", &count));
        assert!(config.server_filter.is_none());

        (config.callback)(event("audit_log", 1)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(optimizer.metrics().queued_messages, 0);
    }

    #[test]
    fn test_reset_and_destroy() {
        let optimizer = PerformanceOptimizer::manual(OptimizerConfig::default());
        let count = Arc::new(AtomicUsize::new(0));
        let config = optimizer.optimize_subscription(counting("a", "leads", &count));
        (config.callback)(event("leads", 1)).unwrap();
        optimizer.flush_batch();
        optimizer.sample_metrics();

        optimizer.reset_metrics();
        assert_eq!(optimizer.metrics().batched_messages, 0);
        assert!(optimizer.metrics_history().is_empty());

        optimizer.destroy();
        optimizer.destroy();
        // Pass-through after destroy
        (config.callback)(event("leads", 2)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
