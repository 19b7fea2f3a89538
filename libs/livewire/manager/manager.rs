use crate::core::events::panic_message;
use crate::core::{
    spawn_delayed, spawn_ticker, Callback, ChangeEvent, ConnectionHealth, ConnectionMetrics,
    ConnectionState, ErrorCallback, EventEmitter, ListenerHandle, ManagerConfig, ManagerEvent,
    ManagerEventKind, SubscriptionConfig, SubscriptionInfo, TickFlow, Ticker,
};
use crate::traits::{
    ChannelRequest, ChannelStatus, LiveWireError, RawChange, RealtimeTransport,
    ReconnectionStrategy, Result, TransportEvents, TransportListener,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Type-erased normalize-and-invoke closure for one subscription
type Dispatch = Arc<dyn Fn(RawChange) -> Result<()> + Send + Sync>;

struct Registration {
    seq: u64,
    info: SubscriptionInfo,
    dispatch: Dispatch,
    on_error: Option<ErrorCallback>,
}

impl Registration {
    fn channel_request(&self) -> ChannelRequest {
        ChannelRequest {
            channel_id: self.info.id.clone(),
            topic: self.info.topic.clone(),
            event: self.info.event_filter,
            filter: self.info.server_filter.clone(),
        }
    }
}

#[derive(Default)]
struct ManagerState {
    state: ConnectionState,
    connected_at: Option<DateTime<Utc>>,
    last_heartbeat: Option<DateTime<Utc>>,
    latency_ms: Option<f64>,
    reconnect_attempts: usize,
    reconnect_pending: bool,
    exhausted: bool,
    connect_requested: bool,
    destroyed: bool,
    next_seq: u64,
    subscriptions: HashMap<String, Registration>,
    channels: HashSet<String>,
    metrics: ConnectionMetrics,
}

impl ManagerState {
    fn transition(&mut self, to: ConnectionState) -> Option<ManagerEvent> {
        if self.state == to {
            return None;
        }
        let from = self.state;
        self.state = to;
        Some(ManagerEvent::StateChange { from, to })
    }
}

#[derive(Default)]
struct Timers {
    heartbeat: Option<Ticker>,
    latency: Option<Ticker>,
    reconnect: Option<JoinHandle<()>>,
}

struct Shared {
    config: ManagerConfig,
    transport: Arc<dyn RealtimeTransport>,
    strategy: Box<dyn ReconnectionStrategy>,
    state: Mutex<ManagerState>,
    timers: Mutex<Timers>,
    emitter: EventEmitter<ManagerEvent>,
    self_ref: Weak<Shared>,
}

/// Owns the single logical realtime connection and multiplexes
/// subscriptions over it
///
/// Cloning is cheap and yields another handle to the same manager. One
/// instance per process is the intended use; construct it at the
/// composition root and pass it down explicitly.
///
/// # Example
/// ```ignore
/// let transport = Arc::new(MockTransport::new());
/// let manager = ConnectionManager::new(ManagerConfig::default(), transport);
///
/// let handle = manager.subscribe(
///     SubscriptionConfig::<Order>::new("orders-feed", "orders", |event| {
///         println!("{:?}", event.change);
///         Ok(())
///     }),
/// )?;
///
/// // later
/// handle.unsubscribe();
/// manager.destroy();
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

/// Non-owning manager handle, used by listeners that must not keep the
/// manager alive
#[derive(Clone)]
pub struct WeakConnectionManager {
    shared: Weak<Shared>,
}

impl WeakConnectionManager {
    pub fn upgrade(&self) -> Option<ConnectionManager> {
        self.shared.upgrade().map(|shared| ConnectionManager { shared })
    }
}

/// Returned by [`ConnectionManager::subscribe`]
///
/// Dropping the handle does not unsubscribe; see `bindings::TopicSubscription`
/// for the scoped variant.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: String,
    manager: Weak<Shared>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Remove the subscription. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.manager.upgrade() {
            Some(shared) => shared.unsubscribe(&self.id, None),
            None => false,
        }
    }
}

impl ConnectionManager {
    /// Create a manager using the exponential backoff described by `config`
    pub fn new(config: ManagerConfig, transport: Arc<dyn RealtimeTransport>) -> Self {
        let strategy = config.backoff();
        Self::with_strategy(config, transport, strategy)
    }

    /// Create a manager with a custom reconnection strategy
    pub fn with_strategy(
        config: ManagerConfig,
        transport: Arc<dyn RealtimeTransport>,
        strategy: impl ReconnectionStrategy + 'static,
    ) -> Self {
        let shared = Arc::new_cyclic(|self_ref| Shared {
            config,
            transport,
            strategy: Box::new(strategy),
            state: Mutex::new(ManagerState::default()),
            timers: Mutex::new(Timers::default()),
            emitter: EventEmitter::new(),
            self_ref: self_ref.clone(),
        });
        Self { shared }
    }

    pub fn downgrade(&self) -> WeakConnectionManager {
        WeakConnectionManager {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Explicitly start connecting. No-op while connected or connecting.
    pub fn connect(&self) -> Result<()> {
        self.shared.connect()
    }

    /// Manual reset: clear the attempt counter and connect again, even after
    /// the reconnection budget was exhausted
    ///
    /// This is the only place the attempt counter drops to zero without a
    /// successful open. A pending reconnect timer is cancelled, and if this
    /// attempt fails the backoff schedule starts again from its first delay.
    pub fn reconnect(&self) -> Result<()> {
        self.shared.reconnect()
    }

    /// Register a subscription and open its channel
    ///
    /// The first subscription also starts the connection.
    pub fn subscribe<T>(&self, config: SubscriptionConfig<T>) -> Result<SubscriptionHandle>
    where
        T: DeserializeOwned + 'static,
    {
        self.shared.subscribe(config)
    }

    /// Remove a subscription. Unknown ids are a no-op and return false.
    pub fn unsubscribe(&self, id: &str, reason: Option<&str>) -> bool {
        self.shared.unsubscribe(id, reason)
    }

    /// Pause or resume a subscription without unregistering it
    ///
    /// Returns false (and logs) when `id` is unknown.
    pub fn toggle_subscription(&self, id: &str, enabled: bool) -> bool {
        self.shared.toggle_subscription(id, enabled)
    }

    pub fn health(&self) -> ConnectionHealth {
        let st = self.shared.state.lock();
        ConnectionHealth {
            state: st.state,
            connected_at: st.connected_at,
            last_heartbeat: st.last_heartbeat,
            reconnect_attempts: st.reconnect_attempts,
            latency_ms: st.latency_ms,
            subscription_count: st.subscriptions.len(),
        }
    }

    /// Snapshot of registered subscriptions, in registration order
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let st = self.shared.state.lock();
        let mut regs: Vec<&Registration> = st.subscriptions.values().collect();
        regs.sort_by_key(|r| r.seq);
        regs.into_iter().map(|r| r.info.clone()).collect()
    }

    /// Whether a live channel currently backs this subscription
    pub fn has_channel(&self, id: &str) -> bool {
        self.shared.state.lock().channels.contains(id)
    }

    pub fn metrics(&self) -> ConnectionMetrics {
        self.shared.state.lock().metrics
    }

    /// True once the reconnection budget is spent; only `reconnect()` recovers
    pub fn is_exhausted(&self) -> bool {
        self.shared.state.lock().exhausted
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.state.lock().destroyed
    }

    /// Listen for one kind of lifecycle event
    pub fn on<F>(&self, kind: ManagerEventKind, listener: F) -> ListenerHandle<ManagerEvent>
    where
        F: Fn(&ManagerEvent) + Send + Sync + 'static,
    {
        self.shared.emitter.on(kind, listener)
    }

    /// Listen for every lifecycle event
    pub fn on_any<F>(&self, listener: F) -> ListenerHandle<ManagerEvent>
    where
        F: Fn(&ManagerEvent) + Send + Sync + 'static,
    {
        self.shared.emitter.on_any(listener)
    }

    /// Tear down every channel, drop all registrations and listeners, close
    /// the transport. Safe to call repeatedly.
    ///
    /// Listeners see a final `StateChange` to `Disconnected` before they are
    /// removed.
    pub fn destroy(&self) {
        self.shared.destroy();
    }

    /// Publish a callback failure that happened after `on_change` returned,
    /// such as a deferred batch delivery
    ///
    /// The subscription's `on_error` is expected to have run already.
    pub(crate) fn report_deferred_error(&self, id: &str, error: LiveWireError) {
        self.shared.report_deferred_error(id, error);
    }
}

impl Shared {
    fn events(&self) -> TransportEvents {
        let listener: Weak<dyn TransportListener> = self.self_ref.clone();
        TransportEvents::new(listener)
    }

    fn emit_all(&self, events: impl IntoIterator<Item = ManagerEvent>) {
        for event in events {
            self.emitter.emit(&event);
        }
    }

    fn connect(&self) -> Result<()> {
        let transition = {
            let mut st = self.state.lock();
            if st.destroyed {
                return Err(LiveWireError::Destroyed);
            }
            if st.state.is_connected() || st.state.is_connecting() || st.reconnect_pending {
                debug!("Connect requested while {}, ignoring", st.state);
                return Ok(());
            }
            st.connect_requested = true;
            st.transition(ConnectionState::Connecting)
        };

        info!("Connecting realtime transport");
        self.emit_all(transition);
        self.transport.connect(self.events());
        Ok(())
    }

    fn reconnect(&self) -> Result<()> {
        let transition = {
            let mut st = self.state.lock();
            if st.destroyed {
                return Err(LiveWireError::Destroyed);
            }
            st.reconnect_attempts = 0;
            st.exhausted = false;
            st.reconnect_pending = false;
            st.connect_requested = true;
            st.connected_at = None;
            st.transition(ConnectionState::Connecting)
        };

        {
            let mut timers = self.timers.lock();
            if let Some(pending) = timers.reconnect.take() {
                pending.abort();
            }
            timers.heartbeat = None;
            timers.latency = None;
        }

        info!("Manual reconnect requested");
        self.emit_all(transition);
        self.transport.connect(self.events());
        Ok(())
    }

    fn subscribe<T>(&self, config: SubscriptionConfig<T>) -> Result<SubscriptionHandle>
    where
        T: DeserializeOwned + 'static,
    {
        config.validate()?;
        let info = config.info();
        let SubscriptionConfig {
            id,
            topic,
            callback,
            on_error,
            ..
        } = config;
        let dispatch = build_dispatch(id.clone(), topic.clone(), callback);

        let (request, should_connect) = {
            let mut st = self.state.lock();
            if st.destroyed {
                return Err(LiveWireError::Destroyed);
            }
            if st.subscriptions.contains_key(&id) {
                return Err(LiveWireError::DuplicateSubscription(id));
            }
            st.next_seq += 1;
            let registration = Registration {
                seq: st.next_seq,
                info,
                dispatch,
                on_error,
            };
            let request = registration
                .info
                .enabled
                .then(|| registration.channel_request());
            st.subscriptions.insert(id.clone(), registration);
            (request, !st.connect_requested)
        };

        if let Some(request) = request {
            self.open_channel(request);
        }

        debug!("Added subscription '{}' on topic '{}'", id, topic);
        self.emitter.emit(&ManagerEvent::SubscriptionAdded {
            id: id.clone(),
            topic,
        });

        if should_connect {
            self.connect()?;
        }

        Ok(SubscriptionHandle {
            id,
            manager: self.self_ref.clone(),
        })
    }

    fn unsubscribe(&self, id: &str, reason: Option<&str>) -> bool {
        let (registration, had_channel) = {
            let mut st = self.state.lock();
            if st.destroyed {
                return false;
            }
            let registration = st.subscriptions.remove(id);
            let had_channel = st.channels.remove(id);
            (registration, had_channel)
        };

        let Some(registration) = registration else {
            debug!("Unsubscribe for unknown subscription '{}' ignored", id);
            return false;
        };

        if had_channel {
            self.transport.close_channel(id);
        }

        debug!("Removed subscription '{}' ({:?})", id, reason);
        self.emitter.emit(&ManagerEvent::SubscriptionRemoved {
            id: id.to_string(),
            reason: reason.map(str::to_string),
        });
        drop(registration);
        true
    }

    fn toggle_subscription(&self, id: &str, enabled: bool) -> bool {
        let outcome = {
            let mut st = self.state.lock();
            if st.destroyed {
                return false;
            }
            let had_channel = st.channels.remove(id);
            match st.subscriptions.get_mut(id) {
                Some(registration) => {
                    registration.info.enabled = enabled;
                    Some((had_channel, enabled.then(|| registration.channel_request())))
                }
                None => None,
            }
        };

        let Some((had_channel, request)) = outcome else {
            warn!("Cannot toggle unknown subscription '{}'", id);
            return false;
        };

        if had_channel {
            self.transport.close_channel(id);
        }
        if let Some(request) = request {
            self.open_channel(request);
        }

        debug!(
            "Subscription '{}' {}",
            id,
            if enabled { "enabled" } else { "disabled" }
        );
        true
    }

    /// Open a channel and record it if the subscription is still wanted
    fn open_channel(&self, request: ChannelRequest) {
        let id = request.channel_id.clone();
        match self.transport.open_channel(request) {
            Ok(()) => {
                let keep = {
                    let mut st = self.state.lock();
                    let wanted = !st.destroyed
                        && st.subscriptions.get(&id).map_or(false, |r| r.info.enabled);
                    if wanted {
                        st.channels.insert(id.clone());
                    }
                    wanted
                };
                if !keep {
                    // Removed or paused while the channel was being opened
                    self.transport.close_channel(&id);
                }
            }
            Err(e) => {
                error!("Failed to open channel for subscription '{}': {}", id, e);
                let error = LiveWireError::Channel {
                    subscription_id: id.clone(),
                    message: e.to_string(),
                };
                self.report_subscription_error(&id, error);
            }
        }
    }

    fn report_subscription_error(&self, id: &str, error: LiveWireError) {
        let on_error = self
            .state
            .lock()
            .subscriptions
            .get(id)
            .and_then(|r| r.on_error.clone());

        warn!("Subscription '{}' error: {}", id, error);
        if let Some(on_error) = on_error {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| on_error(&error))) {
                error!(
                    "on_error handler for '{}' panicked: {}",
                    id,
                    panic_message(panic.as_ref())
                );
            }
        }

        self.emitter.emit(&ManagerEvent::Error {
            subscription_id: Some(id.to_string()),
            error,
        });
    }

    fn report_deferred_error(&self, id: &str, error: LiveWireError) {
        {
            let mut st = self.state.lock();
            if st.destroyed {
                return;
            }
            st.metrics.callback_errors += 1;
        }

        warn!("Subscription '{}' error: {}", id, error);
        self.emitter.emit(&ManagerEvent::Error {
            subscription_id: Some(id.to_string()),
            error,
        });
    }

    fn schedule_reconnect(&self, reason: &str) {
        let outcome = {
            let mut st = self.state.lock();
            if st.destroyed || st.reconnect_pending || st.exhausted {
                return;
            }
            let attempts = st.reconnect_attempts;
            match self.strategy.next_delay(attempts) {
                Some(delay) => {
                    st.reconnect_attempts += 1;
                    st.reconnect_pending = true;
                    st.metrics.reconnect_count += 1;
                    let transition = st.transition(ConnectionState::Reconnecting);
                    Ok((st.reconnect_attempts, delay, transition))
                }
                None => {
                    st.exhausted = true;
                    Err(attempts)
                }
            }
        };

        match outcome {
            Ok((attempt, delay, transition)) => {
                info!("Reconnecting in {:?} (attempt {})", delay, attempt);
                self.emit_all(transition);
                self.emitter
                    .emit(&ManagerEvent::ReconnectAttempt { attempt, delay });

                let weak = self.self_ref.clone();
                let handle = spawn_delayed("reconnect", delay, move || async move {
                    if let Some(shared) = weak.upgrade() {
                        shared.fire_reconnect();
                    }
                });

                match handle {
                    Some(handle) => self.timers.lock().reconnect = Some(handle),
                    None => self.state.lock().reconnect_pending = false,
                }
            }
            Err(attempts) => {
                error!(
                    "Reconnection strategy exhausted after {} attempts, manual reconnect required",
                    attempts
                );
                self.emitter.emit(&ManagerEvent::Error {
                    subscription_id: None,
                    error: LiveWireError::ReconnectionFailed {
                        attempts,
                        reason: reason.to_string(),
                    },
                });
            }
        }
    }

    fn fire_reconnect(&self) {
        self.timers.lock().reconnect.take();
        {
            let mut st = self.state.lock();
            if st.destroyed || !st.reconnect_pending {
                return;
            }
            st.reconnect_pending = false;
        }
        debug!("Reconnect timer fired, starting connection attempt");
        self.transport.connect(self.events());
    }

    fn start_probes(&self) {
        let heartbeat = {
            let weak = self.self_ref.clone();
            spawn_ticker("heartbeat", self.config.heartbeat_interval(), move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(shared) => {
                            shared.heartbeat().await;
                            TickFlow::Continue
                        }
                        None => TickFlow::Stop,
                    }
                }
            })
        };

        let latency = {
            let weak = self.self_ref.clone();
            spawn_ticker("latency", self.config.latency_sample_interval(), move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(shared) => {
                            shared.sample_latency().await;
                            TickFlow::Continue
                        }
                        None => TickFlow::Stop,
                    }
                }
            })
        };

        let mut timers = self.timers.lock();
        timers.heartbeat = heartbeat;
        timers.latency = latency;
    }

    fn stop_probes(&self) {
        let mut timers = self.timers.lock();
        timers.heartbeat = None;
        timers.latency = None;
    }

    fn is_connected(&self) -> bool {
        let st = self.state.lock();
        !st.destroyed && st.state.is_connected()
    }

    async fn heartbeat(&self) {
        if !self.is_connected() {
            return;
        }
        match self.transport.probe().await {
            Ok(()) => {
                self.state.lock().last_heartbeat = Some(Utc::now());
                debug!("Heartbeat acknowledged");
            }
            Err(e) => warn!("Heartbeat probe failed: {}", e),
        }
    }

    async fn sample_latency(&self) {
        if !self.is_connected() {
            return;
        }
        let started = tokio::time::Instant::now();
        match self.transport.probe().await {
            Ok(()) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.state.lock().latency_ms = Some(latency_ms);
                debug!("Round-trip latency: {:.1}ms", latency_ms);
            }
            Err(e) => warn!("Latency probe failed: {}", e),
        }
    }

    fn destroy(&self) {
        let (transition, channels, registrations) = {
            let mut st = self.state.lock();
            if st.destroyed {
                return;
            }
            st.destroyed = true;
            st.connected_at = None;
            st.reconnect_pending = false;
            let transition = st.transition(ConnectionState::Disconnected);
            let channels: Vec<String> = st.channels.drain().collect();
            let registrations: Vec<Registration> =
                st.subscriptions.drain().map(|(_, r)| r).collect();
            (transition, channels, registrations)
        };

        {
            let mut timers = self.timers.lock();
            if let Some(pending) = timers.reconnect.take() {
                pending.abort();
            }
            timers.heartbeat = None;
            timers.latency = None;
        }

        for channel in &channels {
            self.transport.close_channel(channel);
        }
        self.transport.disconnect();
        self.emit_all(transition);
        self.emitter.clear();
        drop(registrations);

        info!(
            "Connection manager destroyed ({} channels closed)",
            channels.len()
        );
    }
}

impl TransportListener for Shared {
    fn on_open(&self) {
        let (transition, stale, requests) = {
            let mut st = self.state.lock();
            if st.destroyed {
                return;
            }
            let now = Utc::now();
            st.connected_at = Some(now);
            st.last_heartbeat = Some(now);
            st.reconnect_attempts = 0;
            st.reconnect_pending = false;
            st.exhausted = false;
            st.connect_requested = true;
            let transition = st.transition(ConnectionState::Connected);

            // Channels never survive a reconnect
            let stale: Vec<String> = st.channels.drain().collect();
            let mut regs: Vec<&Registration> = st
                .subscriptions
                .values()
                .filter(|r| r.info.enabled)
                .collect();
            regs.sort_by_key(|r| r.seq);
            let requests: Vec<ChannelRequest> =
                regs.into_iter().map(Registration::channel_request).collect();
            (transition, stale, requests)
        };

        if let Some(pending) = self.timers.lock().reconnect.take() {
            pending.abort();
        }

        for channel in &stale {
            self.transport.close_channel(channel);
        }
        let resubscribed = requests.len();
        for request in requests {
            self.open_channel(request);
        }
        self.start_probes();

        info!(
            "Realtime connection established ({} subscriptions restored)",
            resubscribed
        );
        self.emit_all(transition);
    }

    fn on_close(&self, reason: String) {
        let transition = {
            let mut st = self.state.lock();
            if st.destroyed {
                return;
            }
            st.connected_at = None;
            // Already waiting on a retry for this failure
            if st.reconnect_pending {
                None
            } else {
                st.transition(ConnectionState::Disconnected)
            }
        };

        self.stop_probes();
        warn!("Realtime connection closed: {}", reason);
        self.emit_all(transition);
        self.schedule_reconnect(&reason);
    }

    fn on_error(&self, message: String) {
        let transition = {
            let mut st = self.state.lock();
            if st.destroyed {
                return;
            }
            st.connected_at = None;
            if st.reconnect_pending {
                None
            } else {
                st.transition(ConnectionState::Error)
            }
        };

        self.stop_probes();
        error!("Realtime transport error: {}", message);
        self.emit_all(transition);
        self.emitter.emit(&ManagerEvent::Error {
            subscription_id: None,
            error: LiveWireError::Transport(message.clone()),
        });
        self.schedule_reconnect(&message);
    }

    fn on_change(&self, channel_id: &str, change: RawChange) {
        let dispatch = {
            let st = self.state.lock();
            if st.destroyed || !st.channels.contains(channel_id) {
                None
            } else {
                st.subscriptions
                    .get(channel_id)
                    .filter(|r| r.info.enabled && r.info.event_filter.matches(change.kind))
                    .map(|r| Arc::clone(&r.dispatch))
            }
        };

        let Some(dispatch) = dispatch else {
            debug!("Dropping {:?} change for inactive channel '{}'", change.kind, channel_id);
            return;
        };

        match dispatch(change) {
            Ok(()) => {
                self.state.lock().metrics.messages_dispatched += 1;
            }
            Err(error) => {
                self.state.lock().metrics.callback_errors += 1;
                self.report_subscription_error(channel_id, error);
            }
        }
    }

    fn on_channel_status(&self, channel_id: &str, status: ChannelStatus) {
        if !status.is_failure() {
            debug!("Channel '{}' status: {}", channel_id, status);
            return;
        }

        let known = {
            let mut st = self.state.lock();
            st.channels.remove(channel_id);
            !st.destroyed && st.subscriptions.contains_key(channel_id)
        };
        if known {
            let error = LiveWireError::Channel {
                subscription_id: channel_id.to_string(),
                message: status.to_string(),
            };
            self.report_subscription_error(channel_id, error);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if !self.state.get_mut().destroyed {
            if let Some(pending) = self.timers.get_mut().reconnect.take() {
                pending.abort();
            }
            self.transport.disconnect();
        }
    }
}

fn build_dispatch<T>(id: String, topic: String, callback: Callback<T>) -> Dispatch
where
    T: DeserializeOwned + 'static,
{
    Arc::new(move |raw: RawChange| {
        let event = ChangeEvent::<T>::from_raw(&topic, raw).map_err(|message| {
            LiveWireError::Payload {
                subscription_id: id.clone(),
                message,
            }
        })?;

        match catch_unwind(AssertUnwindSafe(|| callback(event))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(LiveWireError::Callback {
                subscription_id: id.clone(),
                message: e.to_string(),
            }),
            Err(panic) => Err(LiveWireError::Callback {
                subscription_id: id.clone(),
                message: format!("callback panicked: {}", panic_message(panic.as_ref())),
            }),
        }
    })
}
