use crate::traits::{
    ChannelRequest, ChannelStatus, LiveWireError, RawChange, RealtimeTransport, Result,
    TransportEvents,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::debug;

#[derive(Default)]
struct MockState {
    events: Option<TransportEvents>,
    auto_open: bool,
    fail_probes: bool,
    fail_channel_open: bool,
    probe_delay: Duration,
    connect_calls: usize,
    disconnect_calls: usize,
    probe_calls: usize,
    open_channels: Vec<String>,
    opened: Vec<ChannelRequest>,
    closed: Vec<String>,
}

/// In-memory transport
///
/// Records every call made by the manager and lets the caller inject
/// lifecycle and data events. Used by tests and by non-interactive contexts
/// where no realtime backend is available.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `open` as soon as `connect` is called
    pub fn with_auto_open(self) -> Self {
        self.state.lock().auto_open = true;
        self
    }

    /// Make `probe` wait before answering, for latency measurements
    pub fn with_probe_delay(self, delay: Duration) -> Self {
        self.state.lock().probe_delay = delay;
        self
    }

    pub fn set_fail_probes(&self, fail: bool) {
        self.state.lock().fail_probes = fail;
    }

    pub fn set_fail_channel_open(&self, fail: bool) {
        self.state.lock().fail_channel_open = fail;
    }

    pub fn connect_calls(&self) -> usize {
        self.state.lock().connect_calls
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state.lock().disconnect_calls
    }

    pub fn probe_calls(&self) -> usize {
        self.state.lock().probe_calls
    }

    /// Channels currently open, in opening order
    pub fn open_channels(&self) -> Vec<String> {
        self.state.lock().open_channels.clone()
    }

    pub fn is_channel_open(&self, channel_id: &str) -> bool {
        self.state.lock().open_channels.iter().any(|c| c == channel_id)
    }

    /// Every channel request ever received
    pub fn opened_requests(&self) -> Vec<ChannelRequest> {
        self.state.lock().opened.clone()
    }

    /// Every channel id ever closed
    pub fn closed_channels(&self) -> Vec<String> {
        self.state.lock().closed.clone()
    }

    fn events(&self) -> Option<TransportEvents> {
        let events = self.state.lock().events.clone();
        if events.is_none() {
            debug!("MockTransport has no listener, event dropped");
        }
        events
    }

    pub fn emit_open(&self) {
        if let Some(events) = self.events() {
            events.open();
        }
    }

    pub fn emit_close(&self, reason: &str) {
        if let Some(events) = self.events() {
            events.close(reason);
        }
    }

    pub fn emit_error(&self, message: &str) {
        if let Some(events) = self.events() {
            events.error(message);
        }
    }

    pub fn emit_change(&self, channel_id: &str, change: RawChange) {
        if let Some(events) = self.events() {
            events.change(channel_id, change);
        }
    }

    pub fn emit_channel_status(&self, channel_id: &str, status: ChannelStatus) {
        if let Some(events) = self.events() {
            events.channel_status(channel_id, status);
        }
    }
}

#[async_trait]
impl RealtimeTransport for MockTransport {
    fn connect(&self, events: TransportEvents) {
        let auto_open = {
            let mut st = self.state.lock();
            st.connect_calls += 1;
            st.events = Some(events.clone());
            st.auto_open
        };
        if auto_open {
            events.open();
        }
    }

    fn open_channel(&self, request: ChannelRequest) -> Result<()> {
        let mut st = self.state.lock();
        if st.fail_channel_open {
            return Err(LiveWireError::Transport(format!(
                "channel '{}' rejected",
                request.channel_id
            )));
        }
        if !st.open_channels.contains(&request.channel_id) {
            st.open_channels.push(request.channel_id.clone());
        }
        st.opened.push(request);
        Ok(())
    }

    fn close_channel(&self, channel_id: &str) {
        let mut st = self.state.lock();
        st.open_channels.retain(|c| c != channel_id);
        st.closed.push(channel_id.to_string());
    }

    async fn probe(&self) -> Result<()> {
        let (fail, delay) = {
            let mut st = self.state.lock();
            st.probe_calls += 1;
            (st.fail_probes, st.probe_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(LiveWireError::Timeout("mock probe failure".to_string()));
        }
        Ok(())
    }

    fn disconnect(&self) {
        let mut st = self.state.lock();
        st.disconnect_calls += 1;
        st.open_channels.clear();
        st.events = None;
    }
}
