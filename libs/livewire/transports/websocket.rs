//! WebSocket transport
//!
//! One `connect()` is one connection attempt. Retry policy lives in the
//! connection manager; this transport only reports `open`, `close` and
//! `error`.
//!
//! Wire format is JSON, one object per text frame, tagged by `type`:
//!
//! ```text
//! client -> server   {"type":"subscribe","channel":"a","topic":"orders","event":"*","filter":"id=eq.1"}
//!                    {"type":"unsubscribe","channel":"a"}
//!                    {"type":"heartbeat","ref":7}
//! server -> client   {"type":"change","channel":"a","event":"INSERT","new":{..},"old":null,"commit_timestamp":".."}
//!                    {"type":"heartbeat_ack","ref":7}
//!                    {"type":"subscribed","channel":"a"}
//!                    {"type":"channel_error","channel":"a","message":".."}
//!                    {"type":"channel_closed","channel":"a"}
//! ```

use super::states::{HasUrl, NoUrl, UrlState};
use crate::core::TransportConfig;
use crate::traits::{
    ApiKeyHeaders, ChangeKind, ChannelRequest, ChannelStatus, EventFilter, HeaderProvider,
    LiveWireError, RawChange, RealtimeTransport, Result, TransportEvents,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Frames sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Subscribe {
        channel: String,
        topic: String,
        event: EventFilter,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<String>,
    },
    Unsubscribe {
        channel: String,
    },
    Heartbeat {
        #[serde(rename = "ref")]
        reference: u64,
    },
}

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Change {
        channel: String,
        event: ChangeKind,
        #[serde(default)]
        old: Option<Value>,
        #[serde(default)]
        new: Option<Value>,
        #[serde(default)]
        commit_timestamp: Option<DateTime<Utc>>,
    },
    HeartbeatAck {
        #[serde(rename = "ref")]
        reference: u64,
    },
    Subscribed {
        channel: String,
    },
    ChannelError {
        channel: String,
        message: String,
    },
    ChannelClosed {
        channel: String,
    },
}

enum Command {
    Send(OutboundFrame),
    Close,
}

struct Link {
    generation: u64,
    commands: mpsc::UnboundedSender<Command>,
}

enum Outcome {
    Closed(String),
    Failed(String),
    Shutdown,
}

struct WsShared {
    url: String,
    headers: Option<Arc<dyn HeaderProvider>>,
    probe_timeout: Duration,
    generation: AtomicU64,
    next_ref: AtomicU64,
    link: Mutex<Option<Link>>,
    task: Mutex<Option<JoinHandle<()>>>,
    pending_probes: Mutex<HashMap<u64, oneshot::Sender<()>>>,
}

/// Builder for [`WsTransport`]; the URL is required
pub struct WsTransportBuilder<U: UrlState> {
    _state: PhantomData<U>,
    url: Option<String>,
    headers: Option<Arc<dyn HeaderProvider>>,
    probe_timeout: Duration,
}

impl WsTransportBuilder<NoUrl> {
    pub fn new() -> Self {
        Self {
            _state: PhantomData,
            url: None,
            headers: None,
            probe_timeout: Duration::from_secs(10),
        }
    }

    pub fn url(self, url: impl Into<String>) -> WsTransportBuilder<HasUrl> {
        WsTransportBuilder {
            _state: PhantomData,
            url: Some(url.into()),
            headers: self.headers,
            probe_timeout: self.probe_timeout,
        }
    }
}

impl Default for WsTransportBuilder<NoUrl> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U: UrlState> WsTransportBuilder<U> {
    /// Headers applied to every handshake, including reconnects
    pub fn headers(mut self, provider: impl HeaderProvider + 'static) -> Self {
        self.headers = Some(Arc::new(provider));
        self
    }

    /// How long `probe` waits for a heartbeat ack
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

impl WsTransportBuilder<HasUrl> {
    pub fn build(self) -> WsTransport {
        WsTransport {
            shared: Arc::new(WsShared {
                url: self.url.unwrap_or_default(),
                headers: self.headers,
                probe_timeout: self.probe_timeout,
                generation: AtomicU64::new(0),
                next_ref: AtomicU64::new(0),
                link: Mutex::new(None),
                task: Mutex::new(None),
                pending_probes: Mutex::new(HashMap::new()),
            }),
        }
    }
}

/// `tokio-tungstenite` implementation of [`RealtimeTransport`]
pub struct WsTransport {
    shared: Arc<WsShared>,
}

impl WsTransport {
    pub fn builder() -> WsTransportBuilder<NoUrl> {
        WsTransportBuilder::new()
    }

    /// Build from loaded configuration; the URL must be present
    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        let url = config.url.clone().ok_or_else(|| {
            LiveWireError::Configuration("transport.url is required for WsTransport".to_string())
        })?;

        let builder = WsTransport::builder()
            .url(url)
            .probe_timeout(config.probe_timeout());
        Ok(match &config.api_key {
            Some(key) => builder.headers(ApiKeyHeaders::new(key.clone())).build(),
            None => builder.build(),
        })
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// True while a connection is established
    pub fn is_connected(&self) -> bool {
        self.shared.link.lock().is_some()
    }
}

impl WsShared {
    /// Queue a frame on the live connection; false if there is none
    fn send(&self, frame: OutboundFrame) -> bool {
        match self.link.lock().as_ref() {
            Some(link) => link.commands.send(Command::Send(frame)).is_ok(),
            None => false,
        }
    }

    fn clear_link(&self, generation: u64) {
        let mut link = self.link.lock();
        if link.as_ref().map_or(false, |l| l.generation == generation) {
            *link = None;
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    async fn build_request(&self) -> std::result::Result<Request, String> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| format!("invalid url {}: {}", self.url, e))?;

        if let Some(provider) = &self.headers {
            for (key, value) in provider.get_headers().await {
                match (
                    key.parse::<http::header::HeaderName>(),
                    value.parse::<http::header::HeaderValue>(),
                ) {
                    (Ok(name), Ok(value)) => {
                        request.headers_mut().insert(name, value);
                    }
                    (Err(_), _) => warn!("Invalid header name: {}", key),
                    (_, Err(_)) => warn!("Invalid header value for key '{}'", key),
                }
            }
        }
        Ok(request)
    }

    fn handle_frame(&self, text: &str, events: &TransportEvents) {
        let frame = match serde_json::from_str::<InboundFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Ignoring unparseable frame: {}", e);
                return;
            }
        };

        match frame {
            InboundFrame::Change {
                channel,
                event,
                old,
                new,
                commit_timestamp,
            } => events.change(
                &channel,
                RawChange {
                    kind: event,
                    old,
                    new,
                    commit_timestamp,
                },
            ),
            InboundFrame::HeartbeatAck { reference } => {
                let waiter = self.pending_probes.lock().remove(&reference);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(());
                    }
                    None => debug!("Late heartbeat ack {}", reference),
                }
            }
            InboundFrame::Subscribed { channel } => {
                events.channel_status(&channel, ChannelStatus::Subscribed)
            }
            InboundFrame::ChannelError { channel, message } => {
                events.channel_status(&channel, ChannelStatus::ChannelError(message))
            }
            InboundFrame::ChannelClosed { channel } => {
                events.channel_status(&channel, ChannelStatus::Closed)
            }
        }
    }
}

/// One connection attempt and, if it succeeds, its read/write loop
async fn run_connection(shared: Arc<WsShared>, generation: u64, events: TransportEvents) {
    let request = match shared.build_request().await {
        Ok(request) => request,
        Err(e) => {
            error!("Failed to create request: {}", e);
            if shared.is_current(generation) {
                events.error(e);
            }
            return;
        }
    };

    let ws_stream = match connect_async(request).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            error!("Failed to connect to {}: {}", shared.url, e);
            if shared.is_current(generation) {
                events.error(format!("connect failed: {}", e));
            }
            return;
        }
    };

    if !shared.is_current(generation) {
        debug!("Connection attempt superseded, dropping socket");
        return;
    }

    info!("Connected to {}", shared.url);
    let (command_tx, mut command_rx) = mpsc::unbounded_channel();
    *shared.link.lock() = Some(Link {
        generation,
        commands: command_tx,
    });
    events.open();

    let (mut write, mut read) = ws_stream.split();
    let outcome = loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => shared.handle_frame(&text, &events),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by server".to_string());
                    break Outcome::Closed(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Outcome::Failed(format!("read error: {}", e)),
                None => break Outcome::Closed("stream ended".to_string()),
            },
            command = command_rx.recv() => match command {
                Some(Command::Send(frame)) => {
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode {:?}: {}", frame, e);
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(text)).await {
                        break Outcome::Failed(format!("write error: {}", e));
                    }
                }
                Some(Command::Close) | None => {
                    let _ = write.close().await;
                    break Outcome::Shutdown;
                }
            },
        }
    };

    shared.clear_link(generation);
    // Dropping the senders fails any in-flight probe
    shared.pending_probes.lock().clear();

    if !shared.is_current(generation) {
        return;
    }
    match outcome {
        Outcome::Closed(reason) => {
            warn!("Connection closed: {}", reason);
            events.close(reason);
        }
        Outcome::Failed(e) => {
            error!("Connection error: {}", e);
            events.error(e);
        }
        Outcome::Shutdown => debug!("Connection shut down"),
    }
}

#[async_trait]
impl RealtimeTransport for WsTransport {
    fn connect(&self, events: TransportEvents) {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(previous) = self.shared.task.lock().take() {
            previous.abort();
        }
        *self.shared.link.lock() = None;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            events.error("WebSocket transport requires a Tokio runtime");
            return;
        };

        debug!("Connecting to {} (generation {})", self.shared.url, generation);
        let shared = Arc::clone(&self.shared);
        let task = runtime.spawn(run_connection(shared, generation, events));
        *self.shared.task.lock() = Some(task);
    }

    fn open_channel(&self, request: ChannelRequest) -> Result<()> {
        let channel = request.channel_id.clone();
        let sent = self.shared.send(OutboundFrame::Subscribe {
            channel: request.channel_id,
            topic: request.topic,
            event: request.event,
            filter: request.filter,
        });
        if !sent {
            debug!("Not connected, channel '{}' will be opened on connect", channel);
        }
        Ok(())
    }

    fn close_channel(&self, channel_id: &str) {
        self.shared.send(OutboundFrame::Unsubscribe {
            channel: channel_id.to_string(),
        });
    }

    async fn probe(&self) -> Result<()> {
        let reference = self.shared.next_ref.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.shared.pending_probes.lock().insert(reference, tx);

        if !self.shared.send(OutboundFrame::Heartbeat { reference }) {
            self.shared.pending_probes.lock().remove(&reference);
            return Err(LiveWireError::NotConnected);
        }

        match tokio::time::timeout(self.shared.probe_timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(LiveWireError::ConnectionClosed(
                "connection closed before heartbeat ack".to_string(),
            )),
            Err(_) => {
                self.shared.pending_probes.lock().remove(&reference);
                Err(LiveWireError::Timeout(format!(
                    "heartbeat {} not acknowledged within {:?}",
                    reference, self.shared.probe_timeout
                )))
            }
        }
    }

    fn disconnect(&self) {
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        let link = self.shared.link.lock().take();
        let task = self.shared.task.lock().take();
        match (link, task) {
            (Some(link), _) => {
                // Graceful close; the task exits on its own
                let _ = link.commands.send(Command::Close);
            }
            (None, Some(task)) => task.abort(),
            (None, None) => {}
        }
        self.shared.pending_probes.lock().clear();
        info!("Disconnected from {}", self.shared.url);
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(task) = self.shared.task.lock().take() {
            task.abort();
        }
    }
}
