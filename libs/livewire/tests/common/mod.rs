//! Common test utilities for LiveWire integration tests
//!
//! Provides a scriptable realtime WebSocket server speaking the transport's
//! JSON envelope, a manager event recorder and polling helpers.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use livewire::core::{ConnectionState, ManagerEvent};
use livewire::manager::ConnectionManager;
use livewire::transports::{InboundFrame, OutboundFrame};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

enum ServerCommand {
    Push(InboundFrame),
    Close,
}

struct ServerState {
    received: Mutex<Vec<OutboundFrame>>,
    handshake_headers: Mutex<Vec<HashMap<String, String>>>,
    clients: Mutex<Vec<mpsc::UnboundedSender<ServerCommand>>>,
    connections: AtomicUsize,
    ack_heartbeats: AtomicBool,
}

/// A mock realtime server for testing
///
/// Acknowledges `subscribe` with `subscribed` and `heartbeat` with
/// `heartbeat_ack`; changes are pushed with [`MockWsServer::push`].
pub struct MockWsServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    state: Arc<ServerState>,
}

impl MockWsServer {
    /// Create and start a new mock server
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let state = Arc::new(ServerState {
            received: Mutex::new(Vec::new()),
            handshake_headers: Mutex::new(Vec::new()),
            clients: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
            ack_heartbeats: AtomicBool::new(true),
        });

        let shutdown_clone = shutdown.clone();
        let state_clone = state.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let shutdown = shutdown_clone.clone();
                                let state = state_clone.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, state, shutdown).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown,
            state,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        state: Arc<ServerState>,
        shutdown: Arc<Notify>,
    ) {
        let headers_state = state.clone();
        let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let headers = request
                .headers()
                .iter()
                .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
                .collect();
            headers_state.handshake_headers.lock().push(headers);
            Ok(response)
        };

        let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        state.connections.fetch_add(1, Ordering::SeqCst);
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        state.clients.lock().push(command_tx);

        let (mut write, mut read) = ws_stream.split();
        loop {
            tokio::select! {
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => continue,
                    };
                    let frame: OutboundFrame = match serde_json::from_str(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            eprintln!("Bad client frame {}: {}", text, e);
                            continue;
                        }
                    };
                    state.received.lock().push(frame.clone());

                    let reply = match frame {
                        OutboundFrame::Subscribe { channel, .. } => Some(InboundFrame::Subscribed { channel }),
                        OutboundFrame::Heartbeat { reference } if state.ack_heartbeats.load(Ordering::SeqCst) => {
                            Some(InboundFrame::HeartbeatAck { reference })
                        }
                        _ => None,
                    };
                    if let Some(reply) = reply {
                        let text = serde_json::to_string(&reply).unwrap();
                        if write.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                }
                command = command_rx.recv() => {
                    match command {
                        Some(ServerCommand::Push(frame)) => {
                            let text = serde_json::to_string(&frame).unwrap();
                            if write.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Some(ServerCommand::Close) | None => {
                            let _ = write.close().await;
                            break;
                        }
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Number of successful handshakes so far
    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Frames received from clients, in arrival order
    pub fn received(&self) -> Vec<OutboundFrame> {
        self.state.received.lock().clone()
    }

    pub fn handshake_headers(&self) -> Vec<HashMap<String, String>> {
        self.state.handshake_headers.lock().clone()
    }

    pub fn set_ack_heartbeats(&self, ack: bool) {
        self.state.ack_heartbeats.store(ack, Ordering::SeqCst);
    }

    /// Send a frame to every connected client
    pub fn push(&self, frame: InboundFrame) {
        self.state
            .clients
            .lock()
            .retain(|client| client.send(ServerCommand::Push(frame.clone())).is_ok());
    }

    /// Close every client connection, keeping the listener up
    pub fn drop_clients(&self) {
        for client in self.state.clients.lock().drain(..) {
            let _ = client.send(ServerCommand::Close);
        }
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Let spawned tasks run on a current-thread runtime
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Records every manager event
pub fn record_events(manager: &ConnectionManager) -> Arc<Mutex<Vec<ManagerEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let _ = manager.on_any(move |event| sink.lock().push(event.clone()));
    events
}

pub fn state_changes(events: &[ManagerEvent]) -> Vec<(ConnectionState, ConnectionState)> {
    events
        .iter()
        .filter_map(|e| match e {
            ManagerEvent::StateChange { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

pub fn reconnect_delays(events: &[ManagerEvent]) -> Vec<Duration> {
    events
        .iter()
        .filter_map(|e| match e {
            ManagerEvent::ReconnectAttempt { delay, .. } => Some(*delay),
            _ => None,
        })
        .collect()
}
