//! Integration tests for the WebSocket transport against a local server

mod common;

use common::{eventually, MockWsServer};
use livewire::core::{ConnectionState, ManagerConfig, SubscriptionConfig, TransportConfig};
use livewire::manager::ConnectionManager;
use livewire::traits::{ChangeKind, EventFilter, LiveWireError, RealtimeTransport};
use livewire::transports::{InboundFrame, OutboundFrame, WsTransport};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Lead {
    id: u32,
    name: String,
}

fn fast_reconnect() -> ManagerConfig {
    ManagerConfig {
        base_reconnect_delay_ms: 50,
        max_reconnect_delay_ms: 200,
        ..Default::default()
    }
}

fn subscribed_channels(server: &MockWsServer) -> Vec<String> {
    server
        .received()
        .into_iter()
        .filter_map(|frame| match frame {
            OutboundFrame::Subscribe { channel, .. } => Some(channel),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_connects_and_opens_channels() {
    verbose_println!("Testing WebSocket connect...");

    let server = MockWsServer::start().await;
    let transport = Arc::new(WsTransport::builder().url(server.ws_url()).build());
    let manager = ConnectionManager::new(fast_reconnect(), transport.clone());

    manager
        .subscribe(
            SubscriptionConfig::<Lead>::new("leads-feed", "leads", |_| Ok(()))
                .event_filter(EventFilter::Insert)
                .server_filter("status=eq.new"),
        )
        .unwrap();

    assert!(eventually(WAIT, || manager.health().state == ConnectionState::Connected).await);
    assert!(transport.is_connected());
    assert!(eventually(WAIT, || subscribed_channels(&server).len() == 1).await);

    let subscribe = server
        .received()
        .into_iter()
        .find(|f| matches!(f, OutboundFrame::Subscribe { .. }))
        .unwrap();
    assert_eq!(
        subscribe,
        OutboundFrame::Subscribe {
            channel: "leads-feed".into(),
            topic: "leads".into(),
            event: EventFilter::Insert,
            filter: Some("status=eq.new".into()),
        }
    );

    let unsubscribe = OutboundFrame::Unsubscribe { channel: "leads-feed".into() };
    let count_unsubscribes = || server.received().iter().filter(|f| **f == unsubscribe).count();
    let before = count_unsubscribes();
    manager.unsubscribe("leads-feed", None);
    assert!(eventually(WAIT, || count_unsubscribes() == before + 1).await);

    manager.destroy();
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_api_key_sent_on_handshake() {
    let server = MockWsServer::start().await;
    let config = TransportConfig {
        url: Some(server.ws_url()),
        api_key: Some("anon-key".into()),
        ..Default::default()
    };
    let transport = Arc::new(WsTransport::from_config(&config).unwrap());
    let manager = ConnectionManager::new(fast_reconnect(), transport);
    manager.connect().unwrap();

    assert!(eventually(WAIT, || server.connection_count() == 1).await);
    let headers = &server.handshake_headers()[0];
    assert_eq!(headers.get("apikey").map(String::as_str), Some("anon-key"));
    assert_eq!(
        headers.get("authorization").map(String::as_str),
        Some("Bearer anon-key")
    );

    manager.destroy();
}

#[test]
fn test_from_config_requires_url() {
    let result = WsTransport::from_config(&TransportConfig::default());
    assert!(matches!(result, Err(LiveWireError::Configuration(_))));
}

#[tokio::test]
async fn test_pushed_change_reaches_callback() {
    let server = MockWsServer::start().await;
    let transport = Arc::new(WsTransport::builder().url(server.ws_url()).build());
    let manager = ConnectionManager::new(fast_reconnect(), transport);

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    manager
        .subscribe(SubscriptionConfig::<Lead>::new("leads-feed", "leads", move |event| {
            sink.lock().push(event.change.current().cloned());
            Ok(())
        }))
        .unwrap();
    assert!(eventually(WAIT, || subscribed_channels(&server).len() == 1).await);

    server.push(InboundFrame::Change {
        channel: "leads-feed".into(),
        event: ChangeKind::Insert,
        old: None,
        new: Some(json!({ "id": 1, "name": "Ada" })),
        commit_timestamp: None,
    });
    // Frames for unknown channels are ignored
    server.push(InboundFrame::Change {
        channel: "other".into(),
        event: ChangeKind::Insert,
        old: None,
        new: Some(json!({ "id": 2, "name": "Bob" })),
        commit_timestamp: None,
    });

    assert!(eventually(WAIT, || received.lock().len() == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        *received.lock(),
        vec![Some(Lead { id: 1, name: "Ada".into() })]
    );
    assert_eq!(manager.metrics().messages_dispatched, 1);

    manager.destroy();
}

#[tokio::test]
async fn test_server_drop_triggers_reconnect_and_resubscribe() {
    verbose_println!("Testing reconnect after server drop...");

    let server = MockWsServer::start().await;
    let transport = Arc::new(WsTransport::builder().url(server.ws_url()).build());
    let manager = ConnectionManager::new(fast_reconnect(), transport);
    manager
        .subscribe(SubscriptionConfig::<Lead>::new("leads-feed", "leads", |_| Ok(())))
        .unwrap();
    assert!(eventually(WAIT, || subscribed_channels(&server).len() == 1).await);

    server.drop_clients();
    assert!(eventually(WAIT, || server.connection_count() == 2).await);
    assert!(eventually(WAIT, || manager.health().state == ConnectionState::Connected).await);
    assert!(eventually(WAIT, || subscribed_channels(&server).len() == 2).await);
    assert_eq!(manager.health().reconnect_attempts, 0);
    assert!(manager.has_channel("leads-feed"));

    manager.destroy();
}

#[tokio::test]
async fn test_heartbeat_ack_and_timeout() {
    let server = MockWsServer::start().await;
    let transport = WsTransport::builder()
        .url(server.ws_url())
        .probe_timeout(Duration::from_millis(200))
        .build();

    // Not connected yet
    assert_eq!(transport.probe().await, Err(LiveWireError::NotConnected));

    let transport = Arc::new(transport);
    let manager = ConnectionManager::new(fast_reconnect(), transport.clone());
    manager.connect().unwrap();
    assert!(eventually(WAIT, || transport.is_connected()).await);

    assert_eq!(transport.probe().await, Ok(()));
    assert!(server
        .received()
        .iter()
        .any(|f| matches!(f, OutboundFrame::Heartbeat { .. })));

    server.set_ack_heartbeats(false);
    assert!(matches!(
        transport.probe().await,
        Err(LiveWireError::Timeout(_))
    ));
    // A missed ack does not drop the connection
    assert_eq!(manager.health().state, ConnectionState::Connected);

    manager.destroy();
}
