//! Transport boundary
//!
//! The connection manager never talks to a socket directly. It drives an
//! injected [`RealtimeTransport`] and receives lifecycle and data callbacks
//! through a [`TransportEvents`] handle.
//!
//! ```text
//! ConnectionManager ──connect/open_channel/close_channel/probe──> RealtimeTransport
//!        ▲                                                             │
//!        └────────── TransportEvents (open/close/error/change) ────────┘
//! ```

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Weak;

/// Kind of row-level change delivered by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Which change kinds a subscription wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventFilter {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[default]
    #[serde(rename = "*")]
    Any,
}

impl EventFilter {
    #[inline]
    pub fn matches(self, kind: ChangeKind) -> bool {
        match self {
            EventFilter::Any => true,
            EventFilter::Insert => kind == ChangeKind::Insert,
            EventFilter::Update => kind == ChangeKind::Update,
            EventFilter::Delete => kind == ChangeKind::Delete,
        }
    }
}

/// Untyped change as delivered by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    pub kind: ChangeKind,
    #[serde(default)]
    pub old: Option<Value>,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub commit_timestamp: Option<DateTime<Utc>>,
}

impl RawChange {
    pub fn insert(new: Value) -> Self {
        Self {
            kind: ChangeKind::Insert,
            old: None,
            new: Some(new),
            commit_timestamp: None,
        }
    }

    pub fn update(old: Option<Value>, new: Value) -> Self {
        Self {
            kind: ChangeKind::Update,
            old,
            new: Some(new),
            commit_timestamp: None,
        }
    }

    pub fn delete(old: Value) -> Self {
        Self {
            kind: ChangeKind::Delete,
            old: Some(old),
            new: None,
            commit_timestamp: None,
        }
    }
}

/// Everything a transport needs to realize one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    /// Channel id, equal to the subscription id it serves
    pub channel_id: String,
    pub topic: String,
    pub event: EventFilter,
    pub filter: Option<String>,
}

/// Status reported by the transport for a single channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    Closed,
    TimedOut,
    ChannelError(String),
}

impl ChannelStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, ChannelStatus::TimedOut | ChannelStatus::ChannelError(_))
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Subscribed => write!(f, "SUBSCRIBED"),
            ChannelStatus::Closed => write!(f, "CLOSED"),
            ChannelStatus::TimedOut => write!(f, "TIMED_OUT"),
            ChannelStatus::ChannelError(msg) => write!(f, "CHANNEL_ERROR: {}", msg),
        }
    }
}

/// Receiver side of transport callbacks, implemented by the connection manager
pub trait TransportListener: Send + Sync {
    fn on_open(&self);
    fn on_close(&self, reason: String);
    fn on_error(&self, message: String);
    fn on_change(&self, channel_id: &str, change: RawChange);
    fn on_channel_status(&self, channel_id: &str, status: ChannelStatus);
}

/// Handle a transport uses to report back to its owner
///
/// Holds only a weak reference: events reported after the owner is gone are
/// silently dropped.
#[derive(Clone)]
pub struct TransportEvents {
    listener: Weak<dyn TransportListener>,
}

impl TransportEvents {
    pub fn new(listener: Weak<dyn TransportListener>) -> Self {
        Self { listener }
    }

    pub fn open(&self) {
        if let Some(listener) = self.listener.upgrade() {
            listener.on_open();
        }
    }

    pub fn close(&self, reason: impl Into<String>) {
        if let Some(listener) = self.listener.upgrade() {
            listener.on_close(reason.into());
        }
    }

    pub fn error(&self, message: impl Into<String>) {
        if let Some(listener) = self.listener.upgrade() {
            listener.on_error(message.into());
        }
    }

    pub fn change(&self, channel_id: &str, change: RawChange) {
        if let Some(listener) = self.listener.upgrade() {
            listener.on_change(channel_id, change);
        }
    }

    pub fn channel_status(&self, channel_id: &str, status: ChannelStatus) {
        if let Some(listener) = self.listener.upgrade() {
            listener.on_channel_status(channel_id, status);
        }
    }

    /// True while the owner is still alive
    pub fn is_attached(&self) -> bool {
        self.listener.strong_count() > 0
    }
}

impl fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEvents")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Push-capable realtime client consumed by the connection manager
///
/// Implementations must not call back into `TransportEvents` while holding
/// their own locks: the manager may re-enter the transport from inside a
/// callback (e.g. resubscribing every channel on `open`).
#[async_trait]
pub trait RealtimeTransport: Send + Sync + 'static {
    /// Start one connection attempt. Outcome is reported through `events`.
    fn connect(&self, events: TransportEvents);

    /// Realize a channel for a subscription
    fn open_channel(&self, request: ChannelRequest) -> Result<()>;

    /// Tear down a channel; unknown ids are ignored
    fn close_channel(&self, channel_id: &str);

    /// Lightweight round trip used for heartbeats and latency sampling
    async fn probe(&self) -> Result<()>;

    /// Close the underlying connection without reporting `close`
    fn disconnect(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_filter_matching() {
        assert!(EventFilter::Any.matches(ChangeKind::Delete));
        assert!(EventFilter::Insert.matches(ChangeKind::Insert));
        assert!(!EventFilter::Insert.matches(ChangeKind::Update));
        assert!(!EventFilter::Delete.matches(ChangeKind::Insert));
    }

    #[test]
    fn test_event_filter_wire_names() {
        assert_eq!(serde_json::to_string(&EventFilter::Any).unwrap(), "\"*\"");
        assert_eq!(
            serde_json::from_str::<EventFilter>("\"UPDATE\"").unwrap(),
            EventFilter::Update
        );
        assert_eq!(
            serde_json::from_str::<ChangeKind>("\"DELETE\"").unwrap(),
            ChangeKind::Delete
        );
    }

    #[test]
    fn test_detached_events_are_dropped() {
        struct Nobody;
        impl TransportListener for Nobody {
            fn on_open(&self) {
                panic!("must not be called");
            }
            fn on_close(&self, _reason: String) {}
            fn on_error(&self, _message: String) {}
            fn on_change(&self, _channel_id: &str, _change: RawChange) {}
            fn on_channel_status(&self, _channel_id: &str, _status: ChannelStatus) {}
        }

        let listener: std::sync::Arc<dyn TransportListener> = std::sync::Arc::new(Nobody);
        let events = TransportEvents::new(std::sync::Arc::downgrade(&listener));
        assert!(events.is_attached());
        drop(listener);
        assert!(!events.is_attached());
        events.open();
    }
}
