use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the single logical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl ConnectionState {
    #[inline]
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// Connecting or reconnecting
    #[inline]
    pub fn is_connecting(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Reconnecting)
    }

    #[inline]
    pub fn is_error(self) -> bool {
        self == ConnectionState::Error
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only health snapshot, recomputed on every call
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ConnectionHealth {
    pub state: ConnectionState,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub reconnect_attempts: usize,
    pub latency_ms: Option<f64>,
    pub subscription_count: usize,
}

impl ConnectionHealth {
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    #[inline]
    pub fn is_connecting(&self) -> bool {
        self.state.is_connecting()
    }

    #[inline]
    pub fn has_error(&self) -> bool {
        self.state.is_error()
    }

    /// Time since the current connection was established
    pub fn uptime(&self) -> Option<chrono::Duration> {
        self.connected_at.map(|at| Utc::now() - at)
    }
}

/// Connection counters snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionMetrics {
    pub messages_dispatched: u64,
    pub callback_errors: u64,
    pub reconnect_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_flags() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::Reconnecting.is_connecting());
        assert!(ConnectionState::Connecting.is_connecting());
        assert!(!ConnectionState::Disconnected.is_connecting());
        assert!(ConnectionState::Error.is_error());
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }

    #[test]
    fn test_health_serializes_lowercase_state() {
        let health = ConnectionHealth {
            state: ConnectionState::Connected,
            subscription_count: 2,
            ..Default::default()
        };
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["state"], "connected");
        assert_eq!(json["subscription_count"], 2);
        assert!(health.uptime().is_none());
    }
}
