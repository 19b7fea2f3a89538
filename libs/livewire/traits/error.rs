use thiserror::Error;

/// Main error type for livewire
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LiveWireError {
    /// Transport-level failure reported by the underlying client
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connection closed unexpectedly
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Reconnection budget exhausted, caller intervention required
    #[error("Reconnection failed after {attempts} attempts: {reason}")]
    ReconnectionFailed { attempts: usize, reason: String },

    /// Raw change could not be normalized into the subscription's entity type
    #[error("Payload error on subscription '{subscription_id}': {message}")]
    Payload {
        subscription_id: String,
        message: String,
    },

    /// Caller-supplied callback returned an error or panicked
    #[error("Callback error on subscription '{subscription_id}': {message}")]
    Callback {
        subscription_id: String,
        message: String,
    },

    /// Channel could not be opened or was rejected by the server
    #[error("Channel error on subscription '{subscription_id}': {message}")]
    Channel {
        subscription_id: String,
        message: String,
    },

    /// No subscription registered under this id
    #[error("Unknown subscription: {0}")]
    UnknownSubscription(String),

    /// A subscription with this id is already registered
    #[error("Subscription '{0}' already exists")]
    DuplicateSubscription(String),

    /// Operation attempted after `destroy()`
    #[error("Manager has been destroyed")]
    Destroyed,

    /// Operation requires an open connection
    #[error("Not connected")]
    NotConnected,

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Frame (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LiveWireError {
    /// Subscription id this error is tagged with, if any
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            LiveWireError::Payload { subscription_id, .. }
            | LiveWireError::Callback { subscription_id, .. }
            | LiveWireError::Channel { subscription_id, .. } => Some(subscription_id),
            LiveWireError::UnknownSubscription(id) | LiveWireError::DuplicateSubscription(id) => {
                Some(id)
            }
            _ => None,
        }
    }

    /// True for the terminal condition that stops the reconnect loop
    pub fn is_fatal(&self) -> bool {
        matches!(self, LiveWireError::ReconnectionFailed { .. })
    }
}

impl From<serde_json::Error> for LiveWireError {
    fn from(e: serde_json::Error) -> Self {
        LiveWireError::Serialization(e.to_string())
    }
}

/// Result type for livewire operations
pub type Result<T> = std::result::Result<T, LiveWireError>;

/// Error type returned by caller-supplied callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_tagging() {
        let err = LiveWireError::Callback {
            subscription_id: "orders".into(),
            message: "boom".into(),
        };
        assert_eq!(err.subscription_id(), Some("orders"));
        assert!(!err.is_fatal());

        let fatal = LiveWireError::ReconnectionFailed {
            attempts: 10,
            reason: "server down".into(),
        };
        assert_eq!(fatal.subscription_id(), None);
        assert!(fatal.is_fatal());
        assert_eq!(
            fatal.to_string(),
            "Reconnection failed after 10 attempts: server down"
        );
    }
}
