//! # LiveWire Traits
//!
//! Core traits and types shared across the library:
//!
//! - **RealtimeTransport**: the injected push-event source
//! - **ReconnectionStrategy**: backoff policy used by the connection manager
//! - **HeaderProvider**: handshake headers for WebSocket transports
//! - **LiveWireError**: error taxonomy

pub mod error;
pub mod headers;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use error::{BoxError, LiveWireError, Result};
pub use headers::{ApiKeyHeaders, HeaderProvider, Headers};
pub use reconnect::{ExponentialBackoff, ReconnectionStrategy};
pub use transport::{
    ChangeKind, ChannelRequest, ChannelStatus, EventFilter, RawChange, RealtimeTransport,
    TransportEvents, TransportListener,
};
