//! # LiveWire
//!
//! Real-time subscription management over a single push connection.
//!
//! ## Components
//!
//! - **ConnectionManager**: one resilient logical connection, N multiplexed
//!   subscriptions, exponential-backoff reconnection, heartbeat and latency probes
//! - **PerformanceOptimizer**: throttle, priority tiers, batched delivery,
//!   metrics and memory-pressure cleanup
//! - **Transports**: the injected [`RealtimeTransport`] boundary with an
//!   in-memory mock and a `tokio-tungstenite` implementation
//! - **Bindings**: health watch, scoped topic subscriptions, live collections
//!
//! ```text
//!   transport ──change──> ConnectionManager ──typed ChangeEvent──> optimizer wrapper ──> callback
//!       ▲                       │
//!       └── open/close/probe ───┘
//! ```

pub mod traits;
pub mod core;
pub mod manager;
pub mod optimizer;
pub mod transports;
pub mod bindings;

// Re-export all traits
pub use traits::*;

// Re-export core types
pub use crate::core::{
    config, connection_state, events, heartbeat, subscription,
    config::{ConfigError, ManagerConfig, OptimizerConfig, RealtimeConfig, TopicConfig, TransportConfig},
    connection_state::{ConnectionHealth, ConnectionMetrics, ConnectionState},
    events::{EventEmitter, ListenerHandle, ManagerEvent, ManagerEventKind},
    subscription::{Change, ChangeEvent, SubscriptionConfig, SubscriptionInfo},
};

pub use manager::{ConnectionManager, SubscriptionHandle, WeakConnectionManager};
pub use optimizer::{PerformanceMetrics, PerformanceOptimizer, PerformanceReport};
pub use transports::{MockTransport, WsTransport};
