//! Core building blocks shared by the manager, optimizer and bindings:
//! configuration, connection state, the typed event emitter, periodic
//! tickers and subscription types.

pub mod config;
pub mod connection_state;
pub mod events;
pub mod heartbeat;
pub mod subscription;

// Re-export main types
pub use config::{
    ConfigError, FilterRule, ManagerConfig, OptimizerConfig, RealtimeConfig, TopicConfig,
    TransportConfig,
};
pub use connection_state::{ConnectionHealth, ConnectionMetrics, ConnectionState};
pub use events::{Event, EventEmitter, ListenerHandle, ManagerEvent, ManagerEventKind};
pub use heartbeat::{spawn_delayed, spawn_ticker, TickFlow, Ticker};
pub use subscription::{
    Callback, CallbackResult, Change, ChangeEvent, ErrorCallback, SubscriptionConfig,
    SubscriptionInfo,
};
