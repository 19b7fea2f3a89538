//! # LiveWire Manager
//!
//! Connection manager: one resilient logical connection, N multiplexed
//! subscriptions, bounded exponential-backoff reconnection and
//! heartbeat/latency probing.

pub mod manager;

pub use manager::{ConnectionManager, SubscriptionHandle, WeakConnectionManager};
