//! Transport implementations
//!
//! - [`MockTransport`]: in-memory, event injection for tests and offline use
//! - [`WsTransport`]: `tokio-tungstenite` client speaking a JSON envelope

pub mod mock;
pub mod states;
pub mod websocket;

pub use mock::MockTransport;
pub use websocket::{InboundFrame, OutboundFrame, WsTransport, WsTransportBuilder};
