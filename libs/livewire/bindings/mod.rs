//! Binding layer for application code
//!
//! Thin consumers of the manager's public API: a health watch, a scoped
//! per-topic subscription, a change-applying list, and preset feeds.

pub mod collection;
pub mod health;
pub mod presets;
pub mod topic;

pub use collection::{Identifiable, LiveCollection};
pub use health::HealthWatch;
pub use presets::{conversation_feed, leads_feed, ConversationMessage, Lead, LiveFeed};
pub use topic::TopicSubscription;
