//! Ready-made feeds for the CRM business topics

use super::collection::{Identifiable, LiveCollection};
use super::topic::TopicSubscription;
use crate::core::SubscriptionConfig;
use crate::manager::ConnectionManager;
use crate::optimizer::PerformanceOptimizer;
use crate::traits::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const LEADS_TOPIC: &str = "leads";
pub const MESSAGES_TOPIC: &str = "whatsapp_messages";

/// Items kept per feed unless configured otherwise
pub const DEFAULT_FEED_CAPACITY: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Identifiable for Lead {
    type Id = String;

    fn id(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub conversation_id: String,
    /// `inbound` or `outbound`
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Identifiable for ConversationMessage {
    type Id = String;

    fn id(&self) -> String {
        self.id.clone()
    }
}

/// A mounted subscription plus the list it keeps current
///
/// Dropping the feed unsubscribes.
pub struct LiveFeed<T> {
    subscription: TopicSubscription<T>,
    items: LiveCollection<T>,
}

impl<T> LiveFeed<T>
where
    T: Identifiable + Clone + DeserializeOwned + Serialize + Send + Sync + 'static,
{
    fn mount(
        manager: &ConnectionManager,
        optimizer: Option<&PerformanceOptimizer>,
        id: String,
        topic: &str,
        server_filter: Option<String>,
    ) -> Result<Self> {
        let items = LiveCollection::with_capacity(DEFAULT_FEED_CAPACITY);
        let mut config = SubscriptionConfig::new(id, topic, items.callback());
        config.server_filter = server_filter;
        let subscription = TopicSubscription::mount(manager, optimizer, config)?;
        Ok(Self {
            subscription,
            items,
        })
    }

    pub fn items(&self) -> Vec<T> {
        self.items.snapshot()
    }

    /// Shared handle to the underlying list
    pub fn collection(&self) -> LiveCollection<T> {
        self.items.clone()
    }

    pub fn subscription(&self) -> &TopicSubscription<T> {
        &self.subscription
    }
}

/// Every lead change, newest first
pub fn leads_feed(
    manager: &ConnectionManager,
    optimizer: Option<&PerformanceOptimizer>,
) -> Result<LiveFeed<Lead>> {
    LiveFeed::mount(manager, optimizer, "leads-feed".to_string(), LEADS_TOPIC, None)
}

/// Messages of one WhatsApp conversation
pub fn conversation_feed(
    manager: &ConnectionManager,
    optimizer: Option<&PerformanceOptimizer>,
    conversation_id: &str,
) -> Result<LiveFeed<ConversationMessage>> {
    LiveFeed::mount(
        manager,
        optimizer,
        format!("conversation-{}", conversation_id),
        MESSAGES_TOPIC,
        Some(format!("conversation_id=eq.{}", conversation_id)),
    )
}
