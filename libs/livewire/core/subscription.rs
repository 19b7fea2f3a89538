use crate::traits::{BoxError, ChangeKind, EventFilter, LiveWireError, RawChange, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Typed before/after snapshots for one change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Change<T> {
    Insert { new: T },
    Update { old: Option<T>, new: T },
    Delete { old: T },
}

impl<T> Change<T> {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Insert { .. } => ChangeKind::Insert,
            Change::Update { .. } => ChangeKind::Update,
            Change::Delete { .. } => ChangeKind::Delete,
        }
    }

    /// Row state after the change, if it still exists
    pub fn current(&self) -> Option<&T> {
        match self {
            Change::Insert { new } | Change::Update { new, .. } => Some(new),
            Change::Delete { .. } => None,
        }
    }
}

/// Normalized change handed to subscription callbacks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent<T> {
    pub topic: String,
    pub commit_timestamp: Option<DateTime<Utc>>,
    pub change: Change<T>,
}

impl<T: DeserializeOwned> ChangeEvent<T> {
    /// Decode a raw transport change into typed snapshots
    pub fn from_raw(topic: &str, raw: RawChange) -> std::result::Result<Self, String> {
        fn decode<T: DeserializeOwned>(side: &str, value: Option<Value>) -> std::result::Result<T, String> {
            let value = value.ok_or_else(|| format!("missing '{}' record", side))?;
            serde_json::from_value(value).map_err(|e| format!("invalid '{}' record: {}", side, e))
        }

        let change = match raw.kind {
            ChangeKind::Insert => Change::Insert {
                new: decode("new", raw.new)?,
            },
            ChangeKind::Update => Change::Update {
                old: match raw.old {
                    Some(Value::Null) | None => None,
                    // Partial old records (primary key only) are not an error
                    Some(v) => serde_json::from_value(v).ok(),
                },
                new: decode("new", raw.new)?,
            },
            ChangeKind::Delete => Change::Delete {
                old: decode("old", raw.old)?,
            },
        };

        Ok(Self {
            topic: topic.to_string(),
            commit_timestamp: raw.commit_timestamp,
            change,
        })
    }
}

/// Result returned by subscription callbacks
pub type CallbackResult = std::result::Result<(), BoxError>;

/// Change callback for a subscription
pub type Callback<T> = Arc<dyn Fn(ChangeEvent<T>) -> CallbackResult + Send + Sync>;

/// Per-subscription error callback
pub type ErrorCallback = Arc<dyn Fn(&LiveWireError) + Send + Sync>;

/// One logical interest: topic + event filter + callback
pub struct SubscriptionConfig<T> {
    pub id: String,
    pub topic: String,
    pub event_filter: EventFilter,
    pub server_filter: Option<String>,
    pub callback: Callback<T>,
    pub on_error: Option<ErrorCallback>,
    pub enabled: bool,
}

impl<T> SubscriptionConfig<T> {
    pub fn new<F>(id: impl Into<String>, topic: impl Into<String>, callback: F) -> Self
    where
        F: Fn(ChangeEvent<T>) -> CallbackResult + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            topic: topic.into(),
            event_filter: EventFilter::Any,
            server_filter: None,
            callback: Arc::new(callback),
            on_error: None,
            enabled: true,
        }
    }

    pub fn event_filter(mut self, filter: EventFilter) -> Self {
        self.event_filter = filter;
        self
    }

    pub fn server_filter(mut self, filter: impl Into<String>) -> Self {
        self.server_filter = Some(filter.into());
        self
    }

    pub fn on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&LiveWireError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Value snapshot without the callbacks
    pub fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            id: self.id.clone(),
            topic: self.topic.clone(),
            event_filter: self.event_filter,
            server_filter: self.server_filter.clone(),
            enabled: self.enabled,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(LiveWireError::Configuration(
                "subscription id must not be empty".to_string(),
            ));
        }
        if self.topic.trim().is_empty() {
            return Err(LiveWireError::Configuration(format!(
                "subscription '{}' has an empty topic",
                self.id
            )));
        }
        Ok(())
    }
}

impl<T> Clone for SubscriptionConfig<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            topic: self.topic.clone(),
            event_filter: self.event_filter,
            server_filter: self.server_filter.clone(),
            callback: Arc::clone(&self.callback),
            on_error: self.on_error.clone(),
            enabled: self.enabled,
        }
    }
}

impl<T> fmt::Debug for SubscriptionConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionConfig")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("event_filter", &self.event_filter)
            .field("server_filter", &self.server_filter)
            .field("has_on_error", &self.on_error.is_some())
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Snapshot of a registered subscription, as returned by `subscriptions()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    pub id: String,
    pub topic: String,
    pub event_filter: EventFilter,
    pub server_filter: Option<String>,
    pub enabled: bool,
}
