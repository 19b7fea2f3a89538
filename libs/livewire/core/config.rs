use crate::traits::{EventFilter, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Connection manager tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub base_reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub max_reconnect_attempts: usize,
    pub heartbeat_interval_ms: u64,
    pub latency_sample_interval_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            base_reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 30_000,
            max_reconnect_attempts: 10,
            heartbeat_interval_ms: 30_000,
            latency_sample_interval_ms: 60_000,
        }
    }
}

impl ManagerConfig {
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.base_reconnect_delay_ms),
            Duration::from_millis(self.max_reconnect_delay_ms),
            Some(self.max_reconnect_attempts),
        )
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn latency_sample_interval(&self) -> Duration {
        Duration::from_millis(self.latency_sample_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.base_reconnect_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "base_reconnect_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_reconnect_delay_ms < self.base_reconnect_delay_ms {
            return Err(ConfigError::ValidationError(
                "max_reconnect_delay_ms must be >= base_reconnect_delay_ms".to_string(),
            ));
        }
        if self.heartbeat_interval_ms == 0 || self.latency_sample_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "heartbeat and latency intervals must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// How to narrow the server-side filter of a high-volume topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterRule {
    /// Only rows whose `column` is within the trailing window
    TrailingWindow { column: String, window_secs: i64 },
    /// Only rows whose `column` equals `value`
    Equals { column: String, value: String },
}

/// Performance optimizer tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Advisory cap, only used for reporting
    pub max_subscriptions: usize,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub throttle_ms: u64,
    pub memory_limit_mb: f64,
    pub enable_filtering: bool,
    /// Topics delivered at the highest tier, bypassing batching
    pub priority_topics: Vec<String>,
    /// Hand-assigned tiers (0-9) for well-known topics
    pub topic_priorities: HashMap<String, u8>,
    pub topic_filters: HashMap<String, FilterRule>,
    pub max_queued_messages: usize,
    pub metrics_interval_ms: u64,
    pub throttle_cleanup_interval_ms: u64,
    pub history_capacity: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        let topic_priorities = HashMap::from([
            ("leads".to_string(), 8),
            ("whatsapp_messages".to_string(), 7),
            ("whatsapp_conversations".to_string(), 7),
            ("integrations".to_string(), 6),
            ("form_submissions".to_string(), 6),
            ("audit_log".to_string(), 3),
            ("analytics_events".to_string(), 3),
        ]);

        let topic_filters = HashMap::from([
            (
                "analytics_events".to_string(),
                FilterRule::TrailingWindow {
                    column: "created_at".to_string(),
                    window_secs: 3_600,
                },
            ),
            (
                "audit_log".to_string(),
                FilterRule::TrailingWindow {
                    column: "created_at".to_string(),
                    window_secs: 3_600,
                },
            ),
            (
                "whatsapp_conversations".to_string(),
                FilterRule::Equals {
                    column: "status".to_string(),
                    value: "active".to_string(),
                },
            ),
        ]);

        Self {
            max_subscriptions: 50,
            batch_size: 10,
            batch_timeout_ms: 1_000,
            throttle_ms: 100,
            memory_limit_mb: 50.0,
            enable_filtering: true,
            priority_topics: vec!["system_alerts".to_string()],
            topic_priorities,
            topic_filters,
            max_queued_messages: 1_000,
            metrics_interval_ms: 1_000,
            throttle_cleanup_interval_ms: 5_000,
            history_capacity: 60,
        }
    }
}

impl OptimizerConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn throttle_window(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    pub fn throttle_cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_cleanup_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.batch_timeout_ms == 0 || self.metrics_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "batch_timeout_ms and metrics_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.throttle_cleanup_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "throttle_cleanup_interval_ms must be greater than 0".to_string(),
            ));
        }
        if !(self.memory_limit_mb > 0.0) {
            return Err(ConfigError::ValidationError(
                "memory_limit_mb must be positive".to_string(),
            ));
        }
        if let Some((topic, tier)) = self.topic_priorities.iter().find(|(_, tier)| **tier > 9) {
            return Err(ConfigError::ValidationError(format!(
                "priority for topic '{}' must be between 0 and 9, got {}",
                topic, tier
            )));
        }
        if self.max_queued_messages == 0 || self.history_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "max_queued_messages and history_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Transport selection for the composition root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// WebSocket endpoint; when absent the in-memory transport is used
    pub url: Option<String>,
    /// API key from .env (not in YAML)
    #[serde(skip)]
    pub api_key: Option<String>,
    pub probe_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            probe_timeout_ms: 10_000,
        }
    }
}

impl TransportConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// A topic the monitor subscribes to at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicConfig {
    pub topic: String,
    #[serde(default)]
    pub event: EventFilter,
    #[serde(default)]
    pub filter: Option<String>,
}

/// Top-level realtime configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub topics: Vec<TopicConfig>,
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            manager: ManagerConfig::default(),
            optimizer: OptimizerConfig::default(),
            topics: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

impl RealtimeConfig {
    /// Load configuration from YAML file
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config = Self::from_yaml(&yaml_content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse without touching the environment or validating
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("REALTIME_URL") {
            info!("Overriding realtime URL from environment variable");
            self.transport.url = Some(url);
        }
        if let Ok(key) = std::env::var("REALTIME_API_KEY") {
            self.transport.api_key = Some(key);
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.manager.validate()?;
        self.optimizer.validate()?;

        if let Some(url) = &self.transport.url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(ConfigError::ValidationError(format!(
                    "transport url must start with ws:// or wss://, got '{}'",
                    url
                )));
            }
        }

        if let Some(topic) = self.topics.iter().find(|t| t.topic.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "topic entry with filter {:?} has an empty name",
                topic.filter
            )));
        }

        for (i, topic) in self.topics.iter().enumerate() {
            if self.topics[..i].iter().any(|t| t.topic == topic.topic) {
                return Err(ConfigError::ValidationError(format!(
                    "topic '{}' is listed more than once",
                    topic.topic
                )));
            }
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of {:?}",
                valid_levels
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_documented_values() {
        let manager = ManagerConfig::default();
        assert_eq!(manager.base_reconnect_delay_ms, 1_000);
        assert_eq!(manager.max_reconnect_delay_ms, 30_000);
        assert_eq!(manager.max_reconnect_attempts, 10);

        let optimizer = OptimizerConfig::default();
        assert_eq!(optimizer.max_subscriptions, 50);
        assert_eq!(optimizer.batch_size, 10);
        assert_eq!(optimizer.batch_timeout_ms, 1_000);
        assert_eq!(optimizer.throttle_ms, 100);
        assert_eq!(optimizer.memory_limit_mb, 50.0);
        assert!(optimizer.enable_filtering);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
manager:
  max_reconnect_attempts: 3
optimizer:
  batch_size: 25
  priority_topics: [payments]
topics:
  - topic: leads
    event: INSERT
  - topic: orders
"#;
        let config = RealtimeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.manager.max_reconnect_attempts, 3);
        assert_eq!(config.manager.base_reconnect_delay_ms, 1_000);
        assert_eq!(config.optimizer.batch_size, 25);
        assert_eq!(config.optimizer.priority_topics, vec!["payments".to_string()]);
        assert_eq!(config.topics[0].event, EventFilter::Insert);
        assert_eq!(config.topics[1].event, EventFilter::Any);
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_filter_rule_yaml() {
        let yaml = r#"
optimizer:
  topic_filters:
    events:
      kind: trailing_window
      column: inserted_at
      window_secs: 600
"#;
        let config = RealtimeConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            config.optimizer.topic_filters.get("events"),
            Some(&FilterRule::TrailingWindow {
                column: "inserted_at".to_string(),
                window_secs: 600
            })
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = RealtimeConfig::default();
        config.optimizer.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = RealtimeConfig::default();
        config.transport.url = Some("http://example.com".to_string());
        assert!(config.validate().is_err());

        let mut config = RealtimeConfig::default();
        config.optimizer.topic_priorities.insert("x".to_string(), 12);
        assert!(config.validate().is_err());

        let mut config = RealtimeConfig::default();
        config.manager.max_reconnect_delay_ms = 10;
        assert!(config.validate().is_err());

        let mut config = RealtimeConfig::from_yaml("topics: [{topic: leads}, {topic: leads}]").unwrap();
        assert!(config.validate().is_err());
        config.topics.pop();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "log_level: debug\nmanager:\n  heartbeat_interval_ms: 5000").unwrap();

        let config = RealtimeConfig::load(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.manager.heartbeat_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = RealtimeConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileError(_)));
    }
}
