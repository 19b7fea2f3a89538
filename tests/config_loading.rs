//! Integration test: Configuration utilities
//!
//! Tests the bin_common configuration helpers and the shipped config file.

use realtime_hub::bin_common::cli::config_path_from_args;
use realtime_hub::bin_common::{load_config_from_env, ConfigType};
use realtime_hub::livewire::{EventFilter, RealtimeConfig};
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};

#[test]
fn test_realtime_config_default() {
    // Clear env var to test default
    env::remove_var("REALTIME_CONFIG_PATH");

    let config_path = load_config_from_env(ConfigType::Realtime);
    assert_eq!(config_path.to_str().unwrap(), "config/realtime.yaml");
}

#[test]
fn test_custom_config() {
    let custom = ConfigType::Custom("custom/path.yaml".to_string());
    let config_path = load_config_from_env(custom);

    assert_eq!(config_path.to_str().unwrap(), "custom/path.yaml");
}

#[test]
fn test_config_type_env_var_names() {
    assert_eq!(ConfigType::Realtime.env_var_name(), "REALTIME_CONFIG_PATH");
}

#[test]
fn test_args_override_env() {
    let args = vec!["/tmp/monitor.yaml".to_string()];
    assert_eq!(
        config_path_from_args(&args, ConfigType::Realtime),
        PathBuf::from("/tmp/monitor.yaml")
    );
}

#[test]
fn test_shipped_config_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(ConfigType::Realtime.default_path());
    let config = RealtimeConfig::load(&path).unwrap();

    assert_eq!(config.log_level, "info");
    assert_eq!(config.manager.max_reconnect_attempts, 10);
    assert_eq!(config.optimizer.priority_topics, vec!["system_alerts".to_string()]);
    // Tiers not listed in the file keep their defaults
    assert_eq!(config.optimizer.topic_priorities.get("leads"), Some(&8));

    let topics: Vec<(&str, EventFilter)> = config
        .topics
        .iter()
        .map(|t| (t.topic.as_str(), t.event))
        .collect();
    assert_eq!(
        topics,
        vec![
            ("leads", EventFilter::Any),
            ("whatsapp_messages", EventFilter::Insert),
            ("system_alerts", EventFilter::Any),
        ]
    );
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "optimizer:\n  batch_size: 0").unwrap();

    assert!(RealtimeConfig::load(file.path()).is_err());
}
