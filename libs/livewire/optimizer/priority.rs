//! Static topic priorities and server-side filter narrowing

use crate::core::{FilterRule, OptimizerConfig};
use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Tier assigned to `priority_topics`
pub const HIGHEST_PRIORITY: u8 = 9;

/// Tier for topics nobody configured
pub const DEFAULT_PRIORITY: u8 = 5;

/// Messages above this tier skip the batch queue
pub const BYPASS_ABOVE: u8 = 8;

pub fn priority_for(config: &OptimizerConfig, topic: &str) -> u8 {
    if config.priority_topics.iter().any(|t| t == topic) {
        return HIGHEST_PRIORITY;
    }
    config
        .topic_priorities
        .get(topic)
        .copied()
        .map(|p| p.min(HIGHEST_PRIORITY))
        .unwrap_or(DEFAULT_PRIORITY)
}

/// Server filter for a known high-volume topic, evaluated at `now`
pub fn narrowed_filter(config: &OptimizerConfig, topic: &str, now: DateTime<Utc>) -> Option<String> {
    let rule = config.topic_filters.get(topic)?;
    Some(match rule {
        FilterRule::TrailingWindow {
            column,
            window_secs,
        } => {
            let since = now - Duration::seconds(*window_secs);
            format!(
                "{}=gte.{}",
                column,
                since.to_rfc3339_opts(SecondsFormat::Secs, true)
            )
        }
        FilterRule::Equals { column, value } => format!("{}=eq.{}", column, value),
    })
}
