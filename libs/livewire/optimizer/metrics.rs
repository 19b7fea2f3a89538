use crate::core::OptimizerConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

pub(crate) const QUEUED_MESSAGE_BYTES: f64 = 1024.0;
pub(crate) const SUBSCRIPTION_BYTES: f64 = 10.0 * 1024.0;
pub(crate) const HISTORY_SAMPLE_BYTES: f64 = 512.0;

/// History length kept after a memory cleanup
pub const HISTORY_AFTER_CLEANUP: usize = 30;

const LATENCY_THRESHOLD_MS: f64 = 200.0;
const USAGE_THRESHOLD: f64 = 0.8;
const THROTTLE_THRESHOLD: f64 = 0.1;

/// Rough footprint of the optimizer's own bookkeeping, in MB
pub fn estimate_memory_mb(queued: usize, subscriptions: usize, history: usize) -> f64 {
    let bytes = queued as f64 * QUEUED_MESSAGE_BYTES
        + subscriptions as f64 * SUBSCRIPTION_BYTES
        + history as f64 * HISTORY_SAMPLE_BYTES;
    bytes / (1024.0 * 1024.0)
}

/// Point-in-time optimizer metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub sampled_at: DateTime<Utc>,
    pub subscriptions: usize,
    pub messages_per_second: f64,
    pub average_latency_ms: f64,
    pub memory_usage_mb: f64,
    pub queued_messages: usize,
    pub throttled_messages: u64,
    pub batched_messages: u64,
    pub dropped_messages: u64,
    pub connection_uptime: Duration,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            sampled_at: Utc::now(),
            subscriptions: 0,
            messages_per_second: 0.0,
            average_latency_ms: 0.0,
            memory_usage_mb: 0.0,
            queued_messages: 0,
            throttled_messages: 0,
            batched_messages: 0,
            dropped_messages: 0,
            connection_uptime: Duration::ZERO,
        }
    }
}

/// Advisory report derived from static thresholds
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub metrics: PerformanceMetrics,
    pub recommendations: Vec<String>,
}

impl PerformanceReport {
    pub fn new(metrics: PerformanceMetrics, config: &OptimizerConfig) -> Self {
        let recommendations = recommendations(&metrics, config);
        Self {
            generated_at: Utc::now(),
            metrics,
            recommendations,
        }
    }
}

impl fmt::Display for PerformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.metrics;
        writeln!(f, "Realtime performance report ({})", self.generated_at.to_rfc3339())?;
        writeln!(f, "  subscriptions:     {}", m.subscriptions)?;
        writeln!(f, "  messages/sec:      {:.2}", m.messages_per_second)?;
        writeln!(f, "  avg latency:       {:.1}ms", m.average_latency_ms)?;
        writeln!(f, "  memory estimate:   {:.2}MB", m.memory_usage_mb)?;
        writeln!(f, "  queued:            {}", m.queued_messages)?;
        writeln!(
            f,
            "  throttled/batched: {}/{} (dropped {})",
            m.throttled_messages, m.batched_messages, m.dropped_messages
        )?;
        writeln!(f, "  uptime:            {}s", m.connection_uptime.as_secs())?;
        writeln!(f, "Recommendations:")?;
        for rec in &self.recommendations {
            writeln!(f, "  - {}", rec)?;
        }
        Ok(())
    }
}

pub fn recommendations(metrics: &PerformanceMetrics, config: &OptimizerConfig) -> Vec<String> {
    let mut recs = Vec::new();

    if metrics.subscriptions as f64 > config.max_subscriptions as f64 * USAGE_THRESHOLD {
        recs.push(format!(
            "High subscription count ({}/{}): consolidate subscriptions or raise max_subscriptions",
            metrics.subscriptions, config.max_subscriptions
        ));
    }
    if metrics.average_latency_ms > LATENCY_THRESHOLD_MS {
        recs.push(format!(
            "Average delivery latency {:.0}ms exceeds {:.0}ms: lower batch_timeout_ms or raise batch_size",
            metrics.average_latency_ms, LATENCY_THRESHOLD_MS
        ));
    }
    if metrics.memory_usage_mb > config.memory_limit_mb * USAGE_THRESHOLD {
        recs.push(format!(
            "Estimated memory {:.2}MB is above 80% of the {:.0}MB limit: narrow server filters",
            metrics.memory_usage_mb, config.memory_limit_mb
        ));
    }
    if metrics.throttled_messages as f64 > metrics.batched_messages as f64 * THROTTLE_THRESHOLD {
        recs.push(format!(
            "{} messages throttled against {} batched: look for duplicate update bursts upstream",
            metrics.throttled_messages, metrics.batched_messages
        ));
    }

    if recs.is_empty() {
        recs.push("All metrics within recommended thresholds".to_string());
    }
    recs
}
