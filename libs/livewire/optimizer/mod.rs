//! Performance optimizer: throttle, priority tiers, batching, metrics and
//! memory-pressure cleanup.

pub mod metrics;
pub mod optimizer;
pub mod priority;
pub mod queue;
pub mod throttle;

pub use metrics::{PerformanceMetrics, PerformanceReport};
pub use optimizer::PerformanceOptimizer;
pub use priority::{priority_for, DEFAULT_PRIORITY, HIGHEST_PRIORITY};
pub use queue::{MessageQueue, QueuedMessage};
