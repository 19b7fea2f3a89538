use std::time::Duration;

/// Trait for defining reconnection strategies
///
/// The connection manager owns the attempt counter; a strategy only maps
/// an attempt number to a delay and decides when to give up.
pub trait ReconnectionStrategy: Send + Sync {
    /// Get the delay before the next reconnection attempt
    ///
    /// # Arguments
    /// * `attempt` - Number of consecutive failed attempts so far (0-indexed)
    ///
    /// # Returns
    /// * `Some(duration)` - Wait this long before reconnecting
    /// * `None` - Stop reconnecting
    fn next_delay(&self, attempt: usize) -> Option<Duration>;

    /// Check if we should continue reconnecting
    fn should_reconnect(&self, attempt: usize) -> bool;

    /// Attempt cap, if the strategy has one
    fn max_attempts(&self) -> Option<usize>;
}

/// Exponential backoff reconnection strategy
///
/// Delays between reconnection attempts grow exponentially:
/// initial_delay * 2^attempt, capped at max_delay
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<usize>,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy
    ///
    /// # Arguments
    /// * `initial_delay` - The initial delay before first reconnect
    /// * `max_delay` - The maximum delay between reconnects
    /// * `max_attempts` - Maximum number of attempts (None = unlimited)
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), Some(10))
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if !self.should_reconnect(attempt) {
            return None;
        }

        let base_ms = self.initial_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let factor = u32::try_from(attempt)
            .ok()
            .and_then(|shift| 1u64.checked_shl(shift))
            .unwrap_or(u64::MAX);
        let delay = base_ms.saturating_mul(factor).min(max_ms);
        Some(Duration::from_millis(delay))
    }

    fn should_reconnect(&self, attempt: usize) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }

    fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_documented_schedule() {
        let strategy = ExponentialBackoff::default();
        let delays: Vec<u64> = (0..10)
            .map(|i| strategy.next_delay(i).unwrap().as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000, 30000, 30000]
        );
        assert!(strategy.next_delay(10).is_none());
    }

    #[test]
    fn test_unlimited_attempts_never_overflow() {
        let strategy =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(3600), None);
        assert_eq!(strategy.next_delay(64), Some(Duration::from_secs(3600)));
        assert_eq!(strategy.next_delay(10_000), Some(Duration::from_secs(3600)));
        assert!(strategy.should_reconnect(usize::MAX - 1));
        assert_eq!(strategy.max_attempts(), None);
    }
}
