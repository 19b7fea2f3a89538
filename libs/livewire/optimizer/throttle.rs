//! Per-subscription duplicate suppression
//!
//! At most one message per `(subscription, payload hash)` is let through per
//! window. Identical updates arriving in a burst are dropped, not delayed.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

pub type Signature = [u8; 32];

/// SHA-256 of the serialized payload, or `None` if it cannot be serialized
pub fn signature<P: Serialize + ?Sized>(payload: &P) -> Option<Signature> {
    let bytes = serde_json::to_vec(payload).ok()?;
    Some(Sha256::digest(&bytes).into())
}

#[derive(Debug)]
pub struct ThrottleMap {
    window: Duration,
    seen: HashMap<(String, Signature), Instant>,
}

impl ThrottleMap {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Record the message and return whether it may pass
    pub fn admit(&mut self, subscription_id: &str, signature: Signature, now: Instant) -> bool {
        let key = (subscription_id.to_string(), signature);
        if let Some(last) = self.seen.get(&key) {
            if now.saturating_duration_since(*last) < self.window {
                return false;
            }
        }
        self.seen.insert(key, now);
        true
    }

    /// Forget entries whose window has passed; returns how many were removed
    pub fn cleanup(&mut self, now: Instant) -> usize {
        let before = self.seen.len();
        let window = self.window;
        self.seen
            .retain(|_, last| now.saturating_duration_since(*last) < window);
        before - self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signature_covers_full_payload() {
        // Equal 50-char prefixes must not collide
        let prefix = "x".repeat(60);
        let a = signature(&json!({ "body": format!("{}a", prefix) })).unwrap();
        let b = signature(&json!({ "body": format!("{}b", prefix) })).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, signature(&json!({ "body": format!("{}a", prefix) })).unwrap());
    }

    #[test]
    fn test_admit_within_and_after_window() {
        let mut throttle = ThrottleMap::new(Duration::from_millis(100));
        let sig = signature(&json!({"id": 1})).unwrap();
        let t0 = Instant::now();

        assert!(throttle.admit("a", sig, t0));
        assert!(!throttle.admit("a", sig, t0 + Duration::from_millis(50)));
        // Other subscriptions are independent
        assert!(throttle.admit("b", sig, t0 + Duration::from_millis(50)));
        assert!(throttle.admit("a", sig, t0 + Duration::from_millis(100)));
    }

    #[test]
    fn test_cleanup_removes_expired() {
        let mut throttle = ThrottleMap::new(Duration::from_millis(100));
        let t0 = Instant::now();
        throttle.admit("a", signature(&1).unwrap(), t0);
        throttle.admit("a", signature(&2).unwrap(), t0 + Duration::from_millis(80));

        assert_eq!(throttle.cleanup(t0 + Duration::from_millis(120)), 1);
        assert_eq!(throttle.len(), 1);
    }
}
