use crate::traits::LiveWireError;
use std::fmt;
use tokio::time::Instant;

/// Outcome of delivering one queued message
#[derive(Debug)]
pub(crate) enum Delivery {
    Delivered,
    Failed(LiveWireError),
    /// The subscription went away while the message was queued
    Orphaned,
}

pub(crate) type Deliver = Box<dyn FnOnce() -> Delivery + Send>;

/// A message waiting for the next batch flush
pub struct QueuedMessage {
    pub subscription_id: String,
    pub priority: u8,
    pub enqueued_at: Instant,
    seq: u64,
    deliver: Deliver,
}

impl QueuedMessage {
    pub(crate) fn deliver(self) -> Delivery {
        (self.deliver)()
    }
}

impl fmt::Debug for QueuedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedMessage")
            .field("subscription_id", &self.subscription_id)
            .field("priority", &self.priority)
            .field("enqueued_at", &self.enqueued_at)
            .field("seq", &self.seq)
            .finish()
    }
}

/// Bounded priority queue flushed in `(priority desc, enqueued_at asc)` order
#[derive(Debug)]
pub struct MessageQueue {
    entries: Vec<QueuedMessage>,
    capacity: usize,
    next_seq: u64,
}

impl MessageQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
            next_seq: 0,
        }
    }

    /// Enqueue a message, evicting the oldest lowest-priority entry on overflow
    pub(crate) fn push(
        &mut self,
        subscription_id: String,
        priority: u8,
        enqueued_at: Instant,
        deliver: Deliver,
    ) -> Option<QueuedMessage> {
        self.next_seq += 1;
        self.entries.push(QueuedMessage {
            subscription_id,
            priority,
            enqueued_at,
            seq: self.next_seq,
            deliver,
        });

        if self.entries.len() <= self.capacity {
            return None;
        }
        let victim = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, m)| (m.priority, m.enqueued_at, m.seq))
            .map(|(idx, _)| idx)?;
        Some(self.entries.remove(victim))
    }

    /// Remove up to `n` messages in delivery order
    pub fn take_batch(&mut self, n: usize) -> Vec<QueuedMessage> {
        self.entries.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.enqueued_at.cmp(&b.enqueued_at))
                .then(a.seq.cmp(&b.seq))
        });
        let n = n.min(self.entries.len());
        self.entries.drain(..n).collect()
    }

    /// Drop every message enqueued strictly before `cutoff`
    pub fn drop_older_than(&mut self, cutoff: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|m| m.enqueued_at >= cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn noop() -> Deliver {
        Box::new(|| Delivery::Delivered)
    }

    #[test]
    fn test_batch_order_priority_then_arrival() {
        let mut queue = MessageQueue::new(100);
        let t0 = Instant::now();
        queue.push("low".into(), 3, t0, noop());
        queue.push("high".into(), 9, t0 + Duration::from_millis(1), noop());
        queue.push("mid-1".into(), 5, t0 + Duration::from_millis(2), noop());
        queue.push("mid-2".into(), 5, t0 + Duration::from_millis(3), noop());

        let batch: Vec<String> = queue
            .take_batch(3)
            .into_iter()
            .map(|m| m.subscription_id)
            .collect();
        assert_eq!(batch, vec!["high", "mid-1", "mid-2"]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_overflow_evicts_oldest_lowest_priority() {
        let mut queue = MessageQueue::new(2);
        let t0 = Instant::now();
        assert!(queue.push("a".into(), 5, t0, noop()).is_none());
        assert!(queue.push("b".into(), 3, t0, noop()).is_none());

        let evicted = queue.push("c".into(), 7, t0, noop()).unwrap();
        assert_eq!(evicted.subscription_id, "b");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_drop_older_than() {
        let mut queue = MessageQueue::new(10);
        let t0 = Instant::now();
        queue.push("old".into(), 5, t0, noop());
        queue.push("new".into(), 5, t0 + Duration::from_secs(5), noop());

        assert_eq!(queue.drop_older_than(t0 + Duration::from_secs(2)), 1);
        assert_eq!(queue.take_batch(10)[0].subscription_id, "new");
    }
}
