//! Correlation id generation
//!
//! Ids must never collide for the life of the process. Two strategies are
//! offered: random v4 UUIDs, or a per-generator epoch plus a monotonically
//! increasing counter (shorter ids, easier to follow in logs).

use super::frame::MessageId;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// How fresh ids are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Random 128-bit token
    #[default]
    Random,
    /// Process epoch plus counter
    Sequential,
}

/// Generator of process-unique message ids
#[derive(Debug)]
pub struct MessageIdGenerator {
    strategy: IdStrategy,
    epoch: String,
    counter: AtomicU64,
}

impl MessageIdGenerator {
    /// Create a generator for the given strategy
    pub fn new(strategy: IdStrategy) -> Self {
        Self {
            strategy,
            epoch: Uuid::new_v4().simple().to_string()[..12].to_string(),
            counter: AtomicU64::new(1),
        }
    }

    /// Produce the next id
    pub fn next_id(&self) -> MessageId {
        match self.strategy {
            IdStrategy::Random => MessageId::from(Uuid::new_v4().to_string()),
            IdStrategy::Sequential => {
                let n = self.counter.fetch_add(1, Ordering::Relaxed);
                MessageId::from(format!("{}-{}", self.epoch, n))
            }
        }
    }

    /// Strategy in use
    pub fn strategy(&self) -> IdStrategy {
        self.strategy
    }
}

impl Default for MessageIdGenerator {
    fn default() -> Self {
        Self::new(IdStrategy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_ids_are_unique() {
        let ids = MessageIdGenerator::new(IdStrategy::Random);
        let seen: HashSet<_> = (0..1000).map(|_| ids.next_id()).collect();
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_sequential_ids_share_epoch_and_increase() {
        let ids = MessageIdGenerator::new(IdStrategy::Sequential);
        let a = ids.next_id();
        let b = ids.next_id();
        let (epoch_a, n_a) = a.as_str().rsplit_once('-').unwrap();
        let (epoch_b, n_b) = b.as_str().rsplit_once('-').unwrap();
        assert_eq!(epoch_a, epoch_b);
        assert!(n_b.parse::<u64>().unwrap() > n_a.parse::<u64>().unwrap());
    }

    #[test]
    fn test_separate_generators_do_not_collide() {
        let first = MessageIdGenerator::new(IdStrategy::Sequential);
        let second = MessageIdGenerator::new(IdStrategy::Sequential);
        assert_ne!(first.next_id(), second.next_id());
    }
}
