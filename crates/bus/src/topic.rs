use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::partition::Partition;

pub const RETRY_SUFFIX: &str = "-retry";
pub const DEAD_LETTER_TOPIC: &str = "dead-letter-queue";

pub struct Topic {
    partitions: Vec<Partition>,
}

impl Topic {
    pub fn new(partition_count: u32) -> Self {
        Self {
            partitions: (0..partition_count.max(1)).map(|_| Partition::default()).collect(),
        }
    }

    pub fn partition_count(&self) -> u32 {
        self.partitions.len() as u32
    }

    pub fn partition_for_key(&self, key: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions.len() as u64) as u32
    }

    pub fn partition(&self, index: u32) -> &Partition {
        &self.partitions[index as usize]
    }
}

pub fn retry_topic_name(topic: &str) -> String {
    format!("{topic}{RETRY_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_always_maps_to_same_partition() {
        let t = Topic::new(3);
        let a = t.partition_for_key("agent-42");
        let b = t.partition_for_key("agent-42");
        assert_eq!(a, b);
    }

    #[test]
    fn retry_topic_name_appends_suffix() {
        assert_eq!(retry_topic_name("runs"), "runs-retry");
    }
}
