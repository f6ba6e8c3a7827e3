//! In-process partitioned broker

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use super::{PartitionStream, Publisher, Transport};
use crate::shared::errors::TransportError;
use crate::shared::utils::partition_for;

/// Default number of partitions per topic
pub const DEFAULT_PARTITIONS: usize = 4;

const DEFAULT_PARTITION_CAPACITY: usize = 1024;

struct Topic {
    senders: Vec<mpsc::Sender<Vec<u8>>>,
    receivers: Option<Vec<mpsc::Receiver<Vec<u8>>>>,
}

/// Topic -> fixed set of bounded partitions
///
/// Records are routed by a hash of their key, so all records of one
/// source land on one partition and keep their order. Each topic has a single
/// consumer.
pub struct MemoryBroker {
    topics: Mutex<HashMap<String, Topic>>,
    partitions: usize,
    capacity: usize,
}

impl MemoryBroker {
    pub fn new(partitions: usize) -> Self {
        Self::with_capacity(partitions, DEFAULT_PARTITION_CAPACITY)
    }

    pub fn with_capacity(partitions: usize, capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            partitions: partitions.max(1),
            capacity: capacity.max(1),
        }
    }

    /// Create `topic` if it does not exist yet
    pub async fn create_topic(&self, topic: &str) {
        let mut topics = self.topics.lock().await;
        if topics.contains_key(topic) {
            return;
        }

        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..self.partitions).map(|_| mpsc::channel(self.capacity)).unzip();
        topics.insert(
            topic.to_string(),
            Topic {
                senders,
                receivers: Some(receivers),
            },
        );
        info!("📬 Created topic {} with {} partitions", topic, self.partitions);
    }

    /// Drop a topic; its partition streams end once drained
    pub async fn close_topic(&self, topic: &str) {
        if self.topics.lock().await.remove(topic).is_some() {
            info!("📪 Closed topic {}", topic);
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITIONS)
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn subscribe(&self, topic: &str) -> Result<Vec<PartitionStream>, TransportError> {
        let mut topics = self.topics.lock().await;
        let state = topics
            .get_mut(topic)
            .ok_or_else(|| TransportError::UnknownTopic(topic.to_string()))?;
        let receivers = state
            .receivers
            .take()
            .ok_or_else(|| TransportError::AlreadySubscribed(topic.to_string()))?;

        Ok(receivers
            .into_iter()
            .map(|rx| ReceiverStream::new(rx).map(Ok::<_, TransportError>).boxed())
            .collect())
    }
}

#[async_trait]
impl Publisher for MemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let partition = partition_for(key, self.partitions);
        let sender = {
            let topics = self.topics.lock().await;
            let state = topics
                .get(topic)
                .ok_or_else(|| TransportError::UnknownTopic(topic.to_string()))?;
            state.senders[partition].clone()
        };

        sender
            .send(payload)
            .await
            .map_err(|_| TransportError::PartitionClosed(partition))?;
        debug!(topic, key, partition, "published record");
        Ok(())
    }
}
