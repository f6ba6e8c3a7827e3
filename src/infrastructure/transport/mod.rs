//! Message transport seam, the in-process broker and Redis Streams

mod broker;
mod redis_streams;

pub use broker::{MemoryBroker, DEFAULT_PARTITIONS};
pub use redis_streams::RedisStreamBroker;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::shared::errors::TransportError;

/// One partition's ordered stream of raw payloads
///
/// An `Err` item or the end of the stream means the partition is gone.
pub type PartitionStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Subscribe side of the broker
#[async_trait]
pub trait Transport: Send + Sync {
    /// One stream per partition of `topic`
    async fn subscribe(&self, topic: &str) -> Result<Vec<PartitionStream>, TransportError>;
}

/// Publish side of the broker
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), TransportError>;
}
