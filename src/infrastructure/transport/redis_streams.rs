//! Partitioned topics on Redis Streams
//!
//! Partition `n` of topic `t` is the stream `t:n`. Producers `XADD` the raw
//! payload under the `payload` field; each partition is consumed by its own
//! task issuing blocking `XREAD`s on a dedicated connection.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamRangeReply, StreamReadReply};
use redis::RedisResult;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use super::{PartitionStream, Publisher, Transport};
use crate::infrastructure::redis_link::{self, RedisLink};
use crate::shared::errors::TransportError;
use crate::shared::utils::partition_for;

const PAYLOAD_FIELD: &str = "payload";
const READ_BATCH: usize = 100;
const READ_BLOCK: Duration = Duration::from_secs(1);
const STREAM_MAX_LEN: usize = 100_000;
const RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const PARTITION_BUFFER: usize = 256;

pub struct RedisStreamBroker {
    link: RedisLink,
    partitions: usize,
    timeout: Duration,
}

impl RedisStreamBroker {
    pub async fn connect(url: &str, partitions: usize, timeout: Duration) -> Result<Self, TransportError> {
        let link = RedisLink::connect(url, timeout).await?;
        info!("📬 Stream broker at {} with {} partitions", url, partitions.max(1));
        Ok(Self {
            link,
            partitions: partitions.max(1),
            timeout,
        })
    }
}

fn stream_key(topic: &str, partition: usize) -> String {
    format!("{}:{}", topic, partition)
}

/// Id of the newest entry, so a fresh subscriber only sees later records
async fn latest_id(conn: &mut MultiplexedConnection, key: &str) -> RedisResult<String> {
    let reply: StreamRangeReply = redis::cmd("XREVRANGE")
        .arg(key)
        .arg("+")
        .arg("-")
        .arg("COUNT")
        .arg(1)
        .query_async(conn)
        .await?;
    Ok(reply
        .ids
        .first()
        .map(|entry| entry.id.clone())
        .unwrap_or_else(|| "0-0".to_string()))
}

async fn read_after(conn: &mut MultiplexedConnection, key: &str, last_id: &str) -> RedisResult<Option<StreamReadReply>> {
    redis::cmd("XREAD")
        .arg("COUNT")
        .arg(READ_BATCH)
        .arg("BLOCK")
        .arg(READ_BLOCK.as_millis() as u64)
        .arg("STREAMS")
        .arg(key)
        .arg(last_id)
        .query_async(conn)
        .await
}

/// Forward one partition into `tx` until the receiver goes away or the
/// broker stays unreachable
async fn consume_partition(
    client: redis::Client,
    mut conn: MultiplexedConnection,
    key: String,
    mut last_id: String,
    timeout: Duration,
    tx: mpsc::Sender<Result<Vec<u8>, TransportError>>,
) {
    let mut failures = 0;
    while !tx.is_closed() {
        let reply = match read_after(&mut conn, &key, &last_id).await {
            Ok(reply) => {
                failures = 0;
                reply
            }
            Err(e) => {
                failures += 1;
                if failures > RECONNECT_ATTEMPTS || !redis_link::is_connection_error(&e) {
                    error!("❌ Reading {} failed: {}", key, e);
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
                warn!("Reading {} failed ({}), reconnecting", key, e);
                tokio::time::sleep(RECONNECT_DELAY).await;
                match redis_link::open(&client, timeout).await {
                    Ok(fresh) => conn = fresh,
                    Err(e) => warn!("Reconnect for {} failed: {}", key, e),
                }
                continue;
            }
        };

        let Some(reply) = reply else { continue };
        for stream in reply.keys {
            for entry in stream.ids {
                last_id = entry.id.clone();
                match entry.get::<Vec<u8>>(PAYLOAD_FIELD) {
                    Some(payload) => {
                        if tx.send(Ok(payload)).await.is_err() {
                            return;
                        }
                    }
                    None => warn!("⚠️ Entry {} on {} has no payload field, skipping", entry.id, key),
                }
            }
        }
    }
    debug!("Consumer for {} stopped", key);
}

#[async_trait]
impl Transport for RedisStreamBroker {
    async fn subscribe(&self, topic: &str) -> Result<Vec<PartitionStream>, TransportError> {
        let mut streams: Vec<PartitionStream> = Vec::with_capacity(self.partitions);
        for partition in 0..self.partitions {
            let key = stream_key(topic, partition);
            // Blocking reads would stall the shared connection
            let mut conn = redis_link::open(self.link.client(), self.timeout).await?;
            let last_id = latest_id(&mut conn, &key).await?;

            let (tx, rx) = mpsc::channel(PARTITION_BUFFER);
            tokio::spawn(consume_partition(
                self.link.client().clone(),
                conn,
                key,
                last_id,
                self.timeout,
                tx,
            ));
            streams.push(ReceiverStream::new(rx).boxed());
        }
        Ok(streams)
    }
}

#[async_trait]
impl Publisher for RedisStreamBroker {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let partition = partition_for(key, self.partitions);
        let stream = stream_key(topic, partition);
        let id = self
            .link
            .run(|mut conn: MultiplexedConnection| {
                let stream = stream.as_str();
                let payload = payload.as_slice();
                async move {
                    let id: String = redis::cmd("XADD")
                        .arg(stream)
                        .arg("MAXLEN")
                        .arg("~")
                        .arg(STREAM_MAX_LEN)
                        .arg("*")
                        .arg(PAYLOAD_FIELD)
                        .arg(payload)
                        .query_async(&mut conn)
                        .await?;
                    Ok::<_, redis::RedisError>(id)
                }
            })
            .await
            .map_err(|e| TransportError::PublishFailed(e.to_string()))?;
        debug!(topic, key, partition, id = %id, "published record");
        Ok(())
    }
}
