//! Redis-backed suppression store

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::domain::alert::SuppressionStore;
use crate::infrastructure::redis_link::RedisLink;
use crate::shared::errors::StoreError;

/// `GET` / `SET EX` over a shared connection that reconnects after drops
pub struct RedisStore {
    link: RedisLink,
}

impl RedisStore {
    /// Open a connection, bounded by `timeout`
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let link = RedisLink::connect(url, timeout).await?;
        Ok(Self { link })
    }
}

/// `SET EX` rejects 0, so sub-second TTLs round up to one second
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl SuppressionStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .link
            .run(|mut conn: MultiplexedConnection| async move {
                conn.get::<_, Option<String>>(key).await
            })
            .await?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let seconds = ttl_seconds(ttl);
        self.link
            .run(|mut conn: MultiplexedConnection| async move {
                conn.set_ex::<_, _, ()>(key, value, seconds).await
            })
            .await?;
        Ok(())
    }
}
