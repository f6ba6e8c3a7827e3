//! Shared Redis connection that survives server restarts

use std::future::Future;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{ErrorKind, RedisError, RedisResult};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// A multiplexed connection plus the client needed to replace it
///
/// A multiplexed connection is dead for good once its socket drops, so any
/// connection-level failure swaps in a fresh one and the command is retried
/// once.
pub struct RedisLink {
    client: redis::Client,
    connection: RwLock<MultiplexedConnection>,
    timeout: Duration,
}

impl RedisLink {
    /// Open the first connection, bounded by `timeout`
    pub async fn connect(url: &str, timeout: Duration) -> RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let connection = open(&client, timeout).await?;
        info!("✅ Redis connected: {}", url);
        Ok(Self {
            client,
            connection: RwLock::new(connection),
            timeout,
        })
    }

    pub fn client(&self) -> &redis::Client {
        &self.client
    }

    /// Run `op` on the shared connection, reconnecting once if it is gone
    pub async fn run<T, F, Fut>(&self, op: F) -> RedisResult<T>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let connection = self.connection.read().await.clone();
        match op(connection).await {
            Err(e) if is_connection_error(&e) => {
                warn!("Redis connection lost ({}), reconnecting", e);
                let connection = self.reconnect().await?;
                op(connection).await
            }
            other => other,
        }
    }

    async fn reconnect(&self) -> RedisResult<MultiplexedConnection> {
        let fresh = open(&self.client, self.timeout).await?;
        *self.connection.write().await = fresh.clone();
        info!("✅ Redis reconnected");
        Ok(fresh)
    }
}

/// Open a dedicated connection, bounded by `timeout`
pub async fn open(client: &redis::Client, timeout: Duration) -> RedisResult<MultiplexedConnection> {
    tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
        .await
        .map_err(|_| RedisError::from((ErrorKind::IoError, "redis connect timed out")))?
}

pub fn is_connection_error(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::redis_fake::FakeRedis;
    use redis::AsyncCommands;

    #[tokio::test]
    async fn test_reconnects_after_server_drops_connection() {
        let server = FakeRedis::start_dropping_first_connection().await;
        let link = RedisLink::connect(&server.url(), Duration::from_secs(2))
            .await
            .unwrap();

        let get = |mut conn: MultiplexedConnection| async move {
            conn.get::<_, Option<String>>("last_alert:binance").await
        };
        assert_eq!(link.run(get).await.unwrap(), None);

        // The first socket is closed by now; the link must recover on its own
        let mut result = link.run(get).await;
        for _ in 0..5 {
            if result.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            result = link.run(get).await;
        }
        assert_eq!(result.unwrap(), None);
        assert!(server.connections() >= 2);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = RedisLink::connect(&format!("redis://{}", addr), Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}
