//! Per-source alert suppression backed by a [`SuppressionStore`]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::SuppressionStore;
use crate::shared::errors::StoreError;
use crate::shared::utils::{format_timestamp, parse_timestamp};

/// Minimum time between two alerts for the same source
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Upper bound on a single store round trip
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Cooldown gate keyed by source
///
/// `can_send` and `record_sent` are separate calls, so two concurrent checks
/// for one source can both pass before either records. A duplicate SMS in
/// that window is accepted; the store does not provide compare-and-set.
pub struct RateLimiter {
    store: Arc<dyn SuppressionStore>,
    cooldown: Duration,
    timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SuppressionStore>, cooldown: Duration, timeout: Duration) -> Self {
        Self {
            store,
            cooldown,
            timeout,
        }
    }

    pub fn with_defaults(store: Arc<dyn SuppressionStore>) -> Self {
        Self::new(store, DEFAULT_COOLDOWN, DEFAULT_STORE_TIMEOUT)
    }

    pub fn key(source: &str) -> String {
        format!("last_alert:{}", source)
    }

    /// Whether an alert for `source` may be sent at `now`
    ///
    /// Fails closed: any store failure suppresses the alert.
    pub async fn can_send(&self, source: &str, now: DateTime<Utc>) -> bool {
        match self.last_sent(source).await {
            Ok(None) => true,
            Ok(Some(last)) => match (now - last).to_std() {
                Ok(elapsed) => elapsed >= self.cooldown,
                // last alert recorded in the future, clock skew between hosts
                Err(_) => false,
            },
            Err(e) => {
                warn!(source, error = %e, "suppression store check failed, suppressing alert");
                false
            }
        }
    }

    /// Persist `now` as the last alert time for `source`, expiring after the cooldown
    pub async fn record_sent(&self, source: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let key = Self::key(source);
        let value = format_timestamp(now);
        tokio::time::timeout(self.timeout, self.store.set_with_ttl(&key, &value, self.cooldown))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))??;
        debug!(source, at = %value, "recorded alert send");
        Ok(())
    }

    async fn last_sent(&self, source: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let key = Self::key(source);
        let value = tokio::time::timeout(self.timeout, self.store.get(&key))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))??;

        match value {
            None => Ok(None),
            Some(value) => parse_timestamp(&value)
                .map(Some)
                .ok_or(StoreError::CorruptValue { key, value }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct DownStore;

    #[async_trait]
    impl SuppressionStore for DownStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    struct SlowStore;

    #[async_trait]
    impl SuppressionStore for SlowStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }

        async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_cooldown_window() {
        let limiter = RateLimiter::with_defaults(Arc::new(MemoryStore::new()));

        assert!(limiter.can_send("x", t0()).await);
        limiter.record_sent("x", t0()).await.unwrap();

        assert!(!limiter.can_send("x", t0() + chrono::Duration::seconds(29)).await);
        assert!(limiter.can_send("x", t0() + chrono::Duration::seconds(30)).await);
        assert!(limiter.can_send("x", t0() + chrono::Duration::seconds(31)).await);
    }

    #[tokio::test]
    async fn test_sources_do_not_share_cooldown() {
        let limiter = RateLimiter::with_defaults(Arc::new(MemoryStore::new()));
        limiter.record_sent("binance", t0()).await.unwrap();
        assert!(limiter.can_send("kraken", t0()).await);
    }

    #[tokio::test]
    async fn test_can_send_does_not_record() {
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::with_defaults(store.clone());
        assert!(limiter.can_send("x", t0()).await);
        assert!(limiter.can_send("x", t0()).await);
        assert_eq!(store.get("last_alert:x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_record_writes_rfc3339_under_key() {
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::with_defaults(store.clone());
        limiter.record_sent("binance", t0()).await.unwrap();

        let value = store.get("last_alert:binance").await.unwrap().unwrap();
        assert_eq!(parse_timestamp(&value), Some(t0()));
    }

    #[tokio::test]
    async fn test_fails_closed_when_store_down() {
        let limiter = RateLimiter::with_defaults(Arc::new(DownStore));
        assert!(!limiter.can_send("x", t0()).await);
        assert!(limiter.record_sent("x", t0()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_closed_on_timeout() {
        let limiter = RateLimiter::new(Arc::new(SlowStore), DEFAULT_COOLDOWN, Duration::from_millis(50));
        assert!(!limiter.can_send("x", t0()).await);
        assert!(matches!(
            limiter.record_sent("x", t0()).await,
            Err(StoreError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_value_suppresses() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_with_ttl("last_alert:x", "not-a-time", Duration::from_secs(30))
            .await
            .unwrap();
        let limiter = RateLimiter::with_defaults(store);
        assert!(!limiter.can_send("x", t0()).await);
    }

    #[tokio::test]
    async fn test_future_record_suppresses() {
        let limiter = RateLimiter::with_defaults(Arc::new(MemoryStore::new()));
        limiter.record_sent("x", t0() + chrono::Duration::seconds(5)).await.unwrap();
        assert!(!limiter.can_send("x", t0()).await);
    }
}
