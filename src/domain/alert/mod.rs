//! Alert domain - message construction, rate limiting and the outbound seams

mod rate_limiter;

pub use rate_limiter::{RateLimiter, DEFAULT_COOLDOWN, DEFAULT_STORE_TIMEOUT};

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::shared::errors::{NotifyError, StoreError};
use crate::shared::types::AnomalyEvent;
use crate::shared::utils::{format_price, generate_id};

/// Key-value store with per-key expiry holding last-alert timestamps
#[async_trait]
pub trait SuppressionStore: Send + Sync {
    /// `Ok(None)` when the key does not exist or has expired
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
}

/// Outbound alert channel
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, alert: &AlertMessage) -> Result<(), NotifyError>;
}

/// A single alert ready for dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    pub id: String,
    pub source: String,
    pub anomaly_type: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl AlertMessage {
    /// Build the combined alert for an event; `None` when nothing fired
    pub fn from_event(event: &AnomalyEvent) -> Option<Self> {
        let anomaly_type = event.label()?;
        Some(Self {
            id: generate_id(),
            source: event.source.clone(),
            anomaly_type,
            price: event.price,
            timestamp: event.timestamp,
        })
    }

    /// SMS text
    pub fn body(&self) -> String {
        format!(
            "🚨 {} API Alert: {} anomaly detected at price {}",
            self.source,
            self.anomaly_type,
            format_price(self.price)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(z: bool, band: bool) -> AnomalyEvent {
        AnomalyEvent {
            source: "binance".to_string(),
            price: 300.0,
            timestamp: Utc::now(),
            z_score_anomaly: z,
            band_anomaly: band,
        }
    }

    #[test]
    fn test_alert_body_format() {
        let alert = AlertMessage::from_event(&event(true, true)).unwrap();
        assert_eq!(
            alert.body(),
            "🚨 binance API Alert: Z-score + Bollinger band anomaly detected at price 300.00"
        );

        let alert = AlertMessage::from_event(&event(true, false)).unwrap();
        assert_eq!(
            alert.body(),
            "🚨 binance API Alert: Z-score anomaly detected at price 300.00"
        );
    }

    #[test]
    fn test_no_alert_without_anomaly() {
        assert!(AlertMessage::from_event(&event(false, false)).is_none());
    }

    #[test]
    fn test_alert_ids_are_unique() {
        let a = AlertMessage::from_event(&event(false, true)).unwrap();
        let b = AlertMessage::from_event(&event(false, true)).unwrap();
        assert_ne!(a.id, b.id);
    }
}
