//! Polls the price APIs and publishes observations to the broker

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use reqwest::Client;
use tracing::{debug, error, info, warn};

use super::sources::PriceSource;
use crate::infrastructure::transport::Publisher;
use crate::shared::errors::FetchError;
use crate::shared::types::PriceObservation;

/// HTTP client for the configured price APIs
#[derive(Clone)]
pub struct PriceFetcher {
    client: Client,
}

impl PriceFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| FetchError::Http {
            source_name: "client".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, source: PriceSource) -> Result<PriceObservation, FetchError> {
        let http_err = |e: reqwest::Error| FetchError::Http {
            source_name: source.name().to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(source.url()).send().await.map_err(http_err)?;
        let body = response
            .error_for_status()
            .map_err(http_err)?
            .bytes()
            .await
            .map_err(http_err)?;

        source.parse(&body, Utc::now())
    }

    /// Fetch every source concurrently, dropping failures
    pub async fn fetch_all(&self, sources: &[PriceSource]) -> Vec<PriceObservation> {
        let results = join_all(sources.iter().map(|source| self.fetch(*source))).await;
        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(observation) => Some(observation),
                Err(e) => {
                    warn!("❌ API fetch error: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// Interval loop feeding the broker
pub struct PricePoller {
    fetcher: PriceFetcher,
    publisher: Arc<dyn Publisher>,
    topic: String,
    sources: Vec<PriceSource>,
    interval: Duration,
}

impl PricePoller {
    pub fn new(
        fetcher: PriceFetcher,
        publisher: Arc<dyn Publisher>,
        topic: impl Into<String>,
        sources: Vec<PriceSource>,
        interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            publisher,
            topic: topic.into(),
            sources,
            interval,
        }
    }

    /// Publish a batch of observations keyed by source, returns how many were published
    pub async fn publish_all(&self, observations: &[PriceObservation]) -> usize {
        let mut published = 0;
        for observation in observations {
            let payload = match observation.to_json() {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to encode observation: {}", e);
                    continue;
                }
            };
            match self.publisher.publish(&self.topic, observation.source(), payload).await {
                Ok(()) => published += 1,
                Err(e) => error!("Failed to publish {} observation: {}", observation.source(), e),
            }
        }
        published
    }

    /// Runs until the task is aborted
    pub async fn run(self) {
        info!(
            "🔄 Polling {} sources every {:?}",
            self.sources.len(),
            self.interval
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let observations = self.fetcher.fetch_all(&self.sources).await;
            let published = self.publish_all(&observations).await;
            debug!(published, "poll cycle complete");
        }
    }
}
