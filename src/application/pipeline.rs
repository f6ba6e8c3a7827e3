//! Anomaly detection pipeline: window update, classification, gated alerting

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::alert::{AlertMessage, Notifier, RateLimiter};
use crate::domain::price::{AnomalyClassifier, DetectionConfig, WindowRegistry};
use crate::infrastructure::transport::{PartitionStream, Transport};
use crate::shared::errors::TransportError;
use crate::shared::types::{AnomalyEvent, PriceObservation};

/// Pipeline counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub observations_processed: u64,
    pub malformed_dropped: u64,
    pub anomalies_detected: u64,
    pub alerts_sent: u64,
    pub alerts_suppressed: u64,
    pub dispatch_failures: u64,
    pub record_failures: u64,
}

/// What happened to one observation
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// No anomaly
    Normal,
    /// Anomaly found but the source is cooling down, or the store is unreachable
    Suppressed(AnomalyEvent),
    Alerted(AlertMessage),
    /// Anomaly passed the gate but the notifier failed
    DispatchFailed(AlertMessage),
}

/// Routes observations through per-source windows and raises gated alerts
///
/// One alert per anomalous observation: when both tests fire the alert carries
/// the combined label. The cooldown is recorded before dispatch, so a failed
/// send still starts the cooldown.
pub struct AnomalyPipeline {
    registry: WindowRegistry,
    classifier: AnomalyClassifier,
    rate_limiter: RateLimiter,
    notifier: Arc<dyn Notifier>,
    stats: RwLock<PipelineStats>,
}

impl AnomalyPipeline {
    pub fn new(config: &DetectionConfig, rate_limiter: RateLimiter, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            registry: WindowRegistry::new(config.window_size),
            classifier: config.classifier(),
            rate_limiter,
            notifier,
            stats: RwLock::new(PipelineStats::default()),
        }
    }

    pub fn registry(&self) -> &WindowRegistry {
        &self.registry
    }

    pub async fn get_stats(&self) -> PipelineStats {
        self.stats.read().await.clone()
    }

    pub async fn process(&self, observation: &PriceObservation) -> ProcessOutcome {
        self.process_at(observation, Utc::now()).await
    }

    /// Process one observation with `now` as the rate limiter clock
    pub async fn process_at(&self, observation: &PriceObservation, now: DateTime<Utc>) -> ProcessOutcome {
        let event = self.detect(observation).await;
        self.stats.write().await.observations_processed += 1;

        let Some(alert) = AlertMessage::from_event(&event) else {
            return ProcessOutcome::Normal;
        };
        self.stats.write().await.anomalies_detected += 1;
        info!(
            source = %event.source,
            z_score = event.z_score_anomaly,
            band = event.band_anomaly,
            "⚠️ {} anomaly at price {:.2}",
            alert.anomaly_type,
            event.price
        );

        if !self.rate_limiter.can_send(&event.source, now).await {
            debug!(source = %event.source, "alert suppressed");
            self.stats.write().await.alerts_suppressed += 1;
            return ProcessOutcome::Suppressed(event);
        }

        if let Err(e) = self.rate_limiter.record_sent(&event.source, now).await {
            // the check just passed, send anyway; the next check fails closed if the store stays down
            warn!(source = %event.source, error = %e, "failed to record alert send");
            self.stats.write().await.record_failures += 1;
        }

        match self.notifier.send(&alert).await {
            Ok(()) => {
                self.stats.write().await.alerts_sent += 1;
                ProcessOutcome::Alerted(alert)
            }
            Err(e) => {
                error!(
                    source = %alert.source,
                    notifier = self.notifier.name(),
                    "Error sending alert: {}",
                    e
                );
                self.stats.write().await.dispatch_failures += 1;
                ProcessOutcome::DispatchFailed(alert)
            }
        }
    }

    /// Decode and process a raw transport payload; malformed records are dropped
    pub async fn handle_payload(&self, payload: &[u8]) -> Option<ProcessOutcome> {
        match PriceObservation::from_json(payload) {
            Ok(observation) => Some(self.process(&observation).await),
            Err(e) => {
                warn!("❌ Failed to decode message: {}", e);
                self.stats.write().await.malformed_dropped += 1;
                None
            }
        }
    }

    /// Subscribe to `topic` and spawn one delivery task per partition
    pub async fn start(
        self: Arc<Self>,
        transport: &dyn Transport,
        topic: &str,
    ) -> Result<Vec<JoinHandle<()>>, TransportError> {
        let partitions = transport.subscribe(topic).await?;
        info!("🚀 Consuming {} with {} partitions", topic, partitions.len());

        Ok(partitions
            .into_iter()
            .enumerate()
            .map(|(partition, stream)| tokio::spawn(Arc::clone(&self).consume(partition, stream)))
            .collect())
    }

    async fn consume(self: Arc<Self>, partition: usize, mut stream: PartitionStream) {
        while let Some(item) = stream.next().await {
            match item {
                Ok(payload) => {
                    self.handle_payload(&payload).await;
                }
                Err(e) => {
                    error!(partition, "delivery path failed: {}", e);
                    return;
                }
            }
        }
        info!(partition, "partition stream ended");
    }

    /// Append to the source's window and classify while holding its lock
    async fn detect(&self, observation: &PriceObservation) -> AnomalyEvent {
        let window = self.registry.get_or_create(observation.source()).await;
        let mut window = window.lock().await;
        window.add_price(observation.price());
        self.classifier.classify(
            observation.source(),
            observation.price(),
            observation.timestamp(),
            &window,
        )
    }
}
