// src/app.rs
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::application::AnomalyPipeline;
use crate::config::Config;
use crate::domain::alert::{Notifier, RateLimiter, SuppressionStore};
use crate::domain::price::DetectionConfig;
use crate::infrastructure::fetchers::{PriceFetcher, PricePoller, PriceSource};
use crate::infrastructure::notify::{LogNotifier, TwilioConfig, TwilioNotifier};
use crate::infrastructure::store::{MemoryStore, RedisStore};
use crate::infrastructure::transport::{MemoryBroker, Publisher, RedisStreamBroker, Transport};

const REDIS_CONNECT_ATTEMPTS: u32 = 10;
const BROKER_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportBackend {
    Memory,
    RedisStreams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierKind {
    Twilio,
    Log,
}

#[derive(Debug, Clone)]
pub struct AppCfg {
    pub detection: DetectionConfig,
    pub cooldown: Duration,
    pub notifier: NotifierKind,
    pub transport_backend: TransportBackend,
    pub broker_url: String,
    pub topic: String,
    pub partitions: usize,
    pub store_backend: StoreBackend,
    pub store_url: String,
    pub store_timeout: Duration,
    pub twilio: TwilioConfig,
    pub fetchers_enabled: bool,
    pub sources: Vec<PriceSource>,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
}

impl AppCfg {
    pub fn from_config(cfg: Config) -> Result<Self> {
        cfg.validate()?;

        let store_backend = match cfg.store.backend.to_ascii_lowercase().as_str() {
            "redis" => StoreBackend::Redis,
            "memory" => StoreBackend::Memory,
            other => anyhow::bail!("unknown store backend: {}", other),
        };
        let transport_backend = match cfg.transport.backend.to_ascii_lowercase().as_str() {
            "memory" => TransportBackend::Memory,
            "redis-streams" => TransportBackend::RedisStreams,
            other => anyhow::bail!("unknown transport backend: {}", other),
        };
        let notifier = match cfg.alerts.notifier.to_ascii_lowercase().as_str() {
            "twilio" => NotifierKind::Twilio,
            "log" => NotifierKind::Log,
            other => anyhow::bail!("unknown notifier: {}", other),
        };
        let sources = cfg
            .fetchers
            .sources
            .iter()
            .map(|s| s.parse::<PriceSource>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            detection: DetectionConfig {
                window_size: cfg.detection.window_size,
                z_threshold: cfg.detection.z_threshold,
                band_multiplier: cfg.detection.band_multiplier,
            },
            cooldown: Duration::from_secs(cfg.alerts.cooldown_secs),
            notifier,
            transport_backend,
            broker_url: cfg.transport.broker_url,
            topic: cfg.transport.topic,
            partitions: cfg.transport.partitions,
            store_backend,
            store_url: cfg.store.url,
            store_timeout: Duration::from_millis(cfg.store.timeout_ms),
            twilio: TwilioConfig {
                account_sid: cfg.twilio.account_sid,
                auth_token: cfg.twilio.auth_token,
                from_phone: cfg.twilio.from_phone,
                to_phone: cfg.twilio.to_phone,
                api_base: cfg.twilio.api_base,
                timeout: Duration::from_millis(cfg.twilio.timeout_ms),
            },
            fetchers_enabled: cfg.fetchers.enabled,
            sources,
            poll_interval: Duration::from_millis(cfg.fetchers.interval_ms),
            fetch_timeout: Duration::from_millis(cfg.fetchers.timeout_ms),
        })
    }
}

async fn connect_store(cfg: &AppCfg) -> Result<Arc<dyn SuppressionStore>> {
    match cfg.store_backend {
        StoreBackend::Memory => {
            warn!("Using in-memory suppression store, cooldowns will not survive restarts");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Redis => {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match RedisStore::connect(&cfg.store_url, cfg.store_timeout).await {
                    Ok(store) => return Ok(Arc::new(store)),
                    Err(e) if attempt < REDIS_CONNECT_ATTEMPTS => {
                        warn!("Waiting for Redis... {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                    Err(e) => {
                        return Err(e).with_context(|| format!("connect to redis at {}", cfg.store_url))
                    }
                }
            }
        }
    }
}

async fn connect_transport(cfg: &AppCfg) -> Result<(Arc<dyn Transport>, Arc<dyn Publisher>)> {
    match cfg.transport_backend {
        TransportBackend::Memory => {
            let broker = Arc::new(MemoryBroker::new(cfg.partitions));
            broker.create_topic(&cfg.topic).await;
            let transport: Arc<dyn Transport> = broker.clone();
            let publisher: Arc<dyn Publisher> = broker;
            Ok((transport, publisher))
        }
        TransportBackend::RedisStreams => {
            let broker = Arc::new(
                RedisStreamBroker::connect(&cfg.broker_url, cfg.partitions, BROKER_CONNECT_TIMEOUT)
                    .await
                    .with_context(|| format!("connect to broker at {}", cfg.broker_url))?,
            );
            let transport: Arc<dyn Transport> = broker.clone();
            let publisher: Arc<dyn Publisher> = broker;
            Ok((transport, publisher))
        }
    }
}

fn build_notifier(cfg: &AppCfg) -> Result<Arc<dyn Notifier>> {
    match cfg.notifier {
        NotifierKind::Twilio => Ok(Arc::new(
            TwilioNotifier::new(cfg.twilio.clone()).context("configure twilio notifier")?,
        )),
        NotifierKind::Log => Ok(Arc::new(LogNotifier)),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

pub async fn run(cfg: AppCfg) -> Result<()> {
    info!("🚀 Starting Price Sentinel");
    info!(
        "📊 Window: {} | z-threshold: {} | band: {}σ | cooldown: {:?}",
        cfg.detection.window_size, cfg.detection.z_threshold, cfg.detection.band_multiplier, cfg.cooldown
    );

    let store = connect_store(&cfg).await?;
    let notifier = build_notifier(&cfg)?;
    info!("📨 Notifier: {}", notifier.name());

    let rate_limiter = RateLimiter::new(store, cfg.cooldown, cfg.store_timeout);
    let pipeline = Arc::new(AnomalyPipeline::new(&cfg.detection, rate_limiter, notifier));

    let (transport, publisher) = connect_transport(&cfg).await?;

    let mut tasks = Arc::clone(&pipeline)
        .start(transport.as_ref(), &cfg.topic)
        .await
        .context("subscribe to transport")?;

    if cfg.fetchers_enabled {
        let fetcher = PriceFetcher::new(cfg.fetch_timeout)?;
        let poller = PricePoller::new(
            fetcher,
            publisher,
            cfg.topic.clone(),
            cfg.sources.clone(),
            cfg.poll_interval,
        );
        tasks.push(tokio::spawn(poller.run()));
    } else {
        info!("📥 Fetchers disabled, consuming {} from {}", cfg.topic, cfg.broker_url);
    }

    shutdown_signal().await;
    info!("🛑 Stopping");

    for task in &tasks {
        task.abort();
    }
    for task in tasks {
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                error!("Task ended abnormally: {}", e);
            }
        }
    }

    let stats = pipeline.get_stats().await;
    info!(
        "📈 Processed: {} | malformed: {} | anomalies: {} | sent: {} | suppressed: {} | failed: {} | unrecorded: {}",
        stats.observations_processed,
        stats.malformed_dropped,
        stats.anomalies_detected,
        stats.alerts_sent,
        stats.alerts_suppressed,
        stats.dispatch_failures,
        stats.record_failures
    );
    Ok(())
}
