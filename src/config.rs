use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

use crate::domain::alert::{DEFAULT_COOLDOWN, DEFAULT_STORE_TIMEOUT};
use crate::domain::price::{DEFAULT_THRESHOLD, DEFAULT_WINDOW_SIZE};
use crate::infrastructure::transport::DEFAULT_PARTITIONS;
use crate::shared::errors::AppError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionCfg {
    pub window_size: usize,
    pub z_threshold: f64,
    pub band_multiplier: f64,
}

impl Default for DetectionCfg {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            z_threshold: DEFAULT_THRESHOLD,
            band_multiplier: DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertsCfg {
    pub cooldown_secs: u64,
    pub notifier: String, // "twilio" | "log"
}

impl Default for AlertsCfg {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_COOLDOWN.as_secs(),
            notifier: "twilio".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportCfg {
    pub backend: String, // "memory" | "redis-streams"
    pub broker_url: String,
    pub topic: String,
    pub partitions: usize,
}

impl Default for TransportCfg {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            broker_url: "redis://127.0.0.1:6379".to_string(),
            topic: "crypto-prices".to_string(),
            partitions: DEFAULT_PARTITIONS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreCfg {
    pub backend: String, // "redis" | "memory"
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for StoreCfg {
    fn default() -> Self {
        Self {
            backend: "redis".to_string(),
            url: "redis://127.0.0.1:6379".to_string(),
            timeout_ms: DEFAULT_STORE_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TwilioCfg {
    pub account_sid: String,
    pub auth_token: String,
    pub from_phone: String,
    pub to_phone: String,
    pub api_base: String,
    pub timeout_ms: u64,
}

impl Default for TwilioCfg {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            from_phone: String::new(),
            to_phone: String::new(),
            api_base: "https://api.twilio.com".to_string(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchersCfg {
    pub enabled: bool,
    pub sources: Vec<String>,
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for FetchersCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            sources: vec![
                "coingecko".to_string(),
                "binance".to_string(),
                "kraken".to_string(),
            ],
            interval_ms: 1000,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detection: DetectionCfg,
    pub alerts: AlertsCfg,
    pub transport: TransportCfg,
    pub store: StoreCfg,
    pub twilio: TwilioCfg,
    pub fetchers: FetchersCfg,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())
            .with_context(|| format!("read {}", path.as_ref().display()))?;
        Self::from_toml(&s)
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s).context("parse config toml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.detection.window_size == 0 {
            return Err(AppError::ConfigError("detection.window_size must be at least 1".to_string()));
        }
        for (name, value) in [
            ("detection.z_threshold", self.detection.z_threshold),
            ("detection.band_multiplier", self.detection.band_multiplier),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(AppError::ConfigError(format!("{} must be positive, got {}", name, value)));
            }
        }
        if self.transport.partitions == 0 {
            return Err(AppError::ConfigError("transport.partitions must be at least 1".to_string()));
        }
        if self.transport.topic.trim().is_empty() {
            return Err(AppError::ConfigError("transport.topic must not be empty".to_string()));
        }
        match self.transport.backend.to_ascii_lowercase().as_str() {
            // nothing outside the process can reach the in-process broker
            "memory" if !self.fetchers.enabled => {
                return Err(AppError::ConfigError(
                    "transport.backend = \"memory\" needs the built-in fetchers; use \"redis-streams\" to consume from external producers".to_string(),
                ));
            }
            "memory" => {}
            "redis-streams" => {
                if self.transport.broker_url.trim().is_empty() {
                    return Err(AppError::ConfigError("transport.broker_url must not be empty".to_string()));
                }
            }
            other => {
                return Err(AppError::ConfigError(format!("unknown transport backend: {}", other)));
            }
        }
        for (name, value) in [
            ("store.timeout_ms", self.store.timeout_ms),
            ("twilio.timeout_ms", self.twilio.timeout_ms),
            ("fetchers.interval_ms", self.fetchers.interval_ms),
            ("fetchers.timeout_ms", self.fetchers.timeout_ms),
        ] {
            if value == 0 {
                return Err(AppError::ConfigError(format!("{} must be greater than 0", name)));
            }
        }
        Ok(())
    }
}
