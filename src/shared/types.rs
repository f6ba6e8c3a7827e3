//! Common types used across the application

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::errors::ObservationError;

/// One ingested price data point
///
/// Wire shape: `{"source": "...", "symbol": "...", "price": 1.0, "timestamp": "<RFC3339>"}`.
/// Fields are private so an observation can only be obtained through
/// validation and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawObservation")]
pub struct PriceObservation {
    source: String,
    symbol: String,
    price: f64,
    timestamp: DateTime<Utc>,
}

/// Unvalidated record as it comes off the wire
#[derive(Debug, Deserialize)]
struct RawObservation {
    source: String,
    symbol: String,
    price: f64,
    timestamp: DateTime<Utc>,
}

impl TryFrom<RawObservation> for PriceObservation {
    type Error = ObservationError;

    fn try_from(raw: RawObservation) -> Result<Self, Self::Error> {
        Self::new(raw.source, raw.symbol, raw.price, raw.timestamp)
    }
}

impl PriceObservation {
    pub fn new(
        source: impl Into<String>,
        symbol: impl Into<String>,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ObservationError> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(ObservationError::MissingSource);
        }
        if !price.is_finite() || price < 0.0 {
            return Err(ObservationError::InvalidPrice(price));
        }

        Ok(Self {
            source,
            symbol: symbol.into(),
            price,
            timestamp,
        })
    }

    /// Decode a transport payload
    pub fn from_json(payload: &[u8]) -> Result<Self, ObservationError> {
        serde_json::from_slice(payload).map_err(|e| ObservationError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ObservationError> {
        serde_json::to_vec(self).map_err(|e| ObservationError::Malformed(e.to_string()))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Kind of anomaly reported by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    ZScore,
    BollingerBand,
}

impl AnomalyKind {
    /// Label used in alert text
    pub fn label(&self) -> &'static str {
        match self {
            AnomalyKind::ZScore => "Z-score",
            AnomalyKind::BollingerBand => "Bollinger band",
        }
    }
}

/// Classification result for a single observation against its window
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyEvent {
    pub source: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub z_score_anomaly: bool,
    pub band_anomaly: bool,
}

impl AnomalyEvent {
    pub fn is_anomalous(&self) -> bool {
        self.z_score_anomaly || self.band_anomaly
    }

    /// Fired anomaly kinds, z-score first
    pub fn kinds(&self) -> Vec<AnomalyKind> {
        let mut kinds = Vec::with_capacity(2);
        if self.z_score_anomaly {
            kinds.push(AnomalyKind::ZScore);
        }
        if self.band_anomaly {
            kinds.push(AnomalyKind::BollingerBand);
        }
        kinds
    }

    /// Combined label, e.g. `Z-score + Bollinger band`. `None` when nothing fired.
    pub fn label(&self) -> Option<String> {
        let kinds = self.kinds();
        if kinds.is_empty() {
            return None;
        }
        Some(
            kinds
                .iter()
                .map(AnomalyKind::label)
                .collect::<Vec<_>>()
                .join(" + "),
        )
    }
}
