//! Anomaly classification against a rolling window

use chrono::{DateTime, Utc};

use super::rolling_window::RollingWindow;
use crate::shared::types::AnomalyEvent;

/// Default number of standard deviations before a price is anomalous
pub const DEFAULT_THRESHOLD: f64 = 2.0;

/// Z-score and Bollinger band tests over a window's own statistics
///
/// Both tests share the multiplier today but are reported separately.
#[derive(Debug, Clone, Copy)]
pub struct AnomalyClassifier {
    z_threshold: f64,
    band_multiplier: f64,
}

impl AnomalyClassifier {
    pub fn new(z_threshold: f64, band_multiplier: f64) -> Self {
        Self {
            z_threshold,
            band_multiplier,
        }
    }

    /// Returns `(z_score_anomaly, band_anomaly)`
    ///
    /// The window is expected to already contain `price`.
    pub fn check(&self, price: f64, window: &RollingWindow) -> (bool, bool) {
        if window.len() < 2 {
            return (false, false);
        }

        let mean = window.mean();
        let std_dev = window.standard_deviation();

        let is_z_anomaly = std_dev > 0.0 && ((price - mean) / std_dev).abs() > self.z_threshold;

        let upper_band = mean + self.band_multiplier * std_dev;
        let lower_band = mean - self.band_multiplier * std_dev;
        let is_band_anomaly = price > upper_band || price < lower_band;

        (is_z_anomaly, is_band_anomaly)
    }

    pub fn classify(
        &self,
        source: &str,
        price: f64,
        timestamp: DateTime<Utc>,
        window: &RollingWindow,
    ) -> AnomalyEvent {
        let (z_score_anomaly, band_anomaly) = self.check(price, window);
        AnomalyEvent {
            source: source.to_string(),
            price,
            timestamp,
            z_score_anomaly,
            band_anomaly,
        }
    }
}

impl Default for AnomalyClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_THRESHOLD)
    }
}
