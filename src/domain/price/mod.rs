//! Price domain - rolling statistics and anomaly detection

mod rolling_window;
mod anomaly_classifier;
mod window_registry;

pub use rolling_window::{RollingWindow, DEFAULT_WINDOW_SIZE};
pub use anomaly_classifier::{AnomalyClassifier, DEFAULT_THRESHOLD};
pub use window_registry::{SharedWindow, WindowRegistry};

/// Detection configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub window_size: usize,
    pub z_threshold: f64,
    pub band_multiplier: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            z_threshold: DEFAULT_THRESHOLD,
            band_multiplier: DEFAULT_THRESHOLD,
        }
    }
}

impl DetectionConfig {
    pub fn classifier(&self) -> AnomalyClassifier {
        AnomalyClassifier::new(self.z_threshold, self.band_multiplier)
    }
}
