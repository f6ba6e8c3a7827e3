//! Price Sentinel - streaming price anomaly detection with rate-limited alerts
//! Built with Domain-Driven Design principles

pub mod app;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod shared;

// Re-export main types for convenience
pub use application::{AnomalyPipeline, PipelineStats, ProcessOutcome};
pub use domain::alert::{AlertMessage, Notifier, RateLimiter, SuppressionStore};
pub use domain::price::{AnomalyClassifier, DetectionConfig, RollingWindow, WindowRegistry};
pub use shared::types::{AnomalyEvent, AnomalyKind, PriceObservation};
