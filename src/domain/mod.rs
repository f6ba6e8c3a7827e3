//! Domain layer - core detection and alerting logic

pub mod alert;
pub mod price;
