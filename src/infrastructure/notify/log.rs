//! Dry-run notifier

use async_trait::async_trait;
use tracing::warn;

use crate::domain::alert::{AlertMessage, Notifier};
use crate::shared::errors::NotifyError;

/// Logs alerts instead of sending them
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, alert: &AlertMessage) -> Result<(), NotifyError> {
        warn!(alert_id = %alert.id, source = %alert.source, "{}", alert.body());
        Ok(())
    }
}
