//! Twilio SMS notifier

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::domain::alert::{AlertMessage, Notifier};
use crate::shared::errors::NotifyError;

/// Twilio account and phone numbers
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_phone: String,
    pub to_phone: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl TwilioConfig {
    pub fn validate(&self) -> Result<(), NotifyError> {
        if self.account_sid.is_empty() {
            return Err(NotifyError::MissingCredential("TWILIO_ACCOUNT_SID"));
        }
        if self.auth_token.is_empty() {
            return Err(NotifyError::MissingCredential("TWILIO_AUTH_TOKEN"));
        }
        if self.from_phone.is_empty() {
            return Err(NotifyError::MissingCredential("TWILIO_FROM_PHONE"));
        }
        if self.to_phone.is_empty() {
            return Err(NotifyError::MissingCredential("TWILIO_TO_PHONE"));
        }
        Ok(())
    }
}

/// Sends one SMS per alert through the Messages API
pub struct TwilioNotifier {
    config: TwilioConfig,
    client: Client,
}

impl TwilioNotifier {
    pub fn new(config: TwilioConfig) -> Result<Self, NotifyError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotifyError::RequestFailed(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    fn form(&self, alert: &AlertMessage) -> [(&'static str, String); 3] {
        [
            ("To", self.config.to_phone.clone()),
            ("From", self.config.from_phone.clone()),
            ("Body", alert.body()),
        ]
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn send(&self, alert: &AlertMessage) -> Result<(), NotifyError> {
        debug!(alert_id = %alert.id, "posting alert to twilio");
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&self.form(alert))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!("📨 Alert sent for {} api at price {:.2}", alert.source, alert.price);
        Ok(())
    }
}
