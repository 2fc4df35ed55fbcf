use super::{ProviderError, SmsMessage, SmsProvider};
use crate::config::TwilioConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

pub struct TwilioSmsProvider {
    config: TwilioConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct TwilioResponse {
    #[serde(default)]
    sid: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl TwilioSmsProvider {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl SmsProvider for TwilioSmsProvider {
    async fn send(&self, sms: &SmsMessage) -> Result<(), ProviderError> {
        if !self.config.enabled {
            return Err(ProviderError::Configuration(
                "Twilio SMS provider is not configured".to_string(),
            ));
        }

        if !sms.to.starts_with('+') {
            return Err(ProviderError::InvalidRecipient(format!(
                "Phone number is not in E.164 form: {}",
                sms.to
            )));
        }

        let url = format!(
            "{}/Accounts/{}/Messages.json",
            TWILIO_API_BASE, self.config.account_sid
        );

        let params = [
            ("To", sms.to.as_str()),
            ("From", self.config.from_number.as_str()),
            ("Body", sms.body.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                ProviderError::Connection(format!("Failed to connect to Twilio: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::SendFailed(format!(
                "Twilio API returned error status {}: {}",
                status, body
            )));
        }

        let twilio_response: TwilioResponse = response.json().await.map_err(|e| {
            ProviderError::SendFailed(format!("Failed to parse Twilio response: {}", e))
        })?;

        if let Some(sid) = &twilio_response.sid {
            tracing::info!(to = %sms.to, sid = %sid, "Verification SMS sent via Twilio");
        } else {
            return Err(ProviderError::SendFailed(format!(
                "Twilio error: {}",
                twilio_response.message.unwrap_or_default()
            )));
        }

        Ok(())
    }
}
