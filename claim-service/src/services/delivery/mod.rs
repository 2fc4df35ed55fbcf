//! Outbound OTP delivery providers.
//!
//! Email and SMS are independent channels behind trait objects; claim-start
//! fans a code out to every resolved channel concurrently and succeeds as
//! long as at least one delivery lands.

pub mod email;
pub mod sms;

use async_trait::async_trait;
use service_core::error::AppError;
use std::sync::Mutex;
use thiserror::Error;

pub use email::SmtpEmailProvider;
pub use sms::TwilioSmsProvider;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct SmsMessage {
    pub to: String,
    pub body: String,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, email: &EmailMessage) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait SmsProvider: Send + Sync {
    async fn send(&self, sms: &SmsMessage) -> Result<(), ProviderError>;
}

/// Reduce fan-out delivery results with at-least-one-success semantics.
///
/// Partial failure is swallowed; total failure surfaces as a configuration
/// error when every channel was unconfigured, otherwise as a delivery
/// failure.
pub fn reduce_delivery_results(results: Vec<Result<(), ProviderError>>) -> Result<(), AppError> {
    if results.is_empty() {
        return Err(AppError::DeliveryFailed("No delivery targets".to_string()));
    }
    if results.iter().any(|r| r.is_ok()) {
        return Ok(());
    }
    let all_config = results
        .iter()
        .all(|r| matches!(r, Err(ProviderError::Configuration(_))));
    let detail = results
        .into_iter()
        .filter_map(|r| r.err())
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    if all_config {
        Err(AppError::ConfigError(anyhow::anyhow!("{}", detail)))
    } else {
        Err(AppError::DeliveryFailed(detail))
    }
}

/// Recording mock, for tests and local smoke runs.
#[derive(Default)]
pub struct MockEmailProvider {
    pub sent: Mutex<Vec<EmailMessage>>,
    pub fail: bool,
}

impl MockEmailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl EmailProvider for MockEmailProvider {
    async fn send(&self, email: &EmailMessage) -> Result<(), ProviderError> {
        if self.fail {
            return Err(ProviderError::SendFailed("mock email failure".to_string()));
        }
        self.sent
            .lock()
            .map_err(|e| ProviderError::SendFailed(format!("mock mutex poisoned: {}", e)))?
            .push(email.clone());
        Ok(())
    }
}

/// Recording mock, for tests and local smoke runs.
#[derive(Default)]
pub struct MockSmsProvider {
    pub sent: Mutex<Vec<SmsMessage>>,
    pub fail: bool,
}

impl MockSmsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl SmsProvider for MockSmsProvider {
    async fn send(&self, sms: &SmsMessage) -> Result<(), ProviderError> {
        if self.fail {
            return Err(ProviderError::SendFailed("mock sms failure".to_string()));
        }
        self.sent
            .lock()
            .map_err(|e| ProviderError::SendFailed(format!("mock mutex poisoned: {}", e)))?
            .push(sms.clone());
        Ok(())
    }
}
