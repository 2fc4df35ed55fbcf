//! Contact verification model - an OTP challenge scoped to one contact
//! channel on one bin and role.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Role;

/// Delivery channel type for a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Email,
    Phone,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Email => "email",
            ChannelType::Phone => "phone",
        }
    }
}

/// OTP verification entity.
///
/// The numeric code itself is never stored; `code_hash` allows
/// verification without storage and `code_seed` allows the same code to be
/// re-derived (and re-sent) within the validity window.
#[derive(Debug, Clone, FromRow)]
pub struct ContactVerification {
    pub id: Uuid,
    pub contact_id: Option<Uuid>,
    pub bin_id: Uuid,
    pub role: String,
    pub contact_type: String,
    pub contact_value: String,
    pub code_hash: String,
    pub code_seed: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub user_agent: Option<String>,
    pub locale: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ContactVerification {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        contact_id: Uuid,
        bin_id: Uuid,
        role: Role,
        channel: ChannelType,
        contact_value: String,
        code_hash: String,
        code_seed: String,
        ttl_hours: i64,
        user_agent: Option<String>,
        locale: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            contact_id: Some(contact_id),
            bin_id,
            role: role.as_str().to_string(),
            contact_type: channel.as_str().to_string(),
            contact_value,
            code_hash,
            code_seed: Some(code_seed),
            expires_at: Utc::now() + Duration::hours(ttl_hours),
            consumed_at: None,
            attempts: 0,
            user_agent,
            locale,
            created_at: Utc::now(),
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn attempts_exhausted(&self, max: i32) -> bool {
        self.attempts >= max
    }
}
