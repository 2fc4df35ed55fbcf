//! Claim token model - single-use bearer credential minted after OTP
//! redemption and exchanged for a passkey registration.

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sqlx::FromRow;
use uuid::Uuid;

use super::Role;

#[derive(Debug, Clone, FromRow)]
pub struct ClaimToken {
    pub token: String,
    pub user_id: Uuid,
    pub bin_token: String,
    pub role: String,
    pub contact_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl ClaimToken {
    pub fn new(
        user_id: Uuid,
        bin_token: String,
        role: Role,
        contact_id: Option<Uuid>,
        ttl_hours: i64,
    ) -> Self {
        Self {
            token: random_token(24),
            user_id,
            bin_token,
            role: role.as_str().to_string(),
            contact_id,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(ttl_hours),
            used_at: None,
        }
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Unguessable URL-safe token from `byte_len` random bytes.
pub fn random_token(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let a = random_token(24);
        let b = random_token(24);
        assert_ne!(a, b);
        assert!(a.len() >= 10);
        assert!(!a.contains('+') && !a.contains('/') && !a.contains('='));
    }

    #[test]
    fn fresh_claim_is_neither_used_nor_expired() {
        let claim = ClaimToken::new(Uuid::new_v4(), "bintoken1".into(), Role::Owner, None, 168);
        assert!(!claim.is_used());
        assert!(!claim.is_expired());
    }
}
