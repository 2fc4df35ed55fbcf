//! WebAuthn credential model - a passkey bound to one principal.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Stored passkey. `credential_id` is the authenticator credential id in
/// base64url; `passkey` is the full webauthn-rs `Passkey` as JSON,
/// including the public key and signature counter.
#[derive(Debug, Clone, FromRow)]
pub struct WebAuthnCredential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub credential_id: String,
    pub passkey: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl WebAuthnCredential {
    pub fn new(user_id: Uuid, credential_id: String, passkey: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            credential_id,
            passkey,
            created_at: Utc::now(),
        }
    }
}
