//! Persistence gateway.
//!
//! All row access goes through the [`Store`] trait. Guarded writes (the
//! compare-and-set updates the claim flows depend on) return `bool`: `true`
//! when the guarded row was actually written, `false` when someone else got
//! there first. Callers treat `false` as "already handled", never as an
//! error, except where consuming a one-shot credential - there `false`
//! means the credential was already spent.

mod memory;
mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{Bin, BinMembership, ClaimContact, ClaimToken, ContactVerification, User, WebAuthnCredential};

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<(), AppError>;

    // ==================== Bins ====================

    async fn insert_bin(&self, bin: &Bin) -> Result<(), AppError>;
    async fn insert_bin_token(&self, token: &str, bin_id: Uuid) -> Result<(), AppError>;
    async fn bin_id_by_token(&self, token: &str) -> Result<Option<Uuid>, AppError>;

    // ==================== Claim contacts ====================

    async fn insert_claim_contact(&self, contact: &ClaimContact) -> Result<(), AppError>;
    async fn claim_contact_by_id(&self, id: Uuid) -> Result<Option<ClaimContact>, AppError>;
    async fn claim_contacts_for_bin_role(
        &self,
        bin_id: Uuid,
        role: &str,
    ) -> Result<Vec<ClaimContact>, AppError>;

    /// Attach a phone to a contact row, guarded by `activated_at IS NULL`.
    async fn attach_phone_if_inactive(&self, contact_id: Uuid, phone: &str)
        -> Result<bool, AppError>;

    /// Delete a contact row, guarded by `activated_at IS NULL`.
    async fn delete_contact_if_inactive(&self, contact_id: Uuid) -> Result<bool, AppError>;

    /// Set `activated_at`/`activated_user_id`, guarded by `activated_at IS NULL`.
    async fn activate_contact_if_inactive(
        &self,
        contact_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, AppError>;

    /// Inactive contacts for `role` on any bin carrying `email` or `phone`,
    /// excluding `exclude_id`. Pooled-activation matching.
    async fn inactive_contacts_matching(
        &self,
        role: &str,
        email: Option<&str>,
        phone: Option<&str>,
        exclude_id: Uuid,
    ) -> Result<Vec<ClaimContact>, AppError>;

    // ==================== Verifications ====================

    async fn insert_verification(&self, v: &ContactVerification) -> Result<(), AppError>;
    async fn find_verification(&self, id: Uuid) -> Result<Option<ContactVerification>, AppError>;

    /// Unconsumed, unexpired verifications for one contact.
    async fn active_verifications_for_contact(
        &self,
        contact_id: Uuid,
    ) -> Result<Vec<ContactVerification>, AppError>;

    /// Most recent verifications for a bin, newest first.
    async fn recent_verifications_for_bin(
        &self,
        bin_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ContactVerification>, AppError>;

    /// Re-seed a verification row (legacy upgrade or seed alignment):
    /// replaces seed and hash, resets attempts, extends expiry. Guarded by
    /// `consumed_at IS NULL`.
    async fn reseed_verification(
        &self,
        id: Uuid,
        seed: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn increment_verification_attempts(&self, id: Uuid) -> Result<(), AppError>;

    /// Consume exactly once: guarded by `consumed_at IS NULL`.
    async fn consume_verification(&self, id: Uuid) -> Result<bool, AppError>;

    // ==================== Principals & memberships ====================

    async fn insert_user(&self, user: &User) -> Result<(), AppError>;

    /// Idempotent upsert keyed on (bin_id, user_id, role).
    async fn upsert_membership(&self, bin_id: Uuid, user_id: Uuid, role: &str)
        -> Result<(), AppError>;
    async fn membership_exists(
        &self,
        bin_id: Uuid,
        user_id: Uuid,
        role: &str,
    ) -> Result<bool, AppError>;
    async fn members_for_bin_role(&self, bin_id: Uuid, role: &str) -> Result<Vec<Uuid>, AppError>;
    async fn memberships_for_user(&self, user_id: Uuid) -> Result<Vec<BinMembership>, AppError>;

    // ==================== Claim tokens ====================

    async fn insert_claim_token(&self, claim: &ClaimToken) -> Result<(), AppError>;
    async fn find_claim_token(&self, token: &str) -> Result<Option<ClaimToken>, AppError>;

    /// Mark used exactly once: guarded by `used_at IS NULL`.
    async fn mark_claim_used(&self, token: &str) -> Result<bool, AppError>;

    // ==================== WebAuthn credentials ====================

    async fn insert_credential(&self, credential: &WebAuthnCredential) -> Result<(), AppError>;
    async fn credentials_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<WebAuthnCredential>, AppError>;
    async fn credentials_for_users(
        &self,
        user_ids: &[Uuid],
    ) -> Result<Vec<WebAuthnCredential>, AppError>;
    async fn find_credential_by_cred_id(
        &self,
        credential_id: &str,
    ) -> Result<Option<WebAuthnCredential>, AppError>;
    async fn count_credentials_for_user(&self, user_id: Uuid) -> Result<i64, AppError>;
    async fn update_credential_passkey(
        &self,
        credential_id: &str,
        passkey: &serde_json::Value,
    ) -> Result<(), AppError>;
}
