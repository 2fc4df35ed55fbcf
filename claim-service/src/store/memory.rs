//! In-memory store for tests and local development.
//!
//! Mirrors the conditional-write semantics of the Postgres store; guarded
//! updates check their guard under the same lock that performs the write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::Store;
use crate::models::{Bin, BinMembership, ClaimContact, ClaimToken, ContactVerification, User, WebAuthnCredential};

#[derive(Default)]
struct Inner {
    bins: HashMap<Uuid, Bin>,
    bin_tokens: HashMap<String, Uuid>,
    contacts: Vec<ClaimContact>,
    verifications: Vec<ContactVerification>,
    users: HashMap<Uuid, User>,
    memberships: Vec<BinMembership>,
    claim_tokens: HashMap<String, ClaimToken>,
    credentials: Vec<WebAuthnCredential>,
}

/// In-memory [`Store`].
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Store mutex poisoned: {}", e)))
    }

    /// Test helper: rewrite a verification's expiry.
    pub fn set_verification_expiry(
        &self,
        id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if let Some(v) = inner.verifications.iter_mut().find(|v| v.id == id) {
            v.expires_at = expires_at;
        }
        Ok(())
    }

    /// Test helper: rewrite a claim token's expiry.
    pub fn set_claim_expiry(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if let Some(c) = inner.claim_tokens.get_mut(token) {
            c.expires_at = expires_at;
        }
        Ok(())
    }

    /// Test helper: drop a verification's seed, simulating a legacy row.
    pub fn clear_verification_seed(&self, id: Uuid) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if let Some(v) = inner.verifications.iter_mut().find(|v| v.id == id) {
            v.code_seed = None;
        }
        Ok(())
    }

    pub fn membership_count(&self) -> Result<usize, AppError> {
        Ok(self.lock()?.memberships.len())
    }
}

#[async_trait]
impl Store for MemStore {
    async fn ping(&self) -> Result<(), AppError> {
        self.lock().map(|_| ())
    }

    async fn insert_bin(&self, bin: &Bin) -> Result<(), AppError> {
        self.lock()?.bins.insert(bin.id, bin.clone());
        Ok(())
    }

    async fn insert_bin_token(&self, token: &str, bin_id: Uuid) -> Result<(), AppError> {
        self.lock()?.bin_tokens.insert(token.to_string(), bin_id);
        Ok(())
    }

    async fn bin_id_by_token(&self, token: &str) -> Result<Option<Uuid>, AppError> {
        Ok(self.lock()?.bin_tokens.get(token).copied())
    }

    async fn insert_claim_contact(&self, contact: &ClaimContact) -> Result<(), AppError> {
        self.lock()?.contacts.push(contact.clone());
        Ok(())
    }

    async fn claim_contact_by_id(&self, id: Uuid) -> Result<Option<ClaimContact>, AppError> {
        Ok(self.lock()?.contacts.iter().find(|c| c.id == id).cloned())
    }

    async fn claim_contacts_for_bin_role(
        &self,
        bin_id: Uuid,
        role: &str,
    ) -> Result<Vec<ClaimContact>, AppError> {
        Ok(self
            .lock()?
            .contacts
            .iter()
            .filter(|c| c.bin_id == bin_id && c.role == role)
            .cloned()
            .collect())
    }

    async fn attach_phone_if_inactive(
        &self,
        contact_id: Uuid,
        phone: &str,
    ) -> Result<bool, AppError> {
        let mut inner = self.lock()?;
        match inner
            .contacts
            .iter_mut()
            .find(|c| c.id == contact_id && c.activated_at.is_none())
        {
            Some(c) => {
                c.phone = Some(phone.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_contact_if_inactive(&self, contact_id: Uuid) -> Result<bool, AppError> {
        let mut inner = self.lock()?;
        let before = inner.contacts.len();
        inner
            .contacts
            .retain(|c| !(c.id == contact_id && c.activated_at.is_none()));
        Ok(inner.contacts.len() < before)
    }

    async fn activate_contact_if_inactive(
        &self,
        contact_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, AppError> {
        let mut inner = self.lock()?;
        match inner
            .contacts
            .iter_mut()
            .find(|c| c.id == contact_id && c.activated_at.is_none())
        {
            Some(c) => {
                c.activated_at = Some(Utc::now());
                c.activated_user_id = Some(user_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn inactive_contacts_matching(
        &self,
        role: &str,
        email: Option<&str>,
        phone: Option<&str>,
        exclude_id: Uuid,
    ) -> Result<Vec<ClaimContact>, AppError> {
        Ok(self
            .lock()?
            .contacts
            .iter()
            .filter(|c| {
                c.role == role
                    && c.id != exclude_id
                    && c.activated_at.is_none()
                    && ((email.is_some() && c.email.as_deref() == email)
                        || (phone.is_some() && c.phone.as_deref() == phone))
            })
            .cloned()
            .collect())
    }

    async fn insert_verification(&self, v: &ContactVerification) -> Result<(), AppError> {
        self.lock()?.verifications.push(v.clone());
        Ok(())
    }

    async fn find_verification(&self, id: Uuid) -> Result<Option<ContactVerification>, AppError> {
        Ok(self
            .lock()?
            .verifications
            .iter()
            .find(|v| v.id == id)
            .cloned())
    }

    async fn active_verifications_for_contact(
        &self,
        contact_id: Uuid,
    ) -> Result<Vec<ContactVerification>, AppError> {
        let now = Utc::now();
        let mut rows: Vec<ContactVerification> = self
            .lock()?
            .verifications
            .iter()
            .filter(|v| {
                v.contact_id == Some(contact_id) && v.consumed_at.is_none() && v.expires_at > now
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn recent_verifications_for_bin(
        &self,
        bin_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ContactVerification>, AppError> {
        let mut rows: Vec<ContactVerification> = self
            .lock()?
            .verifications
            .iter()
            .filter(|v| v.bin_id == bin_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn reseed_verification(
        &self,
        id: Uuid,
        seed: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut inner = self.lock()?;
        match inner
            .verifications
            .iter_mut()
            .find(|v| v.id == id && v.consumed_at.is_none())
        {
            Some(v) => {
                v.code_seed = Some(seed.to_string());
                v.code_hash = code_hash.to_string();
                v.expires_at = expires_at;
                v.attempts = 0;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn increment_verification_attempts(&self, id: Uuid) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if let Some(v) = inner.verifications.iter_mut().find(|v| v.id == id) {
            v.attempts += 1;
        }
        Ok(())
    }

    async fn consume_verification(&self, id: Uuid) -> Result<bool, AppError> {
        let mut inner = self.lock()?;
        match inner
            .verifications
            .iter_mut()
            .find(|v| v.id == id && v.consumed_at.is_none())
        {
            Some(v) => {
                v.consumed_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        self.lock()?.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn upsert_membership(
        &self,
        bin_id: Uuid,
        user_id: Uuid,
        role: &str,
    ) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        let exists = inner
            .memberships
            .iter()
            .any(|m| m.bin_id == bin_id && m.user_id == user_id && m.role == role);
        if !exists {
            inner.memberships.push(BinMembership {
                id: Uuid::new_v4(),
                bin_id,
                user_id,
                role: role.to_string(),
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn membership_exists(
        &self,
        bin_id: Uuid,
        user_id: Uuid,
        role: &str,
    ) -> Result<bool, AppError> {
        Ok(self
            .lock()?
            .memberships
            .iter()
            .any(|m| m.bin_id == bin_id && m.user_id == user_id && m.role == role))
    }

    async fn members_for_bin_role(&self, bin_id: Uuid, role: &str) -> Result<Vec<Uuid>, AppError> {
        Ok(self
            .lock()?
            .memberships
            .iter()
            .filter(|m| m.bin_id == bin_id && m.role == role)
            .map(|m| m.user_id)
            .collect())
    }

    async fn memberships_for_user(&self, user_id: Uuid) -> Result<Vec<BinMembership>, AppError> {
        Ok(self
            .lock()?
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_claim_token(&self, claim: &ClaimToken) -> Result<(), AppError> {
        self.lock()?
            .claim_tokens
            .insert(claim.token.clone(), claim.clone());
        Ok(())
    }

    async fn find_claim_token(&self, token: &str) -> Result<Option<ClaimToken>, AppError> {
        Ok(self.lock()?.claim_tokens.get(token).cloned())
    }

    async fn mark_claim_used(&self, token: &str) -> Result<bool, AppError> {
        let mut inner = self.lock()?;
        match inner.claim_tokens.get_mut(token) {
            Some(c) if c.used_at.is_none() => {
                c.used_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_credential(&self, credential: &WebAuthnCredential) -> Result<(), AppError> {
        self.lock()?.credentials.push(credential.clone());
        Ok(())
    }

    async fn credentials_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<WebAuthnCredential>, AppError> {
        Ok(self
            .lock()?
            .credentials
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn credentials_for_users(
        &self,
        user_ids: &[Uuid],
    ) -> Result<Vec<WebAuthnCredential>, AppError> {
        Ok(self
            .lock()?
            .credentials
            .iter()
            .filter(|c| user_ids.contains(&c.user_id))
            .cloned()
            .collect())
    }

    async fn find_credential_by_cred_id(
        &self,
        credential_id: &str,
    ) -> Result<Option<WebAuthnCredential>, AppError> {
        Ok(self
            .lock()?
            .credentials
            .iter()
            .find(|c| c.credential_id == credential_id)
            .cloned())
    }

    async fn count_credentials_for_user(&self, user_id: Uuid) -> Result<i64, AppError> {
        Ok(self
            .lock()?
            .credentials
            .iter()
            .filter(|c| c.user_id == user_id)
            .count() as i64)
    }

    async fn update_credential_passkey(
        &self,
        credential_id: &str,
        passkey: &serde_json::Value,
    ) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if let Some(c) = inner
            .credentials
            .iter_mut()
            .find(|c| c.credential_id == credential_id)
        {
            c.passkey = passkey.clone();
        }
        Ok(())
    }
}
