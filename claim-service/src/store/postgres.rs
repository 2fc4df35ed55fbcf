//! PostgreSQL store.
//!
//! Uses sqlx with runtime-checked queries. Every guarded write is a
//! conditional `UPDATE`/`DELETE` whose affected-row count is surfaced to
//! the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::Store;
use crate::models::{Bin, BinMembership, ClaimContact, ClaimToken, ContactVerification, User, WebAuthnCredential};

/// PostgreSQL-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_bin(&self, bin: &Bin) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO bins (id, label, address, municipality, waste_stream, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(bin.id)
        .bind(&bin.label)
        .bind(&bin.address)
        .bind(&bin.municipality)
        .bind(&bin.waste_stream)
        .bind(bin.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_bin_token(&self, token: &str, bin_id: Uuid) -> Result<(), AppError> {
        sqlx::query("INSERT INTO bin_tokens (token, bin_id, created_at) VALUES ($1, $2, $3)")
            .bind(token)
            .bind(bin_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn bin_id_by_token(&self, token: &str) -> Result<Option<Uuid>, AppError> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT bin_id FROM bin_tokens WHERE token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }

    async fn insert_claim_contact(&self, contact: &ClaimContact) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO claim_contacts
                (id, bin_id, role, email, phone, activated_at, activated_user_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(contact.id)
        .bind(contact.bin_id)
        .bind(&contact.role)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(contact.activated_at)
        .bind(contact.activated_user_id)
        .bind(contact.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_contact_by_id(&self, id: Uuid) -> Result<Option<ClaimContact>, AppError> {
        let contact =
            sqlx::query_as::<_, ClaimContact>("SELECT * FROM claim_contacts WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(contact)
    }

    async fn claim_contacts_for_bin_role(
        &self,
        bin_id: Uuid,
        role: &str,
    ) -> Result<Vec<ClaimContact>, AppError> {
        let contacts = sqlx::query_as::<_, ClaimContact>(
            "SELECT * FROM claim_contacts WHERE bin_id = $1 AND role = $2 ORDER BY created_at",
        )
        .bind(bin_id)
        .bind(role)
        .fetch_all(&self.pool)
        .await?;
        Ok(contacts)
    }

    async fn attach_phone_if_inactive(
        &self,
        contact_id: Uuid,
        phone: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE claim_contacts SET phone = $2 WHERE id = $1 AND activated_at IS NULL",
        )
        .bind(contact_id)
        .bind(phone)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_contact_if_inactive(&self, contact_id: Uuid) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM claim_contacts WHERE id = $1 AND activated_at IS NULL")
                .bind(contact_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn activate_contact_if_inactive(
        &self,
        contact_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE claim_contacts
            SET activated_at = $3, activated_user_id = $2
            WHERE id = $1 AND activated_at IS NULL
            "#,
        )
        .bind(contact_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn inactive_contacts_matching(
        &self,
        role: &str,
        email: Option<&str>,
        phone: Option<&str>,
        exclude_id: Uuid,
    ) -> Result<Vec<ClaimContact>, AppError> {
        let contacts = sqlx::query_as::<_, ClaimContact>(
            r#"
            SELECT * FROM claim_contacts
            WHERE role = $1
              AND id <> $2
              AND activated_at IS NULL
              AND (($3::text IS NOT NULL AND email = $3) OR ($4::text IS NOT NULL AND phone = $4))
            "#,
        )
        .bind(role)
        .bind(exclude_id)
        .bind(email)
        .bind(phone)
        .fetch_all(&self.pool)
        .await?;
        Ok(contacts)
    }

    async fn insert_verification(&self, v: &ContactVerification) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO contact_verifications
                (id, contact_id, bin_id, role, contact_type, contact_value, code_hash,
                 code_seed, expires_at, consumed_at, attempts, user_agent, locale, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(v.id)
        .bind(v.contact_id)
        .bind(v.bin_id)
        .bind(&v.role)
        .bind(&v.contact_type)
        .bind(&v.contact_value)
        .bind(&v.code_hash)
        .bind(&v.code_seed)
        .bind(v.expires_at)
        .bind(v.consumed_at)
        .bind(v.attempts)
        .bind(&v.user_agent)
        .bind(&v.locale)
        .bind(v.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_verification(&self, id: Uuid) -> Result<Option<ContactVerification>, AppError> {
        let v = sqlx::query_as::<_, ContactVerification>(
            "SELECT * FROM contact_verifications WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(v)
    }

    async fn active_verifications_for_contact(
        &self,
        contact_id: Uuid,
    ) -> Result<Vec<ContactVerification>, AppError> {
        let rows = sqlx::query_as::<_, ContactVerification>(
            r#"
            SELECT * FROM contact_verifications
            WHERE contact_id = $1 AND consumed_at IS NULL AND expires_at > $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(contact_id)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn recent_verifications_for_bin(
        &self,
        bin_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ContactVerification>, AppError> {
        let rows = sqlx::query_as::<_, ContactVerification>(
            r#"
            SELECT * FROM contact_verifications
            WHERE bin_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(bin_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn reseed_verification(
        &self,
        id: Uuid,
        seed: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE contact_verifications
            SET code_seed = $2, code_hash = $3, expires_at = $4, attempts = 0
            WHERE id = $1 AND consumed_at IS NULL
            "#,
        )
        .bind(id)
        .bind(seed)
        .bind(code_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn increment_verification_attempts(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE contact_verifications SET attempts = attempts + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn consume_verification(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE contact_verifications
            SET consumed_at = $2
            WHERE id = $1 AND consumed_at IS NULL
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query("INSERT INTO users (id, created_at) VALUES ($1, $2)")
            .bind(user.id)
            .bind(user.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_membership(
        &self,
        bin_id: Uuid,
        user_id: Uuid,
        role: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO bin_members (id, bin_id, user_id, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (bin_id, user_id, role) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bin_id)
        .bind(user_id)
        .bind(role)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn membership_exists(
        &self,
        bin_id: Uuid,
        user_id: Uuid,
        role: &str,
    ) -> Result<bool, AppError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM bin_members WHERE bin_id = $1 AND user_id = $2 AND role = $3",
        )
        .bind(bin_id)
        .bind(user_id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn members_for_bin_role(&self, bin_id: Uuid, role: &str) -> Result<Vec<Uuid>, AppError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM bin_members WHERE bin_id = $1 AND role = $2")
                .bind(bin_id)
                .bind(role)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn memberships_for_user(&self, user_id: Uuid) -> Result<Vec<BinMembership>, AppError> {
        let rows = sqlx::query_as::<_, BinMembership>(
            "SELECT * FROM bin_members WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_claim_token(&self, claim: &ClaimToken) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO claim_tokens
                (token, user_id, bin_token, role, contact_id, created_at, expires_at, used_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&claim.token)
        .bind(claim.user_id)
        .bind(&claim.bin_token)
        .bind(&claim.role)
        .bind(claim.contact_id)
        .bind(claim.created_at)
        .bind(claim.expires_at)
        .bind(claim.used_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_claim_token(&self, token: &str) -> Result<Option<ClaimToken>, AppError> {
        let claim = sqlx::query_as::<_, ClaimToken>("SELECT * FROM claim_tokens WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(claim)
    }

    async fn mark_claim_used(&self, token: &str) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE claim_tokens SET used_at = $2 WHERE token = $1 AND used_at IS NULL")
                .bind(token)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_credential(&self, credential: &WebAuthnCredential) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO webauthn_credentials (id, user_id, credential_id, passkey, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(credential.id)
        .bind(credential.user_id)
        .bind(&credential.credential_id)
        .bind(&credential.passkey)
        .bind(credential.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn credentials_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<WebAuthnCredential>, AppError> {
        let rows = sqlx::query_as::<_, WebAuthnCredential>(
            "SELECT * FROM webauthn_credentials WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn credentials_for_users(
        &self,
        user_ids: &[Uuid],
    ) -> Result<Vec<WebAuthnCredential>, AppError> {
        let rows = sqlx::query_as::<_, WebAuthnCredential>(
            "SELECT * FROM webauthn_credentials WHERE user_id = ANY($1) ORDER BY created_at",
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_credential_by_cred_id(
        &self,
        credential_id: &str,
    ) -> Result<Option<WebAuthnCredential>, AppError> {
        let row = sqlx::query_as::<_, WebAuthnCredential>(
            "SELECT * FROM webauthn_credentials WHERE credential_id = $1",
        )
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn count_credentials_for_user(&self, user_id: Uuid) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM webauthn_credentials WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn update_credential_passkey(
        &self,
        credential_id: &str,
        passkey: &serde_json::Value,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE webauthn_credentials SET passkey = $2 WHERE credential_id = $1")
            .bind(credential_id)
            .bind(passkey)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
