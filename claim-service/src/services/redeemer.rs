//! Code redemption: one-shot exchange of a correct OTP for a claim token.

use chrono::{Duration, Utc};
use service_core::error::AppError;
use uuid::Uuid;

use crate::config::ClaimConfig;
use crate::models::{random_token, ClaimToken, ContactVerification, User};
use crate::services::otp;
use crate::store::Store;

/// How many recent rows scan-search inspects when the caller lost track of
/// its verification id.
const SCAN_SEARCH_LIMIT: i64 = 25;

pub struct RedeemOutcome {
    pub claim_token: String,
    pub user_id: Uuid,
}

#[tracing::instrument(skip(store, config, raw_code))]
pub async fn redeem(
    store: &dyn Store,
    config: &ClaimConfig,
    bin_token: &str,
    verification_id: Option<Uuid>,
    raw_code: &str,
) -> Result<RedeemOutcome, AppError> {
    let code = otp::strip_to_digits(raw_code);
    if code.len() < otp::MIN_CODE_DIGITS {
        return Err(AppError::InvalidCode);
    }

    let bin_id = store
        .bin_id_by_token(bin_token)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Unknown bin")))?;

    let verification = match verification_id {
        Some(id) => redeem_direct(store, bin_id, id, &code).await?,
        None => scan_search(store, bin_id, &code).await?,
    };

    // Consume before minting anything. A second redemption racing us loses
    // the compare-and-set and gets AlreadyUsed instead of a second token.
    if !store.consume_verification(verification.id).await? {
        return Err(AppError::AlreadyUsed);
    }

    let user_id = principal_for(store, &verification).await?;

    store
        .upsert_membership(bin_id, user_id, &verification.role)
        .await?;

    let claim = ClaimToken {
        token: random_token(24),
        user_id,
        bin_token: bin_token.to_string(),
        role: verification.role.clone(),
        contact_id: verification.contact_id,
        created_at: Utc::now(),
        expires_at: Utc::now() + Duration::days(config.otp.claim_token_ttl_days),
        used_at: None,
    };
    store.insert_claim_token(&claim).await?;

    tracing::info!(verification_id = %verification.id, user_id = %user_id, "Verification redeemed");

    Ok(RedeemOutcome {
        claim_token: claim.token,
        user_id,
    })
}

async fn redeem_direct(
    store: &dyn Store,
    bin_id: Uuid,
    id: Uuid,
    code: &str,
) -> Result<ContactVerification, AppError> {
    let verification = store
        .find_verification(id)
        .await?
        .filter(|v| v.bin_id == bin_id)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Unknown verification")))?;

    if verification.is_consumed() {
        return Err(AppError::AlreadyUsed);
    }
    if verification.is_expired() {
        return Err(AppError::Expired);
    }
    if verification.attempts_exhausted(otp::MAX_ATTEMPTS) {
        return Err(AppError::TooManyAttempts);
    }

    if !hash_matches(&verification, code) {
        store.increment_verification_attempts(verification.id).await?;
        return Err(AppError::InvalidCode);
    }

    Ok(verification)
}

/// Test the code against the most recent live verifications for the bin.
/// Attempts are not incremented here: a miss does not identify which row
/// the caller was aiming at, and the rate limiter bounds guessing.
async fn scan_search(
    store: &dyn Store,
    bin_id: Uuid,
    code: &str,
) -> Result<ContactVerification, AppError> {
    let candidates = store
        .recent_verifications_for_bin(bin_id, SCAN_SEARCH_LIMIT)
        .await?;

    candidates
        .into_iter()
        .filter(|v| {
            !v.is_consumed() && !v.is_expired() && !v.attempts_exhausted(otp::MAX_ATTEMPTS)
        })
        .find(|v| hash_matches(v, code))
        .ok_or(AppError::InvalidCode)
}

fn hash_matches(verification: &ContactVerification, code: &str) -> bool {
    let expected = otp::code_hash(
        code,
        verification.bin_id,
        &verification.role,
        &verification.contact_type,
        &verification.contact_value,
    );
    otp::hashes_match(&expected, &verification.code_hash)
}

/// Reuse the contact's activated principal when one exists (recovery),
/// otherwise mint an anonymous one lazily.
async fn principal_for(
    store: &dyn Store,
    verification: &ContactVerification,
) -> Result<Uuid, AppError> {
    if let Some(contact_id) = verification.contact_id {
        if let Some(contact) = store.claim_contact_by_id(contact_id).await? {
            if let Some(user_id) = contact.activated_user_id {
                return Ok(user_id);
            }
        }
    }

    let user = User::new();
    store.insert_user(&user).await?;
    Ok(user.id)
}
