//! Claim-to-credential binding.
//!
//! The last leg of the claim flow: a valid claim token plus a completed
//! passkey registration ceremony becomes a persisted credential, a spent
//! claim, an activated contact, and pooled activations across every other
//! bin registered to the same person.

use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{ClaimContact, ClaimToken, WebAuthnCredential};
use crate::store::Store;

/// Load a claim token and fail closed unless it is still pending.
pub async fn ensure_claim_usable(
    store: &dyn Store,
    token: &str,
) -> Result<ClaimToken, AppError> {
    let claim = store
        .find_claim_token(token)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Unknown claim")))?;

    if claim.is_used() {
        return Err(AppError::AlreadyUsed);
    }
    if claim.is_expired() {
        return Err(AppError::Expired);
    }

    Ok(claim)
}

/// Persist the ceremony result and retire the claim. Returns the path the
/// client should land on.
#[tracing::instrument(skip(store, credential), fields(user_id = %claim.user_id))]
pub async fn finalize_claim(
    store: &dyn Store,
    claim: &ClaimToken,
    credential: WebAuthnCredential,
) -> Result<String, AppError> {
    store.insert_credential(&credential).await?;

    if !store.mark_claim_used(&claim.token).await? {
        return Err(AppError::AlreadyUsed);
    }

    if let Some(contact_id) = claim.contact_id {
        let freshly_activated = store
            .activate_contact_if_inactive(contact_id, claim.user_id)
            .await?;

        if freshly_activated {
            match store.claim_contact_by_id(contact_id).await? {
                Some(contact) => {
                    if let Err(err) = pool_activate(store, &contact, claim.user_id).await {
                        tracing::error!(error = %err, contact_id = %contact_id, "Pooled activation failed");
                    }
                }
                None => {
                    tracing::warn!(contact_id = %contact_id, "Activated contact vanished before pooling");
                }
            }
        }
    }

    tracing::info!(bin_token = %claim.bin_token, role = %claim.role, "Claim bound to credential");

    Ok(format!("/k/{}", claim.bin_token))
}

/// Propagate one activation across every other inactive contact row for the
/// same role sharing this contact's email or phone. Memberships are
/// upserted on (bin, user, role), so a retried request is a no-op.
pub async fn pool_activate(
    store: &dyn Store,
    contact: &ClaimContact,
    user_id: Uuid,
) -> Result<(), AppError> {
    if contact.email.is_none() && contact.phone.is_none() {
        return Ok(());
    }

    let siblings = store
        .inactive_contacts_matching(
            contact.role.as_str(),
            contact.email.as_deref(),
            contact.phone.as_deref(),
            contact.id,
        )
        .await?;

    for sibling in &siblings {
        store
            .upsert_membership(sibling.bin_id, user_id, sibling.role.as_str())
            .await?;
        // Guard miss means another flow activated this row first.
        let _ = store.activate_contact_if_inactive(sibling.id, user_id).await?;
    }

    if !siblings.is_empty() {
        tracing::info!(
            user_id = %user_id,
            pooled = siblings.len(),
            "Pooled activation applied to sibling bins"
        );
    }

    Ok(())
}
