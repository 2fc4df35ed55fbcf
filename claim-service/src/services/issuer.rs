//! Verification issuance and multi-channel code delivery.
//!
//! Issuance is idempotent per target within the validity window: a resend
//! reuses the existing row and seed, so the recipient sees the same code
//! again instead of a confusing new one. Channels belonging to one merged
//! contact share a seed, so the email and the SMS carry identical codes.

use chrono::{Duration, Utc};
use futures::future;
use service_core::error::AppError;
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::ClaimConfig;
use crate::models::{ChannelType, ContactVerification, Role};
use crate::services::delivery::{
    reduce_delivery_results, EmailMessage, EmailProvider, ProviderError, SmsMessage, SmsProvider,
};
use crate::services::otp;
use crate::services::resolver::ResolvedTarget;
use crate::store::Store;

pub struct IssueOutcome {
    pub verification_ids: Vec<Uuid>,
    pub dev_code: Option<String>,
}

#[derive(Debug)]
pub struct RequestMeta {
    pub user_agent: Option<String>,
    pub locale: Option<String>,
}

#[tracing::instrument(skip_all, fields(bin_id = %bin_id, role = %role, targets = targets.len()))]
pub async fn issue_verifications(
    store: &dyn Store,
    email_provider: &dyn EmailProvider,
    sms_provider: &dyn SmsProvider,
    config: &ClaimConfig,
    bin_id: Uuid,
    bin_token: &str,
    role: Role,
    targets: &[ResolvedTarget],
    meta: &RequestMeta,
) -> Result<IssueOutcome, AppError> {
    let mut verification_ids = Vec::with_capacity(targets.len());
    let mut sends: Vec<(ChannelType, String, String)> = Vec::with_capacity(targets.len());
    let mut dev_code = None;

    let mut by_contact: HashMap<Uuid, Vec<&ResolvedTarget>> = HashMap::new();
    for target in targets {
        by_contact.entry(target.contact_id).or_default().push(target);
    }

    for (contact_id, contact_targets) in by_contact {
        let existing = store.active_verifications_for_contact(contact_id).await?;

        // One seed per contact: adopt the first persisted one, otherwise
        // mint fresh. Rows predating seeds get retrofitted below.
        let seed = existing
            .iter()
            .filter(|v| !v.attempts_exhausted(otp::MAX_ATTEMPTS))
            .find_map(|v| v.code_seed.clone())
            .unwrap_or_else(otp::generate_seed);

        let code = otp::derive_code(&config.otp.secret, &seed, bin_id, role.as_str());
        let expires_at = Utc::now() + Duration::hours(config.otp.code_ttl_hours);

        for target in contact_targets {
            let hash = otp::code_hash(
                &code,
                bin_id,
                role.as_str(),
                target.channel_type.as_str(),
                &target.channel_value,
            );

            let matching = existing.iter().find(|v| {
                v.contact_type == target.channel_type.as_str()
                    && v.contact_value == target.channel_value
                    && !v.attempts_exhausted(otp::MAX_ATTEMPTS)
            });

            let id = match matching {
                Some(v) if v.code_seed.as_deref() == Some(seed.as_str()) => v.id,
                Some(v) => {
                    // Legacy row without a seed, or a sibling-channel row
                    // minted under an older seed. Re-align it so every
                    // channel of this contact verifies the same code.
                    if store.reseed_verification(v.id, &seed, &hash, expires_at).await? {
                        v.id
                    } else {
                        insert_fresh(store, v, &seed, &hash, expires_at, meta).await?
                    }
                }
                None => {
                    let verification = ContactVerification::new(
                        contact_id,
                        bin_id,
                        role,
                        target.channel_type,
                        target.channel_value.clone(),
                        hash,
                        seed.clone(),
                        config.otp.code_ttl_hours,
                        meta.user_agent.clone(),
                        meta.locale.clone(),
                    );
                    store.insert_verification(&verification).await?;
                    verification.id
                }
            };

            verification_ids.push(id);
            sends.push((
                target.channel_type,
                target.channel_value.clone(),
                code.clone(),
            ));
        }

        if dev_code.is_none() {
            dev_code = Some(code);
        }
    }

    let results = deliver_all(
        email_provider,
        sms_provider,
        &config.app_name,
        bin_token,
        role,
        &sends,
    )
    .await;

    match reduce_delivery_results(results) {
        Ok(()) => {}
        Err(err) if config.otp.expose_dev_code => {
            tracing::warn!(error = %err, "All deliveries failed, continuing with dev code");
        }
        Err(err) => return Err(err),
    }

    Ok(IssueOutcome {
        verification_ids,
        dev_code: config.otp.expose_dev_code.then_some(dev_code).flatten(),
    })
}

async fn insert_fresh(
    store: &dyn Store,
    stale: &ContactVerification,
    seed: &str,
    hash: &str,
    expires_at: chrono::DateTime<Utc>,
    meta: &RequestMeta,
) -> Result<Uuid, AppError> {
    let verification = ContactVerification {
        id: Uuid::new_v4(),
        contact_id: stale.contact_id,
        bin_id: stale.bin_id,
        role: stale.role.clone(),
        contact_type: stale.contact_type.clone(),
        contact_value: stale.contact_value.clone(),
        code_hash: hash.to_string(),
        code_seed: Some(seed.to_string()),
        expires_at,
        consumed_at: None,
        attempts: 0,
        user_agent: meta.user_agent.clone(),
        locale: meta.locale.clone(),
        created_at: Utc::now(),
    };
    store.insert_verification(&verification).await?;
    Ok(verification.id)
}

/// Fan out one send per channel concurrently. Individual failures are
/// collected, not short-circuited; the caller reduces them with
/// at-least-one-success semantics.
async fn deliver_all(
    email_provider: &dyn EmailProvider,
    sms_provider: &dyn SmsProvider,
    app_name: &str,
    bin_token: &str,
    role: Role,
    sends: &[(ChannelType, String, String)],
) -> Vec<Result<(), ProviderError>> {
    let futures: Vec<_> = sends
        .iter()
        .map(|(channel_type, to, code)| {
            let body = format!(
                "{}: din kode er {}. (bin {}, rolle {})",
                app_name, code, bin_token, role
            );
            async move {
                match channel_type {
                    ChannelType::Email => {
                        email_provider
                            .send(&EmailMessage {
                                to: to.clone(),
                                subject: format!("{} \u{2013} din kode", app_name),
                                body,
                            })
                            .await
                    }
                    ChannelType::Phone => {
                        sms_provider
                            .send(&SmsMessage {
                                to: to.clone(),
                                body,
                            })
                            .await
                    }
                }
            }
        })
        .collect();

    future::join_all(futures).await
}
