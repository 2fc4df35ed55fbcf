//! Contact resolution for claim-start.
//!
//! Given a bin and role, decides who may receive a verification code. Along
//! the way it consolidates split contact rows (one email-only, one
//! phone-only row for the same person) into a single row, and detects
//! recovery mode: every authorized contact already activated, meaning the
//! caller is re-authenticating rather than claiming for the first time.

use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{normalize_email, normalize_phone, ChannelType, ClaimContact, Role};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub contact_id: Uuid,
    pub channel_type: ChannelType,
    pub channel_value: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedTargets {
    pub targets: Vec<ResolvedTarget>,
    pub recovery: bool,
}

#[tracing::instrument(skip(store))]
pub async fn resolve_targets(
    store: &dyn Store,
    bin_id: Uuid,
    role: Role,
    channel: Option<&str>,
) -> Result<ResolvedTargets, AppError> {
    let mut contacts = store.claim_contacts_for_bin_role(bin_id, role.as_str()).await?;

    if contacts.is_empty() {
        return Err(AppError::Forbidden(anyhow::anyhow!("Not allowed")));
    }

    check_divergent_activation(&contacts)?;

    if merge_split_rows(store, &contacts).await? {
        contacts = store.claim_contacts_for_bin_role(bin_id, role.as_str()).await?;
    }

    let requested = channel.map(normalize_channel);
    if let Some(requested) = &requested {
        contacts.retain(|c| c.carries_value(requested));
        if contacts.is_empty() {
            return Err(AppError::Forbidden(anyhow::anyhow!("Not allowed")));
        }
    }

    let recovery = contacts.iter().all(|c| c.is_activated());
    let eligible: Vec<&ClaimContact> = if recovery {
        contacts.iter().collect()
    } else {
        contacts.iter().filter(|c| !c.is_activated()).collect()
    };

    // A named channel narrows delivery to that address alone; without one,
    // every channel the contact carries gets a code.
    let wants = |value: &str| requested.as_deref().map_or(true, |r| r == value);

    let mut targets = Vec::new();
    for contact in eligible {
        if let Some(email) = contact.email.as_deref().filter(|e| wants(e)) {
            targets.push(ResolvedTarget {
                contact_id: contact.id,
                channel_type: ChannelType::Email,
                channel_value: email.to_string(),
            });
        }
        if let Some(phone) = contact.phone.as_deref().filter(|p| wants(p)) {
            targets.push(ResolvedTarget {
                contact_id: contact.id,
                channel_type: ChannelType::Phone,
                channel_value: phone.to_string(),
            });
        }
    }

    if targets.is_empty() {
        return Err(AppError::Forbidden(anyhow::anyhow!("Not allowed")));
    }

    Ok(ResolvedTargets { targets, recovery })
}

/// Rows sharing a channel value must agree on activation state. One
/// activated and one not (or activated to different principals) means an
/// earlier merge or activation went wrong, and guessing here could hand the
/// bin to the wrong principal.
fn check_divergent_activation(contacts: &[ClaimContact]) -> Result<(), AppError> {
    for (i, a) in contacts.iter().enumerate() {
        for b in contacts.iter().skip(i + 1) {
            let shares_channel =
                a.email.is_some() && a.email == b.email || a.phone.is_some() && a.phone == b.phone;
            if !shares_channel {
                continue;
            }
            let divergent = a.is_activated() != b.is_activated()
                || (a.is_activated() && a.activated_user_id != b.activated_user_id);
            if divergent {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Contact rows in inconsistent activation state"
                )));
            }
        }
    }
    Ok(())
}

/// Consolidate exactly one inactive email-only row and the inactive
/// phone-only row(s) carrying a single distinct phone value into one row.
/// Both writes are guarded on `activated_at IS NULL`; a guard miss means a
/// concurrent activation won, and we leave the rows alone.
async fn merge_split_rows(store: &dyn Store, contacts: &[ClaimContact]) -> Result<bool, AppError> {
    let inactive: Vec<&ClaimContact> = contacts.iter().filter(|c| !c.is_activated()).collect();

    if inactive.iter().any(|c| c.email.is_some() && c.phone.is_some()) {
        return Ok(false);
    }

    let email_only: Vec<&&ClaimContact> = inactive
        .iter()
        .filter(|c| c.email.is_some() && c.phone.is_none())
        .collect();
    let phone_only: Vec<&&ClaimContact> = inactive
        .iter()
        .filter(|c| c.phone.is_some() && c.email.is_none())
        .collect();

    if email_only.len() != 1 || phone_only.is_empty() {
        return Ok(false);
    }

    let mut phone_values: Vec<&str> =
        phone_only.iter().filter_map(|c| c.phone.as_deref()).collect();
    phone_values.sort_unstable();
    phone_values.dedup();
    if phone_values.len() != 1 {
        return Ok(false);
    }

    let email_row = email_only[0];
    let phone = phone_values[0];

    if !store.attach_phone_if_inactive(email_row.id, phone).await? {
        return Ok(false);
    }

    for row in &phone_only {
        // Zero rows affected means a concurrent activation; the merged email
        // row already carries the phone either way.
        let _ = store.delete_contact_if_inactive(row.id).await?;
    }

    tracing::info!(contact_id = %email_row.id, "Merged split contact rows");
    Ok(true)
}

fn normalize_channel(value: &str) -> String {
    if value.contains('@') {
        normalize_email(value)
    } else {
        normalize_phone(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn contact(email: Option<&str>, phone: Option<&str>, activated: bool) -> ClaimContact {
        ClaimContact {
            id: Uuid::new_v4(),
            bin_id: Uuid::new_v4(),
            role: "owner".to_string(),
            email: email.map(String::from),
            phone: phone.map(String::from),
            activated_at: activated.then(Utc::now),
            activated_user_id: activated.then(Uuid::new_v4),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn divergent_activation_is_a_conflict() {
        let mut a = contact(Some("a@x.com"), None, true);
        let b = contact(Some("a@x.com"), None, false);
        a.bin_id = b.bin_id;
        assert!(matches!(
            check_divergent_activation(&[a, b]),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn distinct_contacts_do_not_conflict() {
        let a = contact(Some("a@x.com"), None, true);
        let b = contact(Some("b@x.com"), None, false);
        assert!(check_divergent_activation(&[a, b]).is_ok());
    }
}
