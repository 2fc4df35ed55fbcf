//! Claim contact model and contact-value normalization.
//!
//! A ClaimContact records that a given email and/or phone is authorized to
//! claim a role on a bin. Normalization lives here so every write and
//! match boundary (resolver, issuer, pooling, admin creation) goes through
//! the same rules.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::Role;

/// A (bin, role, channel-value) authorization row.
#[derive(Debug, Clone, FromRow)]
pub struct ClaimContact {
    pub id: Uuid,
    pub bin_id: Uuid,
    pub role: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub activated_at: Option<DateTime<Utc>>,
    pub activated_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ClaimContact {
    pub fn new(bin_id: Uuid, role: Role, email: Option<String>, phone: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            bin_id,
            role: role.as_str().to_string(),
            email: email.map(|e| normalize_email(&e)),
            phone: phone.map(|p| normalize_phone(&p)),
            activated_at: None,
            activated_user_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_activated(&self) -> bool {
        self.activated_at.is_some()
    }

    /// Whether this row carries the given (already normalized) value on
    /// either channel.
    pub fn carries_value(&self, value: &str) -> bool {
        self.email.as_deref() == Some(value) || self.phone.as_deref() == Some(value)
    }
}

/// Lowercased, trimmed email.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Phone numbers are reduced to a `+`-prefixed digit string. Danish local
/// 8-digit numbers get the +45 country prefix; 10-digit strings already
/// starting with 45 are treated as country-prefixed.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix('+') {
        let digits: String = rest.chars().filter(|c| c.is_ascii_digit()).collect();
        return format!("+{}", digits);
    }
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.starts_with("45") && digits.len() == 10 {
        return format!("+{}", digits);
    }
    if digits.len() == 8 {
        return format!("+45{}", digits);
    }
    format!("+{}", digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization_folds_case_and_whitespace() {
        assert_eq!(normalize_email("  A@X.Com "), "a@x.com");
    }

    #[test]
    fn phone_normalization_applies_dk_rules() {
        assert_eq!(normalize_phone("55 51 23 45"), "+4555512345");
        assert_eq!(normalize_phone("4555512345"), "+4555512345");
        assert_eq!(normalize_phone("+45 55 51 23 45"), "+4555512345");
        assert_eq!(normalize_phone("+15551234567"), "+15551234567");
    }

    #[test]
    fn carries_value_matches_either_channel() {
        let c = ClaimContact::new(
            Uuid::new_v4(),
            Role::Owner,
            Some("a@x.com".into()),
            Some("+4555512345".into()),
        );
        assert!(c.carries_value("a@x.com"));
        assert!(c.carries_value("+4555512345"));
        assert!(!c.carries_value("b@x.com"));
    }
}
