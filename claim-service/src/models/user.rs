//! Principal model - the anonymous identity created on first successful
//! claim. Carries no attributes of its own; passkeys and memberships hang
//! off it.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }
}

impl Default for User {
    fn default() -> Self {
        Self::new()
    }
}
