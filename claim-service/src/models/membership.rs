//! Bin membership model - (bin, user, role) operational rights.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Unique over (bin_id, user_id, role); pooled activation relies on that
/// constraint for idempotent upserts.
#[derive(Debug, Clone, FromRow)]
pub struct BinMembership {
    pub id: Uuid,
    pub bin_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: DateTime<Utc>,
}
