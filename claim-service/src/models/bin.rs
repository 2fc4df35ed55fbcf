//! Bin model - identity for a physical waste container.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Bin entity. No single principal owns a bin; principals hold roles
/// against it via memberships.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Bin {
    pub id: Uuid,
    pub label: String,
    pub address: Option<String>,
    pub municipality: Option<String>,
    pub waste_stream: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Bin {
    pub fn new(
        label: String,
        address: Option<String>,
        municipality: Option<String>,
        waste_stream: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            label,
            address,
            municipality,
            waste_stream,
            created_at: Utc::now(),
        }
    }
}
