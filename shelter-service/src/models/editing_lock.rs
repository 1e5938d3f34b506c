use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Exclusive edit claim on one section of a case record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow, ToSchema)]
pub struct EditingLock {
    pub id: Uuid,
    #[schema(example = 42)]
    pub resource_id: i64,
    pub user_id: Uuid,
    #[schema(example = "medical")]
    pub section_name: String,
    pub created_at: DateTime<Utc>,
}

impl EditingLock {
    pub fn new(resource_id: i64, section_name: &str, user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource_id,
            user_id,
            section_name: section_name.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn expires_at(&self, window: Duration) -> DateTime<Utc> {
        self.created_at + window
    }

    /// Locks are never renewed, so expiry is a fixed offset from creation.
    pub fn is_expired_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.expires_at(window) <= now
    }
}
