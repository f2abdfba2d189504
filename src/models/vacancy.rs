use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Read-only view of a published vacancy within a recruitment period.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vacancy {
    pub id: Uuid,
    pub period_id: Uuid,
    pub title: String,
    pub required_major: Option<String>,
    pub published_at: DateTime<Utc>,
}
