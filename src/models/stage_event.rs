use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::application::text_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageEventKind {
    ApplicationSubmitted,
    AdministrationDecided,
    AssessmentStarted,
    AssessmentConcluded,
    InterviewDecided,
}

text_enum!(StageEventKind {
    ApplicationSubmitted => "application_submitted",
    AdministrationDecided => "administration_decided",
    AssessmentStarted => "assessment_started",
    AssessmentConcluded => "assessment_concluded",
    InterviewDecided => "interview_decided",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivering,
    Delivered,
    Failed,
    Skipped,
}

text_enum!(DeliveryStatus {
    Pending => "pending",
    Delivering => "delivering",
    Delivered => "delivered",
    Failed => "failed",
    Skipped => "skipped",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    pub id: Uuid,
    pub application_id: Uuid,
    pub kind: StageEventKind,
    pub payload: JsonValue,
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct StageEventRow {
    pub id: Uuid,
    pub application_id: Uuid,
    pub event_type: String,
    pub payload: JsonValue,
    pub status: String,
    pub attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<StageEventRow> for StageEvent {
    type Error = Error;

    fn try_from(row: StageEventRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            application_id: row.application_id,
            kind: row.event_type.parse()?,
            payload: row.payload,
            status: row.status.parse()?,
            attempts: row.attempts,
            next_retry_at: row.next_retry_at,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Outcome of one delivery attempt, as recorded by the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered,
    Retry {
        error: String,
        next_retry_at: DateTime<Utc>,
    },
    GaveUp {
        error: String,
    },
}
