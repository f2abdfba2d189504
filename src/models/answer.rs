use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Answer {
    pub session_id: Uuid,
    pub question_id: i32,
    pub value: String,
    pub answered_at: DateTime<Utc>,
}

/// What the store did with a submitted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerWrite {
    Stored(Answer),
    /// Same value was already recorded; the existing row is returned untouched.
    Unchanged(Answer),
    /// The session was no longer accepting writes when the store checked.
    Refused,
}
