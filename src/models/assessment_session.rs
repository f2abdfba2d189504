use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{ClosedReason, Error, Result};
use crate::models::application::{text_enum, AssessmentOutcome};
use crate::models::question::Question;
use crate::utils::time::deadline_after;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Completed,
    TimedOut,
}

text_enum!(SessionState {
    Active => "active",
    Completed => "completed",
    TimedOut => "timed_out",
});

impl From<AssessmentOutcome> for SessionState {
    fn from(outcome: AssessmentOutcome) -> Self {
        match outcome {
            AssessmentOutcome::Completed => SessionState::Completed,
            AssessmentOutcome::TimedOut => SessionState::TimedOut,
        }
    }
}

impl SessionState {
    pub fn outcome(&self) -> Option<AssessmentOutcome> {
        match self {
            SessionState::Active => None,
            SessionState::Completed => Some(AssessmentOutcome::Completed),
            SessionState::TimedOut => Some(AssessmentOutcome::TimedOut),
        }
    }
}

/// Navigation aid: where the candidate is and what they flagged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCursor {
    pub current_index: usize,
    pub marked: BTreeSet<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "direction", content = "index")]
pub enum Navigation {
    Next,
    Previous,
    Jump(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentSession {
    pub id: Uuid,
    pub application_id: Uuid,
    pub question_pack_id: Uuid,
    pub questions: Vec<Question>,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub deadline_at: DateTime<Utc>,
    pub state: SessionState,
    pub concluded_at: Option<DateTime<Utc>>,
    pub cursor: SessionCursor,
}

impl AssessmentSession {
    pub fn start(
        application_id: Uuid,
        question_pack_id: Uuid,
        questions: Vec<Question>,
        duration_seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let deadline_at = deadline_after(now, duration_seconds).ok_or_else(|| {
            Error::BadRequest(format!("duration_seconds {} is out of range", duration_seconds))
        })?;
        Ok(Self {
            id: Uuid::new_v4(),
            application_id,
            question_pack_id,
            questions,
            started_at: now,
            duration_seconds,
            deadline_at,
            state: SessionState::Active,
            concluded_at: None,
            cursor: SessionCursor::default(),
        })
    }

    /// Writes are accepted only strictly before the deadline.
    pub fn accepts_writes_at(&self, now: DateTime<Utc>) -> bool {
        self.state == SessionState::Active && now < self.deadline_at
    }

    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.state == SessionState::Active && now >= self.deadline_at
    }

    /// Why a write at `now` would be refused, if it would be.
    pub fn closed_reason_at(&self, now: DateTime<Utc>) -> Option<ClosedReason> {
        match self.state {
            SessionState::Active if now < self.deadline_at => None,
            SessionState::Active | SessionState::TimedOut => Some(ClosedReason::TimeExpired),
            SessionState::Completed => Some(ClosedReason::Submitted),
        }
    }

    pub fn question(&self, question_id: i32) -> Result<&Question> {
        self.questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| {
                Error::NotFound(format!("Question {} is not part of this session", question_id))
            })
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.questions.len() {
            Ok(())
        } else {
            Err(Error::NotFound(format!(
                "Question index {} is out of range (0..{})",
                index,
                self.questions.len()
            )))
        }
    }

    pub fn with_mark(&self, index: usize, marked: bool) -> Result<SessionCursor> {
        self.check_index(index)?;
        let mut cursor = self.cursor.clone();
        if marked {
            cursor.marked.insert(index);
        } else {
            cursor.marked.remove(&index);
        }
        Ok(cursor)
    }

    /// Moves the cursor; next/previous clamp at the ends.
    pub fn with_navigation(&self, nav: Navigation) -> Result<SessionCursor> {
        let last = self.questions.len().saturating_sub(1);
        let current = self.cursor.current_index.min(last);
        let target = match nav {
            Navigation::Next => (current + 1).min(last),
            Navigation::Previous => current.saturating_sub(1),
            Navigation::Jump(index) => {
                self.check_index(index)?;
                index
            }
        };
        Ok(SessionCursor {
            current_index: target,
            marked: self.cursor.marked.clone(),
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AssessmentSessionRow {
    pub id: Uuid,
    pub application_id: Uuid,
    pub question_pack_id: Uuid,
    pub questions_snapshot: JsonValue,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub deadline_at: DateTime<Utc>,
    pub state: String,
    pub concluded_at: Option<DateTime<Utc>>,
    pub current_index: i32,
    pub marked_questions: Vec<i32>,
}

impl TryFrom<AssessmentSessionRow> for AssessmentSession {
    type Error = Error;

    fn try_from(row: AssessmentSessionRow) -> Result<Self> {
        let questions: Vec<Question> = serde_json::from_value(row.questions_snapshot)?;
        Ok(Self {
            id: row.id,
            application_id: row.application_id,
            question_pack_id: row.question_pack_id,
            questions,
            started_at: row.started_at,
            duration_seconds: row.duration_seconds,
            deadline_at: row.deadline_at,
            state: row.state.parse()?,
            concluded_at: row.concluded_at,
            cursor: SessionCursor {
                current_index: row.current_index.max(0) as usize,
                marked: row
                    .marked_questions
                    .into_iter()
                    .filter(|i| *i >= 0)
                    .map(|i| i as usize)
                    .collect(),
            },
        })
    }
}
