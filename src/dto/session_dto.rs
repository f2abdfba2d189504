use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::assessment_session::{AssessmentSession, SessionCursor, SessionState};
use crate::models::question::Question;
use crate::services::session_service::SessionProgress;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StartSessionRequest {
    pub question_pack_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    #[validate(range(min = 1))]
    pub question_id: i32,
    #[validate(length(min = 1, max = 500))]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAnswerResponse {
    pub saved: bool,
    pub question_id: i32,
    pub value: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkQuestionRequest {
    pub question_index: usize,
    #[serde(default = "default_marked")]
    pub marked: bool,
}

fn default_marked() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorResponse {
    pub current_index: usize,
    pub marked: Vec<usize>,
}

impl From<SessionCursor> for CursorResponse {
    fn from(cursor: SessionCursor) -> Self {
        Self {
            current_index: cursor.current_index,
            marked: cursor.marked.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub application_id: Uuid,
    pub question_pack_id: Uuid,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub concluded_at: Option<DateTime<Utc>>,
    pub total_questions: usize,
    pub cursor: CursorResponse,
}

impl From<AssessmentSession> for SessionResponse {
    fn from(s: AssessmentSession) -> Self {
        Self {
            id: s.id,
            application_id: s.application_id,
            question_pack_id: s.question_pack_id,
            state: s.state,
            started_at: s.started_at,
            deadline_at: s.deadline_at,
            duration_seconds: s.duration_seconds,
            concluded_at: s.concluded_at,
            total_questions: s.questions.len(),
            cursor: s.cursor.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session: SessionResponse,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatusResponse {
    pub session: SessionResponse,
    pub progress: SessionProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResponse {
    pub expired: usize,
}
