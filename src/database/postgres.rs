use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::{
    AnswerRepository, ApplicationRepository, CandidateRepository, OutboxRepository,
    QuestionSetProvider, SessionRepository, VacancyRepository,
};
use crate::error::{Error, Result};
use crate::models::answer::{Answer, AnswerWrite};
use crate::models::application::{Application, ApplicationRow, NewApplication, StageState};
use crate::models::assessment_session::{
    AssessmentSession, AssessmentSessionRow, SessionCursor, SessionState,
};
use crate::models::candidate::CandidateProfile;
use crate::models::question::{QuestionPack, QuestionPackRow};
use crate::models::stage_event::{DeliveryResult, StageEvent, StageEventRow};
use crate::models::vacancy::Vacancy;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn marked_to_db(cursor: &SessionCursor) -> Vec<i32> {
    cursor.marked.iter().map(|i| *i as i32).collect()
}

#[async_trait]
impl ApplicationRepository for PgStore {
    async fn insert(&self, new: NewApplication, stages: StageState) -> Result<Application> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"
            INSERT INTO applications (
                id, candidate_id, vacancy_id, vacancy_period_id,
                administration_status, assessment_status, interview_status, interview_result,
                applied_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            ON CONFLICT (candidate_id, vacancy_period_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.candidate_id)
        .bind(new.vacancy_id)
        .bind(new.vacancy_period_id)
        .bind(stages.administration.as_str())
        .bind(stages.assessment.as_str())
        .bind(stages.interview.as_str())
        .bind(stages.interview_result.map(|r| r.as_str()))
        .bind(new.applied_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(Error::DuplicateApplication),
        }
    }

    async fn find(&self, id: Uuid) -> Result<Option<Application>> {
        let row = sqlx::query_as::<_, ApplicationRow>(r#"SELECT * FROM applications WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Application::try_from).transpose()
    }

    async fn list_for_candidate(&self, candidate_id: Uuid) -> Result<Vec<Application>> {
        let rows = sqlx::query_as::<_, ApplicationRow>(
            r#"SELECT * FROM applications WHERE candidate_id = $1 ORDER BY applied_at DESC"#,
        )
        .bind(candidate_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Application::try_from).collect()
    }

    async fn list_for_vacancy(&self, vacancy_id: Uuid) -> Result<Vec<Application>> {
        let rows = sqlx::query_as::<_, ApplicationRow>(
            r#"SELECT * FROM applications WHERE vacancy_id = $1 ORDER BY applied_at DESC"#,
        )
        .bind(vacancy_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Application::try_from).collect()
    }

    async fn compare_and_set(
        &self,
        id: Uuid,
        expected: StageState,
        next: StageState,
        at: DateTime<Utc>,
    ) -> Result<Option<Application>> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"
            UPDATE applications
            SET administration_status = $2,
                assessment_status = $3,
                interview_status = $4,
                interview_result = $5,
                updated_at = $6
            WHERE id = $1
              AND administration_status = $7
              AND assessment_status = $8
              AND interview_status = $9
              AND interview_result IS NOT DISTINCT FROM $10
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(next.administration.as_str())
        .bind(next.assessment.as_str())
        .bind(next.interview.as_str())
        .bind(next.interview_result.map(|r| r.as_str()))
        .bind(at)
        .bind(expected.administration.as_str())
        .bind(expected.assessment.as_str())
        .bind(expected.interview.as_str())
        .bind(expected.interview_result.map(|r| r.as_str()))
        .fetch_optional(&self.pool)
        .await?;
        row.map(Application::try_from).transpose()
    }
}

#[async_trait]
impl SessionRepository for PgStore {
    async fn insert(&self, session: &AssessmentSession) -> Result<()> {
        let snapshot = serde_json::to_value(&session.questions)?;
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO assessment_sessions (
                id, application_id, question_pack_id, questions_snapshot,
                started_at, duration_seconds, deadline_at, state, concluded_at,
                current_index, marked_questions
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (application_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(session.id)
        .bind(session.application_id)
        .bind(session.question_pack_id)
        .bind(snapshot)
        .bind(session.started_at)
        .bind(session.duration_seconds)
        .bind(session.deadline_at)
        .bind(session.state.as_str())
        .bind(session.concluded_at)
        .bind(session.cursor.current_index as i32)
        .bind(marked_to_db(&session.cursor))
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(_) => Ok(()),
            None => Err(Error::InvalidState(
                "An assessment session already exists for this application".to_string(),
            )),
        }
    }

    async fn find(&self, id: Uuid) -> Result<Option<AssessmentSession>> {
        let row = sqlx::query_as::<_, AssessmentSessionRow>(
            r#"SELECT * FROM assessment_sessions WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AssessmentSession::try_from).transpose()
    }

    async fn find_by_application(&self, application_id: Uuid) -> Result<Option<AssessmentSession>> {
        let row = sqlx::query_as::<_, AssessmentSessionRow>(
            r#"SELECT * FROM assessment_sessions WHERE application_id = $1"#,
        )
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AssessmentSession::try_from).transpose()
    }

    async fn conclude(
        &self,
        id: Uuid,
        state: SessionState,
        at: DateTime<Utc>,
    ) -> Result<Option<AssessmentSession>> {
        let row = sqlx::query_as::<_, AssessmentSessionRow>(
            r#"
            UPDATE assessment_sessions
            SET state = $2, concluded_at = $3
            WHERE id = $1 AND state = 'active'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(state.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AssessmentSession::try_from).transpose()
    }

    async fn save_cursor(&self, id: Uuid, cursor: &SessionCursor) -> Result<Option<AssessmentSession>> {
        let row = sqlx::query_as::<_, AssessmentSessionRow>(
            r#"
            UPDATE assessment_sessions
            SET current_index = $2, marked_questions = $3
            WHERE id = $1 AND state = 'active'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(cursor.current_index as i32)
        .bind(marked_to_db(cursor))
        .fetch_optional(&self.pool)
        .await?;
        row.map(AssessmentSession::try_from).transpose()
    }

    async fn list_overdue(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<AssessmentSession>> {
        let rows = sqlx::query_as::<_, AssessmentSessionRow>(
            r#"
            SELECT * FROM assessment_sessions
            WHERE state = 'active' AND deadline_at <= $1
            ORDER BY deadline_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AssessmentSession::try_from).collect()
    }
}

#[async_trait]
impl AnswerRepository for PgStore {
    async fn upsert(
        &self,
        session_id: Uuid,
        question_id: i32,
        value: &str,
        answered_at: DateTime<Utc>,
    ) -> Result<AnswerWrite> {
        let mut tx = self.pool.begin().await?;

        // FOR SHARE blocks a concurrent conclusion until this write commits.
        let gate: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            r#"SELECT state, deadline_at FROM assessment_sessions WHERE id = $1 FOR SHARE"#,
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((state, deadline_at)) = gate else {
            return Err(Error::NotFound(format!("Session {} not found", session_id)));
        };
        if state != SessionState::Active.as_str() || answered_at >= deadline_at {
            tx.rollback().await?;
            return Ok(AnswerWrite::Refused);
        }

        let existing = sqlx::query_as::<_, Answer>(
            r#"SELECT * FROM answers WHERE session_id = $1 AND question_id = $2"#,
        )
        .bind(session_id)
        .bind(question_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(existing) = existing {
            if existing.value == value {
                tx.commit().await?;
                return Ok(AnswerWrite::Unchanged(existing));
            }
        }

        let stored = sqlx::query_as::<_, Answer>(
            r#"
            INSERT INTO answers (session_id, question_id, value, answered_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (session_id, question_id)
            DO UPDATE SET value = EXCLUDED.value, answered_at = EXCLUDED.answered_at
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(question_id)
        .bind(value)
        .bind(answered_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(AnswerWrite::Stored(stored))
    }

    async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<Answer>> {
        let rows = sqlx::query_as::<_, Answer>(
            r#"SELECT * FROM answers WHERE session_id = $1 ORDER BY question_id"#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl QuestionSetProvider for PgStore {
    async fn load_pack(&self, pack_id: Uuid) -> Result<Option<QuestionPack>> {
        let row = sqlx::query_as::<_, QuestionPackRow>(
            r#"SELECT id, title, questions, updated_at FROM question_packs WHERE id = $1"#,
        )
        .bind(pack_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(QuestionPack::try_from).transpose()
    }
}

#[async_trait]
impl CandidateRepository for PgStore {
    async fn find_profile(&self, candidate_id: Uuid) -> Result<Option<CandidateProfile>> {
        let profile = sqlx::query_as::<_, CandidateProfile>(
            r#"SELECT id, name, education_major FROM candidates WHERE id = $1"#,
        )
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }
}

#[async_trait]
impl VacancyRepository for PgStore {
    async fn find(&self, vacancy_id: Uuid) -> Result<Option<Vacancy>> {
        let vacancy = sqlx::query_as::<_, Vacancy>(
            r#"SELECT id, period_id, title, required_major, published_at FROM vacancies WHERE id = $1"#,
        )
        .bind(vacancy_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(vacancy)
    }

    async fn list_open(&self) -> Result<Vec<Vacancy>> {
        let vacancies = sqlx::query_as::<_, Vacancy>(
            r#"
            SELECT id, period_id, title, required_major, published_at
            FROM vacancies
            WHERE status = 'published'
            ORDER BY published_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(vacancies)
    }
}

#[async_trait]
impl OutboxRepository for PgStore {
    async fn enqueue(&self, event: &StageEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stage_events (
                id, application_id, event_type, payload, status, attempts,
                next_retry_at, last_error, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            "#,
        )
        .bind(event.id)
        .bind(event.application_id)
        .bind(event.kind.as_str())
        .bind(&event.payload)
        .bind(event.status.as_str())
        .bind(event.attempts)
        .bind(event.next_retry_at)
        .bind(&event.last_error)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<StageEvent>> {
        let row = sqlx::query_as::<_, StageEventRow>(
            r#"
            UPDATE stage_events
            SET status = 'delivering', updated_at = $1
            WHERE id = (
                SELECT id FROM stage_events
                WHERE (status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= $1))
                   OR (status = 'delivering' AND updated_at <= $2)
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await?;
        row.map(StageEvent::try_from).transpose()
    }

    async fn record_delivery(&self, id: Uuid, result: DeliveryResult, at: DateTime<Utc>) -> Result<()> {
        let (status, error, next_retry_at) = match result {
            DeliveryResult::Delivered => ("delivered", None, None),
            DeliveryResult::Retry { error, next_retry_at } => ("pending", Some(error), Some(next_retry_at)),
            DeliveryResult::GaveUp { error } => ("failed", Some(error), None),
        };
        sqlx::query(
            r#"
            UPDATE stage_events
            SET status = $2, last_error = $3, next_retry_at = $4,
                attempts = attempts + 1, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(error)
        .bind(next_retry_at)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn history(&self, application_id: Uuid) -> Result<Vec<StageEvent>> {
        let rows = sqlx::query_as::<_, StageEventRow>(
            r#"SELECT * FROM stage_events WHERE application_id = $1 ORDER BY created_at ASC, id ASC"#,
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(StageEvent::try_from).collect()
    }
}
