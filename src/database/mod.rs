//! Storage seams for the pipeline.
//!
//! Services only see these traits. [`postgres::PgStore`] backs them in
//! production; [`memory::MemoryStore`] gives the same semantics in-process.

pub mod memory;
pub mod pool;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::answer::{Answer, AnswerWrite};
use crate::models::application::{Application, NewApplication, StageState};
use crate::models::assessment_session::{AssessmentSession, SessionCursor, SessionState};
use crate::models::candidate::CandidateProfile;
use crate::models::question::QuestionPack;
use crate::models::stage_event::{DeliveryResult, StageEvent};
use crate::models::vacancy::Vacancy;

#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// Inserts a fresh application. Fails with `DuplicateApplication` when the
    /// candidate already holds one in the same vacancy period.
    async fn insert(&self, new: NewApplication, stages: StageState) -> Result<Application>;

    async fn find(&self, id: Uuid) -> Result<Option<Application>>;

    async fn list_for_candidate(&self, candidate_id: Uuid) -> Result<Vec<Application>>;

    async fn list_for_vacancy(&self, vacancy_id: Uuid) -> Result<Vec<Application>>;

    /// Writes `next` only if the stored stages still equal `expected`.
    /// Returns `None` when another writer got there first.
    async fn compare_and_set(
        &self,
        id: Uuid,
        expected: StageState,
        next: StageState,
        at: DateTime<Utc>,
    ) -> Result<Option<Application>>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Fails with `InvalidState` if the application already has a session.
    async fn insert(&self, session: &AssessmentSession) -> Result<()>;

    async fn find(&self, id: Uuid) -> Result<Option<AssessmentSession>>;

    async fn find_by_application(&self, application_id: Uuid) -> Result<Option<AssessmentSession>>;

    /// Moves an active session to `state`. Returns `None` if it was no longer active.
    async fn conclude(
        &self,
        id: Uuid,
        state: SessionState,
        at: DateTime<Utc>,
    ) -> Result<Option<AssessmentSession>>;

    /// Overwrites the navigation cursor of an active session.
    async fn save_cursor(&self, id: Uuid, cursor: &SessionCursor) -> Result<Option<AssessmentSession>>;

    async fn list_overdue(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<AssessmentSession>>;
}

#[async_trait]
pub trait AnswerRepository: Send + Sync {
    /// Upserts `(session_id, question_id)` while atomically checking that the
    /// session is still active and `answered_at` precedes its deadline.
    async fn upsert(
        &self,
        session_id: Uuid,
        question_id: i32,
        value: &str,
        answered_at: DateTime<Utc>,
    ) -> Result<AnswerWrite>;

    async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<Answer>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestionSetProvider: Send + Sync {
    async fn load_pack(&self, pack_id: Uuid) -> Result<Option<QuestionPack>>;
}

#[async_trait]
pub trait CandidateRepository: Send + Sync {
    async fn find_profile(&self, candidate_id: Uuid) -> Result<Option<CandidateProfile>>;
}

#[async_trait]
pub trait VacancyRepository: Send + Sync {
    async fn find(&self, vacancy_id: Uuid) -> Result<Option<Vacancy>>;

    async fn list_open(&self) -> Result<Vec<Vacancy>>;
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn enqueue(&self, event: &StageEvent) -> Result<()>;

    /// Claims the oldest pending event that is due, marking it as delivering.
    /// An event left delivering since before `stale_before` counts as
    /// abandoned and is claimed again.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<StageEvent>>;

    async fn record_delivery(&self, id: Uuid, result: DeliveryResult, at: DateTime<Utc>) -> Result<()>;

    async fn history(&self, application_id: Uuid) -> Result<Vec<StageEvent>>;
}

/// Everything the application needs from storage.
pub trait Store:
    ApplicationRepository
    + SessionRepository
    + AnswerRepository
    + QuestionSetProvider
    + CandidateRepository
    + VacancyRepository
    + OutboxRepository
{
}

impl<T> Store for T where
    T: ApplicationRepository
        + SessionRepository
        + AnswerRepository
        + QuestionSetProvider
        + CandidateRepository
        + VacancyRepository
        + OutboxRepository
{
}
