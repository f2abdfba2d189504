use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::database::{AnswerRepository, QuestionSetProvider, SessionRepository};
use crate::error::{ClosedReason, Error, Result};
use crate::models::answer::{Answer, AnswerWrite};
use crate::models::application::{Application, AssessmentOutcome, AssessmentStatus};
use crate::models::assessment_session::{
    AssessmentSession, Navigation, SessionCursor, SessionState,
};
use crate::models::question::Question;
use crate::services::pipeline_service::PipelineService;
use crate::utils::time::{remaining_seconds, Clock};

/// Upper bound on sessions expired per sweep run.
pub const EXPIRY_SWEEP_BATCH: i64 = 200;

#[derive(Debug, Clone, Serialize)]
pub struct SessionProgress {
    pub state: SessionState,
    pub answered: usize,
    pub total: usize,
    pub deadline_at: DateTime<Utc>,
    pub remaining_seconds: i64,
}

/// Runs timed assessment attempts. The server clock is the only authority
/// on the deadline; every read and write re-checks it.
#[derive(Clone)]
pub struct SessionService {
    sessions: Arc<dyn SessionRepository>,
    answers: Arc<dyn AnswerRepository>,
    questions: Arc<dyn QuestionSetProvider>,
    pipeline: PipelineService,
    clock: Arc<dyn Clock>,
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        answers: Arc<dyn AnswerRepository>,
        questions: Arc<dyn QuestionSetProvider>,
        pipeline: PipelineService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            answers,
            questions,
            pipeline,
            clock,
        }
    }

    pub async fn start_session(
        &self,
        application_id: Uuid,
        question_pack_id: Uuid,
        duration_seconds: i64,
    ) -> Result<AssessmentSession> {
        if duration_seconds <= 0 {
            return Err(Error::BadRequest("duration_seconds must be positive".to_string()));
        }

        let application = self.pipeline.get_application(application_id).await?;
        if application.stages.assessment != AssessmentStatus::Scheduled {
            return Err(Error::InvalidState(format!(
                "assessment is {}, not scheduled",
                application.stages.assessment
            )));
        }

        let pack = self
            .questions
            .load_pack(question_pack_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Question pack {} not found", question_pack_id)))?;
        if pack.questions.is_empty() {
            return Err(Error::BadRequest(format!(
                "Question pack {} has no questions",
                question_pack_id
            )));
        }

        let session = AssessmentSession::start(
            application_id,
            question_pack_id,
            pack.questions,
            duration_seconds,
            self.clock.now(),
        )?;
        self.sessions.insert(&session).await?;
        self.pipeline.mark_assessment_started(application_id).await?;

        tracing::info!(
            session_id = %session.id,
            application_id = %application_id,
            question_pack_id = %question_pack_id,
            questions = session.total_questions(),
            deadline_at = %session.deadline_at,
            "assessment session started"
        );
        Ok(session)
    }

    /// Application a session belongs to, without touching its state.
    pub async fn application_id_for(&self, session_id: Uuid) -> Result<Uuid> {
        Ok(self.find(session_id).await?.application_id)
    }

    async fn find(&self, session_id: Uuid) -> Result<AssessmentSession> {
        self.sessions
            .find(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Session {} not found", session_id)))
    }

    /// Loads a session, expiring it first if its deadline has passed.
    pub async fn get_session(&self, session_id: Uuid) -> Result<AssessmentSession> {
        let session = self.find(session_id).await?;
        if session.is_overdue_at(self.clock.now()) {
            return self.expire(session).await;
        }
        Ok(session)
    }

    pub async fn questions(&self, session_id: Uuid) -> Result<Vec<Question>> {
        Ok(self.get_session(session_id).await?.questions)
    }

    pub async fn answers(&self, session_id: Uuid) -> Result<Vec<Answer>> {
        self.find(session_id).await?;
        self.answers.list_for_session(session_id).await
    }

    pub async fn progress(&self, session_id: Uuid) -> Result<SessionProgress> {
        let session = self.get_session(session_id).await?;
        let answers = self.answers.list_for_session(session_id).await?;
        let in_snapshot: HashSet<i32> = session.questions.iter().map(|q| q.id).collect();
        let answered = answers
            .iter()
            .map(|a| a.question_id)
            .filter(|id| in_snapshot.contains(id))
            .collect::<HashSet<_>>()
            .len();

        Ok(SessionProgress {
            state: session.state,
            answered,
            total: session.total_questions(),
            deadline_at: session.deadline_at,
            remaining_seconds: match session.state {
                SessionState::Active => remaining_seconds(session.deadline_at, self.clock.now()),
                SessionState::Completed | SessionState::TimedOut => 0,
            },
        })
    }

    /// Upserts one answer. Re-submitting the same value changes nothing.
    pub async fn submit_answer(&self, session_id: Uuid, question_id: i32, value: &str) -> Result<Answer> {
        let session = self.find(session_id).await?;
        let now = self.clock.now();
        self.ensure_open(&session, now).await?;

        let question = session.question(question_id)?;
        let option = question.resolve_option(value).ok_or_else(|| {
            Error::BadRequest(format!(
                "'{}' is not an option of question {}",
                value.trim(),
                question_id
            ))
        })?;

        match self
            .answers
            .upsert(session_id, question_id, &option.key, now)
            .await?
        {
            AnswerWrite::Stored(answer) => {
                tracing::debug!(session_id = %session_id, question_id, "answer stored");
                Ok(answer)
            }
            AnswerWrite::Unchanged(answer) => Ok(answer),
            AnswerWrite::Refused => {
                // concluded between our read and the store's check
                let fresh = self.find(session_id).await?;
                Err(self.closed_error(fresh, now).await)
            }
        }
    }

    pub async fn mark_question(
        &self,
        session_id: Uuid,
        question_index: usize,
        marked: bool,
    ) -> Result<SessionCursor> {
        let session = self.find(session_id).await?;
        let now = self.clock.now();
        self.ensure_open(&session, now).await?;
        let cursor = session.with_mark(question_index, marked)?;
        self.store_cursor(session_id, cursor, now).await
    }

    pub async fn navigate(&self, session_id: Uuid, nav: Navigation) -> Result<SessionCursor> {
        let session = self.find(session_id).await?;
        let now = self.clock.now();
        self.ensure_open(&session, now).await?;
        let cursor = session.with_navigation(nav)?;
        self.store_cursor(session_id, cursor, now).await
    }

    async fn store_cursor(
        &self,
        session_id: Uuid,
        cursor: SessionCursor,
        now: DateTime<Utc>,
    ) -> Result<SessionCursor> {
        match self.sessions.save_cursor(session_id, &cursor).await? {
            Some(saved) => Ok(saved.cursor),
            None => {
                let fresh = self.find(session_id).await?;
                Err(self.closed_error(fresh, now).await)
            }
        }
    }

    /// Explicit submission by the candidate.
    pub async fn finish_session(&self, session_id: Uuid) -> Result<AssessmentSession> {
        let session = self.find(session_id).await?;
        match session.state {
            SessionState::Active => {}
            SessionState::Completed | SessionState::TimedOut => {
                return Err(Error::InvalidTransition(format!(
                    "session is already {}",
                    session.state
                )))
            }
        }
        let now = self.clock.now();
        if session.is_overdue_at(now) {
            tracing::warn!(session_id = %session_id, "finish arrived after the deadline");
            self.expire(session).await?;
            return Err(Error::SessionClosed(ClosedReason::TimeExpired));
        }

        match self
            .sessions
            .conclude(session_id, SessionState::Completed, now)
            .await?
        {
            Some(done) => {
                tracing::info!(
                    session_id = %session_id,
                    application_id = %done.application_id,
                    "assessment session completed"
                );
                self.pipeline
                    .on_assessment_concluded(done.application_id, AssessmentOutcome::Completed)
                    .await?;
                Ok(done)
            }
            None => {
                let fresh = self.find(session_id).await?;
                Err(Error::InvalidTransition(format!(
                    "session is already {}",
                    fresh.state
                )))
            }
        }
    }

    /// Time-driven termination. Safe to call any number of times; once the
    /// session is terminal every further call returns it unchanged.
    pub async fn expire_session(&self, session_id: Uuid) -> Result<AssessmentSession> {
        let session = self.find(session_id).await?;
        match session.state {
            SessionState::Active => {}
            SessionState::Completed | SessionState::TimedOut => return Ok(session),
        }
        if !session.is_overdue_at(self.clock.now()) {
            return Err(Error::InvalidTransition(format!(
                "session deadline {} has not passed",
                session.deadline_at
            )));
        }
        self.expire(session).await
    }

    async fn expire(&self, session: AssessmentSession) -> Result<AssessmentSession> {
        let concluded = self
            .sessions
            .conclude(session.id, SessionState::TimedOut, session.deadline_at)
            .await?;
        let current = match concluded {
            Some(done) => {
                tracing::info!(
                    session_id = %done.id,
                    application_id = %done.application_id,
                    "assessment session timed out"
                );
                done
            }
            None => self.find(session.id).await?,
        };
        if let Some(outcome) = current.state.outcome() {
            self.pipeline
                .on_assessment_concluded(current.application_id, outcome)
                .await?;
        }
        Ok(current)
    }

    async fn ensure_open(&self, session: &AssessmentSession, now: DateTime<Utc>) -> Result<()> {
        if session.closed_reason_at(now).is_some() {
            return Err(self.closed_error(session.clone(), now).await);
        }
        Ok(())
    }

    /// Builds the rejection for a write at `now`, expiring the session on the way if due.
    async fn closed_error(&self, session: AssessmentSession, now: DateTime<Utc>) -> Error {
        let reason = session
            .closed_reason_at(now)
            .unwrap_or(ClosedReason::Submitted);
        if session.is_overdue_at(now) {
            tracing::warn!(session_id = %session.id, "write after deadline, expiring session");
            if let Err(e) = self.expire(session).await {
                tracing::error!(error = ?e, "failed to expire overdue session");
            }
        }
        Error::SessionClosed(reason)
    }

    /// Brings an application's assessment status in line with its session:
    /// expires an overdue session and re-delivers a terminal outcome the
    /// pipeline has not recorded yet.
    pub async fn reconcile_application(&self, application_id: Uuid) -> Result<Option<AssessmentSession>> {
        let Some(session) = self.sessions.find_by_application(application_id).await? else {
            return Ok(None);
        };
        if session.is_overdue_at(self.clock.now()) {
            return self.expire(session).await.map(Some);
        }
        if let Some(outcome) = session.state.outcome() {
            self.pipeline
                .on_assessment_concluded(application_id, outcome)
                .await?;
        }
        Ok(Some(session))
    }

    /// A candidate's applications, with any running assessment re-checked
    /// against the deadline first.
    pub async fn list_for_candidate(&self, candidate_id: Uuid) -> Result<Vec<Application>> {
        let applications = self.pipeline.list_for_candidate(candidate_id).await?;
        self.reconcile_all(applications).await
    }

    pub async fn list_for_vacancy(&self, vacancy_id: Uuid) -> Result<Vec<Application>> {
        let applications = self.pipeline.list_for_vacancy(vacancy_id).await?;
        self.reconcile_all(applications).await
    }

    async fn reconcile_all(&self, applications: Vec<Application>) -> Result<Vec<Application>> {
        let mut reconciled = Vec::with_capacity(applications.len());
        for application in applications {
            let open = matches!(
                application.stages.assessment,
                AssessmentStatus::Scheduled | AssessmentStatus::InProgress
            );
            if open && self.reconcile_application(application.id).await?.is_some() {
                reconciled.push(self.pipeline.get_application(application.id).await?);
            } else {
                reconciled.push(application);
            }
        }
        Ok(reconciled)
    }

    /// Expires up to `limit` sessions whose deadline has passed.
    pub async fn expire_overdue(&self, limit: i64) -> Result<usize> {
        let overdue = self.sessions.list_overdue(self.clock.now(), limit).await?;
        let mut expired = 0;
        for session in overdue {
            let id = session.id;
            match self.expire(session).await {
                Ok(_) => expired += 1,
                Err(e) => tracing::error!(session_id = %id, error = ?e, "failed to expire session"),
            }
        }
        if expired > 0 {
            tracing::info!(expired, "expired overdue assessment sessions");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::database::MockQuestionSetProvider;
    use crate::models::candidate::CandidateProfile;
    use crate::models::question::{QuestionOption, QuestionPack};
    use crate::models::vacancy::Vacancy;
    use crate::services::notification_service::NotificationService;
    use crate::models::application::StageResult;
    use crate::utils::time::ManualClock;
    use chrono::Duration;

    fn pack(id: Uuid, n: i32) -> QuestionPack {
        QuestionPack {
            id,
            title: "Psychometric".into(),
            questions: (1..=n)
                .map(|qid| Question {
                    id: qid,
                    prompt: format!("Q{}", qid),
                    options: vec![
                        QuestionOption { key: "A".into(), text: "Agree".into() },
                        QuestionOption { key: "B".into(), text: "Disagree".into() },
                    ],
                })
                .collect(),
            updated_at: Utc::now(),
        }
    }

    async fn scheduled_application(
        store: &Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    ) -> (PipelineService, Uuid) {
        let candidate = Uuid::new_v4();
        let vacancy = Uuid::new_v4();
        store
            .put_candidate(CandidateProfile {
                id: candidate,
                name: "Sari".into(),
                education_major: Some("Psikologi".into()),
            })
            .await;
        store
            .put_vacancy(Vacancy {
                id: vacancy,
                period_id: Uuid::new_v4(),
                title: "HR Officer".into(),
                required_major: None,
                published_at: Utc::now(),
            })
            .await;
        let notifications = NotificationService::new(store.clone(), clock.clone(), None, String::new());
        let pipeline = PipelineService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            notifications,
            clock,
        );
        let application = pipeline.apply_to_vacancy(candidate, vacancy).await.unwrap();
        pipeline
            .set_administration_result(application.id, StageResult::Passed)
            .await
            .unwrap();
        (pipeline, application.id)
    }

    #[tokio::test]
    async fn question_set_is_loaded_once_at_start() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let (pipeline, application_id) = scheduled_application(&store, clock.clone()).await;

        let pack_id = Uuid::new_v4();
        let mut provider = MockQuestionSetProvider::new();
        provider
            .expect_load_pack()
            .withf(move |id| *id == pack_id)
            .times(1)
            .returning(move |id| Ok(Some(pack(id, 3))));

        let service = SessionService::new(
            store.clone(),
            store.clone(),
            Arc::new(provider),
            pipeline,
            clock.clone(),
        );
        let session = service.start_session(application_id, pack_id, 600).await.unwrap();

        service.submit_answer(session.id, 2, "Agree").await.unwrap();
        clock.advance(Duration::seconds(30));
        let progress = service.progress(session.id).await.unwrap();
        assert_eq!(progress.total, 3);
        assert_eq!(progress.answered, 1);
        assert_eq!(progress.remaining_seconds, 570);
        assert_eq!(service.questions(session.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_pack_is_not_found_and_leaves_assessment_scheduled() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let (pipeline, application_id) = scheduled_application(&store, clock.clone()).await;

        let mut provider = MockQuestionSetProvider::new();
        provider.expect_load_pack().returning(|_| Ok(None));

        let service = SessionService::new(
            store.clone(),
            store.clone(),
            Arc::new(provider),
            pipeline.clone(),
            clock,
        );
        let err = service
            .start_session(application_id, Uuid::new_v4(), 600)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let application = pipeline.get_application(application_id).await.unwrap();
        assert_eq!(application.stages.assessment, AssessmentStatus::Scheduled);
    }

    #[tokio::test]
    async fn empty_pack_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let (pipeline, application_id) = scheduled_application(&store, clock.clone()).await;

        let mut provider = MockQuestionSetProvider::new();
        provider.expect_load_pack().returning(|id| Ok(Some(pack(id, 0))));

        let service = SessionService::new(store.clone(), store.clone(), Arc::new(provider), pipeline, clock);
        let err = service
            .start_session(application_id, Uuid::new_v4(), 600)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn oversized_duration_is_rejected_without_starting() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let (pipeline, application_id) = scheduled_application(&store, clock.clone()).await;

        let mut provider = MockQuestionSetProvider::new();
        provider.expect_load_pack().returning(|id| Ok(Some(pack(id, 3))));

        let service = SessionService::new(
            store.clone(),
            store.clone(),
            Arc::new(provider),
            pipeline.clone(),
            clock,
        );
        let err = service
            .start_session(application_id, Uuid::new_v4(), 10_000_000_000_000)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        let application = pipeline.get_application(application_id).await.unwrap();
        assert_eq!(application.stages.assessment, AssessmentStatus::Scheduled);
        assert!(service.reconcile_application(application_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reading_questions_after_the_deadline_expires_the_session() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let (pipeline, application_id) = scheduled_application(&store, clock.clone()).await;

        let mut provider = MockQuestionSetProvider::new();
        provider.expect_load_pack().returning(|id| Ok(Some(pack(id, 2))));

        let service = SessionService::new(
            store.clone(),
            store.clone(),
            Arc::new(provider),
            pipeline.clone(),
            clock.clone(),
        );
        let session = service.start_session(application_id, Uuid::new_v4(), 60).await.unwrap();
        clock.advance(Duration::seconds(61));

        assert_eq!(service.questions(session.id).await.unwrap().len(), 2);
        let stored = SessionRepository::find(store.as_ref(), session.id).await.unwrap().unwrap();
        assert_eq!(stored.state, SessionState::TimedOut);
        let application = pipeline.get_application(application_id).await.unwrap();
        assert_eq!(application.stages.assessment, AssessmentStatus::TimedOut);
    }
}
