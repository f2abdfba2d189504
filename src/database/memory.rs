use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::database::{
    AnswerRepository, ApplicationRepository, CandidateRepository, OutboxRepository,
    QuestionSetProvider, SessionRepository, VacancyRepository,
};
use crate::error::{Error, Result};
use crate::models::answer::{Answer, AnswerWrite};
use crate::models::application::{Application, NewApplication, StageState};
use crate::models::assessment_session::{AssessmentSession, SessionCursor, SessionState};
use crate::models::candidate::CandidateProfile;
use crate::models::question::QuestionPack;
use crate::models::stage_event::{DeliveryResult, DeliveryStatus, StageEvent};
use crate::models::vacancy::Vacancy;

#[derive(Default)]
struct Tables {
    candidates: HashMap<Uuid, CandidateProfile>,
    vacancies: HashMap<Uuid, Vacancy>,
    packs: HashMap<Uuid, QuestionPack>,
    applications: HashMap<Uuid, Application>,
    sessions: HashMap<Uuid, AssessmentSession>,
    answers: HashMap<(Uuid, i32), Answer>,
    events: Vec<StageEvent>,
}

/// In-process store with the same guarantees as the Postgres one.
///
/// One lock covers every table, so each repository call is atomic with
/// respect to all others.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_candidate(&self, profile: CandidateProfile) {
        self.tables.lock().await.candidates.insert(profile.id, profile);
    }

    pub async fn put_vacancy(&self, vacancy: Vacancy) {
        self.tables.lock().await.vacancies.insert(vacancy.id, vacancy);
    }

    /// Creates or replaces a pack, as an administrator editing it would.
    pub async fn put_question_pack(&self, pack: QuestionPack) {
        self.tables.lock().await.packs.insert(pack.id, pack);
    }

    pub async fn events(&self) -> Vec<StageEvent> {
        self.tables.lock().await.events.clone()
    }
}

#[async_trait]
impl ApplicationRepository for MemoryStore {
    async fn insert(&self, new: NewApplication, stages: StageState) -> Result<Application> {
        let mut tables = self.tables.lock().await;
        let duplicate = tables.applications.values().any(|a| {
            a.candidate_id == new.candidate_id && a.vacancy_period_id == new.vacancy_period_id
        });
        if duplicate {
            return Err(Error::DuplicateApplication);
        }
        let application = Application {
            id: Uuid::new_v4(),
            candidate_id: new.candidate_id,
            vacancy_id: new.vacancy_id,
            vacancy_period_id: new.vacancy_period_id,
            stages,
            applied_at: new.applied_at,
            updated_at: new.applied_at,
        };
        tables.applications.insert(application.id, application.clone());
        Ok(application)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Application>> {
        Ok(self.tables.lock().await.applications.get(&id).cloned())
    }

    async fn list_for_candidate(&self, candidate_id: Uuid) -> Result<Vec<Application>> {
        let tables = self.tables.lock().await;
        let mut items: Vec<Application> = tables
            .applications
            .values()
            .filter(|a| a.candidate_id == candidate_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        Ok(items)
    }

    async fn list_for_vacancy(&self, vacancy_id: Uuid) -> Result<Vec<Application>> {
        let tables = self.tables.lock().await;
        let mut items: Vec<Application> = tables
            .applications
            .values()
            .filter(|a| a.vacancy_id == vacancy_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        Ok(items)
    }

    async fn compare_and_set(
        &self,
        id: Uuid,
        expected: StageState,
        next: StageState,
        at: DateTime<Utc>,
    ) -> Result<Option<Application>> {
        let mut tables = self.tables.lock().await;
        match tables.applications.get_mut(&id) {
            Some(application) if application.stages == expected => {
                application.stages = next;
                application.updated_at = at;
                Ok(Some(application.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn insert(&self, session: &AssessmentSession) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables
            .sessions
            .values()
            .any(|s| s.application_id == session.application_id)
        {
            return Err(Error::InvalidState(
                "An assessment session already exists for this application".to_string(),
            ));
        }
        tables.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<AssessmentSession>> {
        Ok(self.tables.lock().await.sessions.get(&id).cloned())
    }

    async fn find_by_application(&self, application_id: Uuid) -> Result<Option<AssessmentSession>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.application_id == application_id)
            .cloned())
    }

    async fn conclude(
        &self,
        id: Uuid,
        state: SessionState,
        at: DateTime<Utc>,
    ) -> Result<Option<AssessmentSession>> {
        let mut tables = self.tables.lock().await;
        match tables.sessions.get_mut(&id) {
            Some(session) if session.state == SessionState::Active => {
                session.state = state;
                session.concluded_at = Some(at);
                Ok(Some(session.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn save_cursor(&self, id: Uuid, cursor: &SessionCursor) -> Result<Option<AssessmentSession>> {
        let mut tables = self.tables.lock().await;
        match tables.sessions.get_mut(&id) {
            Some(session) if session.state == SessionState::Active => {
                session.cursor = cursor.clone();
                Ok(Some(session.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_overdue(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<AssessmentSession>> {
        let tables = self.tables.lock().await;
        let mut overdue: Vec<AssessmentSession> = tables
            .sessions
            .values()
            .filter(|s| s.is_overdue_at(now))
            .cloned()
            .collect();
        overdue.sort_by_key(|s| s.deadline_at);
        overdue.truncate(limit.max(0) as usize);
        Ok(overdue)
    }
}

#[async_trait]
impl AnswerRepository for MemoryStore {
    async fn upsert(
        &self,
        session_id: Uuid,
        question_id: i32,
        value: &str,
        answered_at: DateTime<Utc>,
    ) -> Result<AnswerWrite> {
        let mut tables = self.tables.lock().await;
        let session = tables
            .sessions
            .get(&session_id)
            .ok_or_else(|| Error::NotFound(format!("Session {} not found", session_id)))?;
        if !session.accepts_writes_at(answered_at) {
            return Ok(AnswerWrite::Refused);
        }

        let key = (session_id, question_id);
        if let Some(existing) = tables.answers.get(&key) {
            if existing.value == value {
                return Ok(AnswerWrite::Unchanged(existing.clone()));
            }
        }
        let answer = Answer {
            session_id,
            question_id,
            value: value.to_string(),
            answered_at,
        };
        tables.answers.insert(key, answer.clone());
        Ok(AnswerWrite::Stored(answer))
    }

    async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<Answer>> {
        let tables = self.tables.lock().await;
        let mut answers: Vec<Answer> = tables
            .answers
            .values()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect();
        answers.sort_by_key(|a| a.question_id);
        Ok(answers)
    }
}

#[async_trait]
impl QuestionSetProvider for MemoryStore {
    async fn load_pack(&self, pack_id: Uuid) -> Result<Option<QuestionPack>> {
        Ok(self.tables.lock().await.packs.get(&pack_id).cloned())
    }
}

#[async_trait]
impl CandidateRepository for MemoryStore {
    async fn find_profile(&self, candidate_id: Uuid) -> Result<Option<CandidateProfile>> {
        Ok(self.tables.lock().await.candidates.get(&candidate_id).cloned())
    }
}

#[async_trait]
impl VacancyRepository for MemoryStore {
    async fn find(&self, vacancy_id: Uuid) -> Result<Option<Vacancy>> {
        Ok(self.tables.lock().await.vacancies.get(&vacancy_id).cloned())
    }

    async fn list_open(&self) -> Result<Vec<Vacancy>> {
        let tables = self.tables.lock().await;
        let mut vacancies: Vec<Vacancy> = tables.vacancies.values().cloned().collect();
        vacancies.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(vacancies)
    }
}

#[async_trait]
impl OutboxRepository for MemoryStore {
    async fn enqueue(&self, event: &StageEvent) -> Result<()> {
        self.tables.lock().await.events.push(event.clone());
        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<StageEvent>> {
        let mut tables = self.tables.lock().await;
        let due = tables.events.iter_mut().find(|e| match e.status {
            DeliveryStatus::Pending => e.next_retry_at.map_or(true, |at| at <= now),
            DeliveryStatus::Delivering => e.updated_at <= stale_before,
            _ => false,
        });
        Ok(due.map(|event| {
            event.status = DeliveryStatus::Delivering;
            event.updated_at = now;
            event.clone()
        }))
    }

    async fn record_delivery(&self, id: Uuid, result: DeliveryResult, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let event = tables
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::NotFound(format!("Stage event {} not found", id)))?;
        event.attempts += 1;
        event.updated_at = at;
        match result {
            DeliveryResult::Delivered => {
                event.status = DeliveryStatus::Delivered;
                event.last_error = None;
                event.next_retry_at = None;
            }
            DeliveryResult::Retry { error, next_retry_at } => {
                event.status = DeliveryStatus::Pending;
                event.last_error = Some(error);
                event.next_retry_at = Some(next_retry_at);
            }
            DeliveryResult::GaveUp { error } => {
                event.status = DeliveryStatus::Failed;
                event.last_error = Some(error);
                event.next_retry_at = None;
            }
        }
        Ok(())
    }

    async fn history(&self, application_id: Uuid) -> Result<Vec<StageEvent>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .events
            .iter()
            .filter(|e| e.application_id == application_id)
            .cloned()
            .collect())
    }
}
