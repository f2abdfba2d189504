use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::database::{ApplicationRepository, CandidateRepository, VacancyRepository};
use crate::error::{Error, Result};
use crate::models::application::{
    Application, AssessmentOutcome, NewApplication, StageResult, StageState, Transition,
};
use crate::models::stage_event::{StageEvent, StageEventKind};
use crate::services::matching_service::is_eligible;
use crate::services::notification_service::NotificationService;
use crate::utils::time::Clock;

/// Attempts at a conditional update before giving up on a hot application.
const MAX_STAGE_WRITE_ATTEMPTS: usize = 5;

/// Authoritative owner of per-application stage status.
#[derive(Clone)]
pub struct PipelineService {
    applications: Arc<dyn ApplicationRepository>,
    candidates: Arc<dyn CandidateRepository>,
    vacancies: Arc<dyn VacancyRepository>,
    notifications: NotificationService,
    clock: Arc<dyn Clock>,
}

impl PipelineService {
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        candidates: Arc<dyn CandidateRepository>,
        vacancies: Arc<dyn VacancyRepository>,
        notifications: NotificationService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            applications,
            candidates,
            vacancies,
            notifications,
            clock,
        }
    }

    pub async fn apply_to_vacancy(&self, candidate_id: Uuid, vacancy_id: Uuid) -> Result<Application> {
        let profile = self
            .candidates
            .find_profile(candidate_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Candidate {} not found", candidate_id)))?;
        let major = profile.major().ok_or(Error::IncompleteProfile)?;

        let vacancy = self
            .vacancies
            .find(vacancy_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Vacancy {} not found", vacancy_id)))?;

        if !is_eligible(Some(major), vacancy.required_major.as_deref()) {
            tracing::info!(
                candidate_id = %candidate_id,
                vacancy_id = %vacancy_id,
                "application rejected: major mismatch"
            );
            return Err(Error::MajorMismatch {
                candidate_major: major.to_string(),
                required_major: vacancy.required_major.unwrap_or_default().trim().to_string(),
            });
        }

        let application = self
            .applications
            .insert(
                NewApplication {
                    candidate_id,
                    vacancy_id,
                    vacancy_period_id: vacancy.period_id,
                    applied_at: self.clock.now(),
                },
                StageState::new(),
            )
            .await?;

        tracing::info!(
            application_id = %application.id,
            candidate_id = %candidate_id,
            vacancy_id = %vacancy_id,
            "application submitted"
        );
        self.emit(&application, StageEventKind::ApplicationSubmitted, json!({}))
            .await;
        Ok(application)
    }

    pub async fn get_application(&self, id: Uuid) -> Result<Application> {
        self.applications
            .find(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Application {} not found", id)))
    }

    pub async fn list_for_candidate(&self, candidate_id: Uuid) -> Result<Vec<Application>> {
        self.applications.list_for_candidate(candidate_id).await
    }

    pub async fn list_for_vacancy(&self, vacancy_id: Uuid) -> Result<Vec<Application>> {
        self.applications.list_for_vacancy(vacancy_id).await
    }

    pub async fn history(&self, id: Uuid) -> Result<Vec<StageEvent>> {
        self.get_application(id).await?;
        self.notifications.history(id).await
    }

    pub async fn set_administration_result(&self, id: Uuid, result: StageResult) -> Result<Application> {
        let (application, _) = self
            .transition(id, |stages| {
                stages.decide_administration(result).map(Transition::Changed)
            })
            .await?;
        tracing::info!(application_id = %id, result = %result, "administration decided");
        self.emit(
            &application,
            StageEventKind::AdministrationDecided,
            json!({ "result": result }),
        )
        .await;
        Ok(application)
    }

    /// Called when a session opens; a repeat call is a no-op.
    pub async fn mark_assessment_started(&self, id: Uuid) -> Result<Application> {
        let (application, changed) = self.transition(id, StageState::start_assessment).await?;
        if changed {
            tracing::info!(application_id = %id, "assessment started");
            self.emit(&application, StageEventKind::AssessmentStarted, json!({}))
                .await;
        }
        Ok(application)
    }

    /// Records a session's terminal outcome. Repeated signals leave the
    /// first recorded outcome in place and succeed without effect.
    pub async fn on_assessment_concluded(
        &self,
        id: Uuid,
        outcome: AssessmentOutcome,
    ) -> Result<Application> {
        let (application, changed) = self
            .transition(id, |stages| stages.conclude_assessment(outcome))
            .await?;
        if changed {
            tracing::info!(application_id = %id, outcome = %outcome, "assessment concluded");
            self.emit(
                &application,
                StageEventKind::AssessmentConcluded,
                json!({ "outcome": outcome }),
            )
            .await;
        } else {
            tracing::debug!(
                application_id = %id,
                outcome = %outcome,
                recorded = %application.stages.assessment,
                "assessment already concluded"
            );
        }
        Ok(application)
    }

    pub async fn set_interview_result(&self, id: Uuid, result: StageResult) -> Result<Application> {
        let (application, _) = self
            .transition(id, |stages| stages.decide_interview(result).map(Transition::Changed))
            .await?;
        tracing::info!(application_id = %id, result = %result, "interview decided");
        self.emit(
            &application,
            StageEventKind::InterviewDecided,
            json!({ "result": result }),
        )
        .await;
        Ok(application)
    }

    /// Load, compute the next triple, write it only if nobody else moved the
    /// application in between; on a lost race, recompute from fresh state.
    async fn transition<F>(&self, id: Uuid, step: F) -> Result<(Application, bool)>
    where
        F: Fn(&StageState) -> Result<Transition> + Send,
    {
        for _ in 0..MAX_STAGE_WRITE_ATTEMPTS {
            let current = self.get_application(id).await?;
            let next = match step(&current.stages)? {
                Transition::Unchanged => return Ok((current, false)),
                Transition::Changed(next) => next,
            };
            if !next.is_consistent() {
                return Err(Error::Internal(format!(
                    "stage transition produced an inconsistent state: {:?}",
                    next
                )));
            }
            if let Some(updated) = self
                .applications
                .compare_and_set(id, current.stages, next, self.clock.now())
                .await?
            {
                return Ok((updated, true));
            }
            tracing::debug!(application_id = %id, "concurrent stage update, re-evaluating");
        }
        Err(Error::Internal(format!(
            "application {} is under heavy concurrent modification",
            id
        )))
    }

    async fn emit(&self, application: &Application, kind: StageEventKind, detail: JsonValue) {
        let mut payload = json!({
            "event": kind,
            "application_id": application.id,
            "candidate_id": application.candidate_id,
            "vacancy_id": application.vacancy_id,
            "stages": application.stages,
        });
        if let (Some(fields), JsonValue::Object(extra)) = (payload.as_object_mut(), detail) {
            fields.extend(extra);
        }
        if let Err(e) = self.notifications.record(application.id, kind, payload).await {
            tracing::error!(application_id = %application.id, event = %kind, error = ?e, "failed to record stage event");
        }
    }
}
