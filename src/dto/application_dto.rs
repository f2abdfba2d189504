use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::application::{
    AdministrationStatus, Application, AssessmentStatus, InterviewStatus, StageResult,
};
use crate::models::stage_event::{DeliveryStatus, StageEvent, StageEventKind};
use crate::services::matching_service::MatchScore;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApplyRequest {
    pub vacancy_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StageDecisionRequest {
    pub result: StageResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationResponse {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub vacancy_id: Uuid,
    pub vacancy_period_id: Uuid,
    pub administration_status: AdministrationStatus,
    pub assessment_status: AssessmentStatus,
    pub interview_status: InterviewStatus,
    pub interview_result: Option<StageResult>,
    pub applied_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Application> for ApplicationResponse {
    fn from(a: Application) -> Self {
        Self {
            id: a.id,
            candidate_id: a.candidate_id,
            vacancy_id: a.vacancy_id,
            vacancy_period_id: a.vacancy_period_id,
            administration_status: a.stages.administration,
            assessment_status: a.stages.assessment,
            interview_status: a.stages.interview,
            interview_result: a.stages.interview_result,
            applied_at: a.applied_at,
            updated_at: a.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationListResponse {
    pub items: Vec<ApplicationResponse>,
    pub total: usize,
}

impl From<Vec<Application>> for ApplicationListResponse {
    fn from(items: Vec<Application>) -> Self {
        let items: Vec<ApplicationResponse> = items.into_iter().map(Into::into).collect();
        Self {
            total: items.len(),
            items,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEventResponse {
    pub id: Uuid,
    pub event: StageEventKind,
    pub payload: serde_json::Value,
    pub delivery_status: DeliveryStatus,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl From<StageEvent> for StageEventResponse {
    fn from(e: StageEvent) -> Self {
        Self {
            id: e.id,
            event: e.kind,
            payload: e.payload,
            delivery_status: e.status,
            attempts: e.attempts,
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationListResponse {
    pub items: Vec<MatchScore>,
}
