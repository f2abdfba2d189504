use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::application_dto::{
        ApplicationListResponse, ApplicationResponse, StageDecisionRequest, StageEventResponse,
    },
    dto::session_dto::SweepResponse,
    error::Result,
    middleware::auth::Claims,
    services::session_service::EXPIRY_SWEEP_BATCH,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/staff/applications/{id}/administration",
    params(
        ("id" = Uuid, Path, description = "Application ID")
    ),
    request_body = StageDecisionRequest,
    responses(
        (status = 200, description = "Administration result recorded", body = Json<ApplicationResponse>),
        (status = 409, description = "Administration already decided")
    )
)]
#[axum::debug_handler]
pub async fn decide_administration(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StageDecisionRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    tracing::info!(staff = %claims.sub, application_id = %id, result = %payload.result, "administration decision");
    let application = state
        .pipeline_service
        .set_administration_result(id, payload.result)
        .await?;
    Ok(Json(ApplicationResponse::from(application)))
}

#[utoipa::path(
    post,
    path = "/api/staff/applications/{id}/interview",
    params(
        ("id" = Uuid, Path, description = "Application ID")
    ),
    request_body = StageDecisionRequest,
    responses(
        (status = 200, description = "Interview result recorded", body = Json<ApplicationResponse>),
        (status = 409, description = "Interview not scheduled")
    )
)]
#[axum::debug_handler]
pub async fn decide_interview(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StageDecisionRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    tracing::info!(staff = %claims.sub, application_id = %id, result = %payload.result, "interview decision");
    // an overdue assessment must be settled before the interview can be open
    state.session_service.reconcile_application(id).await?;
    let application = state
        .pipeline_service
        .set_interview_result(id, payload.result)
        .await?;
    Ok(Json(ApplicationResponse::from(application)))
}

#[axum::debug_handler]
pub async fn get_application(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.session_service.reconcile_application(id).await?;
    let application = state.pipeline_service.get_application(id).await?;
    Ok(Json(ApplicationResponse::from(application)))
}

#[axum::debug_handler]
pub async fn history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let events: Vec<StageEventResponse> = state
        .pipeline_service
        .history(id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(events))
}

#[axum::debug_handler]
pub async fn list_for_vacancy(
    State(state): State<AppState>,
    Path(vacancy_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let items = state.session_service.list_for_vacancy(vacancy_id).await?;
    Ok(Json(ApplicationListResponse::from(items)))
}

#[axum::debug_handler]
pub async fn sweep(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let expired = state.session_service.expire_overdue(EXPIRY_SWEEP_BATCH).await?;
    Ok(Json(SweepResponse { expired }))
}
