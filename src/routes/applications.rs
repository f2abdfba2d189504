use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::application_dto::{
        ApplicationListResponse, ApplicationResponse, ApplyRequest, RecommendationListResponse,
    },
    dto::session_dto::{StartSessionRequest, StartSessionResponse},
    error::{Error, Result},
    middleware::auth::Claims,
    models::application::Application,
    AppState,
};

/// Loads an application and checks it belongs to the calling candidate.
/// Foreign applications are reported as missing.
pub(crate) async fn owned_application(
    state: &AppState,
    claims: &Claims,
    id: Uuid,
) -> Result<Application> {
    let candidate_id = claims.candidate_id()?;
    let application = state.pipeline_service.get_application(id).await?;
    if application.candidate_id != candidate_id {
        return Err(Error::NotFound(format!("Application {} not found", id)));
    }
    Ok(application)
}

#[utoipa::path(
    post,
    path = "/api/applications",
    request_body = ApplyRequest,
    responses(
        (status = 201, description = "Application submitted", body = Json<ApplicationResponse>),
        (status = 409, description = "Already applied in this period"),
        (status = 422, description = "Major mismatch or incomplete profile")
    )
)]
#[axum::debug_handler]
pub async fn apply(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ApplyRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let candidate_id = claims.candidate_id()?;
    let application = state
        .pipeline_service
        .apply_to_vacancy(candidate_id, payload.vacancy_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApplicationResponse::from(application))))
}

#[axum::debug_handler]
pub async fn list_own(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let candidate_id = claims.candidate_id()?;
    let items = state.session_service.list_for_candidate(candidate_id).await?;
    Ok(Json(ApplicationListResponse::from(items)))
}

#[utoipa::path(
    get,
    path = "/api/applications/{id}",
    params(
        ("id" = Uuid, Path, description = "Application ID")
    ),
    responses(
        (status = 200, description = "Application found", body = Json<ApplicationResponse>),
        (status = 404, description = "Application not found")
    )
)]
#[axum::debug_handler]
pub async fn get_own(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    owned_application(&state, &claims, id).await?;
    // a session left running past its deadline is settled before reporting
    state.session_service.reconcile_application(id).await?;
    let application = state.pipeline_service.get_application(id).await?;
    Ok(Json(ApplicationResponse::from(application)))
}

#[utoipa::path(
    post,
    path = "/api/applications/{id}/session",
    params(
        ("id" = Uuid, Path, description = "Application ID")
    ),
    request_body = StartSessionRequest,
    responses(
        (status = 201, description = "Assessment session started", body = Json<StartSessionResponse>),
        (status = 409, description = "Assessment is not scheduled")
    )
)]
#[axum::debug_handler]
pub async fn start_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    owned_application(&state, &claims, id).await?;
    let session = state
        .session_service
        .start_session(id, payload.question_pack_id, state.assessment_duration_seconds)
        .await?;
    let questions = session.questions.clone();
    Ok((
        StatusCode::CREATED,
        Json(StartSessionResponse {
            session: session.into(),
            questions,
        }),
    ))
}

#[axum::debug_handler]
pub async fn recommendations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let candidate_id = claims.candidate_id()?;
    let items = state
        .matching_service
        .recommend_for_candidate(candidate_id)
        .await?;
    Ok(Json(RecommendationListResponse { items }))
}
