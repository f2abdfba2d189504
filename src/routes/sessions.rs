use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::session_dto::{
        CursorResponse, MarkQuestionRequest, SessionResponse, SessionStatusResponse,
        SubmitAnswerRequest, SubmitAnswerResponse,
    },
    error::Result,
    middleware::auth::Claims,
    models::assessment_session::Navigation,
    routes::applications::owned_application,
    AppState,
};

async fn ensure_owner(state: &AppState, claims: &Claims, session_id: Uuid) -> Result<()> {
    let application_id = state.session_service.application_id_for(session_id).await?;
    owned_application(state, claims, application_id).await?;
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Session state and progress", body = Json<SessionStatusResponse>),
        (status = 404, description = "Session not found")
    )
)]
#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    ensure_owner(&state, &claims, id).await?;
    let progress = state.session_service.progress(id).await?;
    let session = state.session_service.get_session(id).await?;
    Ok(Json(SessionStatusResponse {
        session: session.into(),
        progress,
    }))
}

#[axum::debug_handler]
pub async fn get_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    ensure_owner(&state, &claims, id).await?;
    let questions = state.session_service.questions(id).await?;
    Ok(Json(questions))
}

#[utoipa::path(
    put,
    path = "/api/sessions/{id}/answers",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = Json<SubmitAnswerResponse>),
        (status = 409, description = "Session already submitted"),
        (status = 410, description = "Time expired")
    )
)]
#[axum::debug_handler]
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    ensure_owner(&state, &claims, id).await?;
    let answer = state
        .session_service
        .submit_answer(id, req.question_id, &req.value)
        .await?;
    Ok(Json(SubmitAnswerResponse {
        saved: true,
        question_id: answer.question_id,
        value: answer.value,
        timestamp: answer.answered_at,
    }))
}

#[axum::debug_handler]
pub async fn mark_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<MarkQuestionRequest>,
) -> Result<impl IntoResponse> {
    ensure_owner(&state, &claims, id).await?;
    let cursor = state
        .session_service
        .mark_question(id, req.question_index, req.marked)
        .await?;
    Ok(Json(CursorResponse::from(cursor)))
}

#[axum::debug_handler]
pub async fn navigate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(nav): Json<Navigation>,
) -> Result<impl IntoResponse> {
    ensure_owner(&state, &claims, id).await?;
    let cursor = state.session_service.navigate(id, nav).await?;
    Ok(Json(CursorResponse::from(cursor)))
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/finish",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Session completed", body = Json<SessionResponse>),
        (status = 409, description = "Session already concluded"),
        (status = 410, description = "Deadline passed; session expired instead")
    )
)]
#[axum::debug_handler]
pub async fn finish(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    ensure_owner(&state, &claims, id).await?;
    let session = state.session_service.finish_session(id).await?;
    Ok(Json(SessionResponse::from(session)))
}

/// Client-side timer hit zero. The server still checks its own clock.
#[axum::debug_handler]
pub async fn expire(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    ensure_owner(&state, &claims, id).await?;
    let session = state.session_service.expire_session(id).await?;
    Ok(Json(SessionResponse::from(session)))
}
