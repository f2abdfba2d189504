pub mod applications;
pub mod health;
pub mod sessions;
pub mod staff;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::middleware::auth::{require_candidate, require_staff};
use crate::AppState;

pub fn router(state: AppState) -> Router {
    let base_routes = Router::new().route("/health", get(health::health));

    let candidate_api = Router::new()
        .route(
            "/api/applications",
            get(applications::list_own).post(applications::apply),
        )
        .route("/api/applications/:id", get(applications::get_own))
        .route(
            "/api/applications/:id/session",
            post(applications::start_session),
        )
        .route("/api/recommendations", get(applications::recommendations))
        .route("/api/sessions/:id", get(sessions::get_session))
        .route("/api/sessions/:id/questions", get(sessions::get_questions))
        .route("/api/sessions/:id/answers", put(sessions::submit_answer))
        .route("/api/sessions/:id/marks", post(sessions::mark_question))
        .route("/api/sessions/:id/navigate", post(sessions::navigate))
        .route("/api/sessions/:id/finish", post(sessions::finish))
        .route("/api/sessions/:id/expire", post(sessions::expire))
        .layer(from_fn_with_state(state.clone(), require_candidate));

    let staff_api = Router::new()
        .route(
            "/api/staff/applications/:id",
            get(staff::get_application),
        )
        .route(
            "/api/staff/applications/:id/administration",
            post(staff::decide_administration),
        )
        .route(
            "/api/staff/applications/:id/interview",
            post(staff::decide_interview),
        )
        .route(
            "/api/staff/applications/:id/history",
            get(staff::history),
        )
        .route(
            "/api/staff/vacancies/:id/applications",
            get(staff::list_for_vacancy),
        )
        .route("/api/staff/sessions/sweep", post(staff::sweep))
        .layer(from_fn_with_state(state.clone(), require_staff));

    base_routes
        .merge(candidate_api)
        .merge(staff_api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
}
