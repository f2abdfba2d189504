use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::AppState;

pub const CANDIDATE_ROLE: &str = "candidate";
pub const STAFF_ROLES: [&str; 2] = ["hr", "admin"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

impl Claims {
    fn has_role(&self, allowed: &[&str]) -> bool {
        let role = self.role.as_deref().unwrap_or_default();
        allowed.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    /// Candidate tokens carry the candidate id as their subject.
    pub fn candidate_id(&self) -> Result<Uuid> {
        self.sub
            .parse()
            .map_err(|_| Error::Unauthorized("token subject is not a candidate id".to_string()))
    }
}

fn bearer_claims(req: &Request, secret: &str) -> Result<Claims> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| Error::Unauthorized("missing authorization".to_string()))?;
    let auth_str = auth_header
        .to_str()
        .map_err(|_| Error::Unauthorized("bad authorization header".to_string()))?;
    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| Error::Unauthorized("unsupported scheme".to_string()))?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| Error::Unauthorized("invalid token".to_string()))
}

async fn require_roles(state: AppState, mut req: Request, next: Next, allowed: &[&str]) -> Response {
    let claims = match bearer_claims(&req, &state.jwt_secret) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };
    if !claims.has_role(allowed) {
        tracing::debug!(sub = %claims.sub, role = ?claims.role, "role not permitted");
        return Error::Forbidden("role not permitted for this route".to_string()).into_response();
    }
    req.extensions_mut().insert(claims);
    next.run(req).await
}

pub async fn require_candidate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    require_roles(state, req, next, &[CANDIDATE_ROLE]).await
}

pub async fn require_staff(State(state): State<AppState>, req: Request, next: Next) -> Response {
    require_roles(state, req, next, &STAFF_ROLES).await
}
