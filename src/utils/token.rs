use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};

use crate::error::{Error, Result};
use crate::middleware::auth::Claims;

/// Signs an HS256 bearer token for `sub` with the given role.
pub fn issue_token(secret: &str, sub: &str, role: &str, ttl: Duration) -> Result<String> {
    let claims = Claims {
        sub: sub.to_string(),
        exp: (Utc::now() + ttl).timestamp().max(0) as usize,
        role: Some(role.to_string()),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(format!("failed to sign token: {}", e)))
}
