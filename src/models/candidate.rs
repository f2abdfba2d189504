use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Read-only view of a candidate profile.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateProfile {
    pub id: Uuid,
    pub name: String,
    pub education_major: Option<String>,
}

impl CandidateProfile {
    pub fn major(&self) -> Option<&str> {
        self.education_major
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}
