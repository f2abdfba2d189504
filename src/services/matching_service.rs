use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::database::{CandidateRepository, VacancyRepository};
use crate::error::{Error, Result};
use crate::models::vacancy::Vacancy;

/// A vacancy the candidate is eligible for. Eligibility is binary, so `score` is always 1.
#[derive(Debug, Clone, Serialize)]
pub struct MatchScore {
    pub candidate_id: Uuid,
    pub vacancy_id: Uuid,
    pub score: u8,
    pub vacancy: Vacancy,
}

fn normalize(major: &str) -> String {
    major.trim().to_lowercase()
}

/// A blank or missing requirement admits anyone; otherwise the trimmed,
/// case-folded majors must be equal.
pub fn is_eligible(candidate_major: Option<&str>, required_major: Option<&str>) -> bool {
    let required = match required_major.map(normalize) {
        Some(required) if !required.is_empty() => required,
        _ => return true,
    };
    candidate_major
        .map(normalize)
        .is_some_and(|candidate| candidate == required)
}

/// Eligible subset of `vacancies`, newest first.
pub fn recommend(candidate_major: Option<&str>, vacancies: &[Vacancy]) -> Vec<Vacancy> {
    let mut eligible: Vec<Vacancy> = vacancies
        .iter()
        .filter(|v| is_eligible(candidate_major, v.required_major.as_deref()))
        .cloned()
        .collect();
    eligible.sort_by(|a, b| match b.published_at.cmp(&a.published_at) {
        Ordering::Equal => a.id.cmp(&b.id),
        other => other,
    });
    eligible
}

#[derive(Clone)]
pub struct MatchingService {
    candidates: Arc<dyn CandidateRepository>,
    vacancies: Arc<dyn VacancyRepository>,
}

impl MatchingService {
    pub fn new(candidates: Arc<dyn CandidateRepository>, vacancies: Arc<dyn VacancyRepository>) -> Self {
        Self { candidates, vacancies }
    }

    pub async fn recommend_for_candidate(&self, candidate_id: Uuid) -> Result<Vec<MatchScore>> {
        let profile = self
            .candidates
            .find_profile(candidate_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Candidate {} not found", candidate_id)))?;
        let open = self.vacancies.list_open().await?;

        let matches: Vec<MatchScore> = recommend(profile.major(), &open)
            .into_iter()
            .map(|vacancy| MatchScore {
                candidate_id,
                vacancy_id: vacancy.id,
                score: 1,
                vacancy,
            })
            .collect();

        tracing::debug!(
            candidate_id = %candidate_id,
            open = open.len(),
            eligible = matches.len(),
            "computed recommendations"
        );
        Ok(matches)
    }
}
