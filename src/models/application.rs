use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdministrationStatus {
    Pending,
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    NotApplicable,
    Scheduled,
    InProgress,
    Completed,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStatus {
    NotApplicable,
    Scheduled,
    Completed,
}

/// Staff decision for administration and interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageResult {
    Passed,
    Failed,
}

/// How an assessment session terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentOutcome {
    Completed,
    TimedOut,
}

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(Error::Internal(format!(
                        "unknown {} value '{}'",
                        stringify!($ty),
                        other
                    ))),
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use text_enum;

text_enum!(AdministrationStatus {
    Pending => "pending",
    Passed => "passed",
    Failed => "failed",
});

text_enum!(AssessmentStatus {
    NotApplicable => "not_applicable",
    Scheduled => "scheduled",
    InProgress => "in_progress",
    Completed => "completed",
    TimedOut => "timed_out",
});

text_enum!(InterviewStatus {
    NotApplicable => "not_applicable",
    Scheduled => "scheduled",
    Completed => "completed",
});

text_enum!(StageResult {
    Passed => "passed",
    Failed => "failed",
});

text_enum!(AssessmentOutcome {
    Completed => "completed",
    TimedOut => "timed_out",
});

impl From<AssessmentOutcome> for AssessmentStatus {
    fn from(outcome: AssessmentOutcome) -> Self {
        match outcome {
            AssessmentOutcome::Completed => AssessmentStatus::Completed,
            AssessmentOutcome::TimedOut => AssessmentStatus::TimedOut,
        }
    }
}

impl AssessmentStatus {
    pub fn is_concluded(&self) -> bool {
        matches!(self, AssessmentStatus::Completed | AssessmentStatus::TimedOut)
    }
}

/// The three gated sub-machines of one application.
///
/// Every mutation goes through one of the transition methods below, each of
/// which either returns the next triple or explains why the move is illegal.
/// Stores persist a new triple only if the stored one still equals the triple
/// the transition was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageState {
    pub administration: AdministrationStatus,
    pub assessment: AssessmentStatus,
    pub interview: InterviewStatus,
    pub interview_result: Option<StageResult>,
}

/// Result of asking a stage machine to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed(StageState),
    /// The requested state already holds; nothing to persist.
    Unchanged,
}

impl Default for StageState {
    fn default() -> Self {
        Self::new()
    }
}

impl StageState {
    pub fn new() -> Self {
        Self {
            administration: AdministrationStatus::Pending,
            assessment: AssessmentStatus::NotApplicable,
            interview: InterviewStatus::NotApplicable,
            interview_result: None,
        }
    }

    pub fn decide_administration(&self, result: StageResult) -> Result<StageState> {
        match self.administration {
            AdministrationStatus::Pending => {}
            AdministrationStatus::Passed | AdministrationStatus::Failed => {
                return Err(Error::InvalidTransition(format!(
                    "administration has already been decided ({})",
                    self.administration
                )))
            }
        }
        let next = match result {
            StageResult::Passed => StageState {
                administration: AdministrationStatus::Passed,
                assessment: AssessmentStatus::Scheduled,
                ..*self
            },
            StageResult::Failed => StageState {
                administration: AdministrationStatus::Failed,
                ..*self
            },
        };
        Ok(next)
    }

    pub fn start_assessment(&self) -> Result<Transition> {
        match self.assessment {
            AssessmentStatus::Scheduled => Ok(Transition::Changed(StageState {
                assessment: AssessmentStatus::InProgress,
                ..*self
            })),
            AssessmentStatus::InProgress => Ok(Transition::Unchanged),
            AssessmentStatus::NotApplicable
            | AssessmentStatus::Completed
            | AssessmentStatus::TimedOut => Err(Error::InvalidState(format!(
                "assessment is {}, not scheduled",
                self.assessment
            ))),
        }
    }

    /// Records the session outcome. Both outcomes unlock the interview stage:
    /// a timeout is an automatic submission of whatever was answered in time.
    pub fn conclude_assessment(&self, outcome: AssessmentOutcome) -> Result<Transition> {
        match self.assessment {
            AssessmentStatus::Scheduled | AssessmentStatus::InProgress => {
                Ok(Transition::Changed(StageState {
                    assessment: outcome.into(),
                    interview: InterviewStatus::Scheduled,
                    ..*self
                }))
            }
            AssessmentStatus::Completed | AssessmentStatus::TimedOut => Ok(Transition::Unchanged),
            AssessmentStatus::NotApplicable => Err(Error::InvalidTransition(
                "assessment was never scheduled for this application".to_string(),
            )),
        }
    }

    pub fn decide_interview(&self, result: StageResult) -> Result<StageState> {
        match self.interview {
            InterviewStatus::Scheduled => Ok(StageState {
                interview: InterviewStatus::Completed,
                interview_result: Some(result),
                ..*self
            }),
            InterviewStatus::NotApplicable => Err(Error::InvalidTransition(
                "interview has not been scheduled".to_string(),
            )),
            InterviewStatus::Completed => Err(Error::InvalidTransition(
                "interview result has already been recorded".to_string(),
            )),
        }
    }

    /// The gating invariants every persisted triple must satisfy.
    pub fn is_consistent(&self) -> bool {
        let assessment_gated = self.assessment == AssessmentStatus::NotApplicable
            || self.administration == AdministrationStatus::Passed;
        let interview_gated =
            self.interview == InterviewStatus::NotApplicable || self.assessment.is_concluded();
        let result_gated =
            self.interview_result.is_none() || self.interview == InterviewStatus::Completed;
        assessment_gated && interview_gated && result_gated
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub vacancy_id: Uuid,
    pub vacancy_period_id: Uuid,
    pub stages: StageState,
    pub applied_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewApplication {
    pub candidate_id: Uuid,
    pub vacancy_id: Uuid,
    pub vacancy_period_id: Uuid,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ApplicationRow {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub vacancy_id: Uuid,
    pub vacancy_period_id: Uuid,
    pub administration_status: String,
    pub assessment_status: String,
    pub interview_status: String,
    pub interview_result: Option<String>,
    pub applied_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = Error;

    fn try_from(row: ApplicationRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            candidate_id: row.candidate_id,
            vacancy_id: row.vacancy_id,
            vacancy_period_id: row.vacancy_period_id,
            stages: StageState {
                administration: row.administration_status.parse()?,
                assessment: row.assessment_status.parse()?,
                interview: row.interview_status.parse()?,
                interview_result: row.interview_result.as_deref().map(str::parse).transpose()?,
            },
            applied_at: row.applied_at,
            updated_at: row.updated_at,
        })
    }
}
