use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub key: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i32,
    #[serde(alias = "question")]
    pub prompt: String,
    pub options: Vec<QuestionOption>,
}

impl Question {
    /// Finds the option a submitted value refers to, by key first, then by text.
    pub fn resolve_option(&self, value: &str) -> Option<&QuestionOption> {
        let value = value.trim();
        self.options
            .iter()
            .find(|o| o.key == value)
            .or_else(|| self.options.iter().find(|o| o.text.trim() == value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionPack {
    pub id: Uuid,
    pub title: String,
    pub questions: Vec<Question>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct QuestionPackRow {
    pub id: Uuid,
    pub title: String,
    pub questions: JsonValue,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<QuestionPackRow> for QuestionPack {
    type Error = Error;

    fn try_from(row: QuestionPackRow) -> Result<Self> {
        let questions: Vec<Question> = serde_json::from_value(row.questions)?;
        Ok(Self {
            id: row.id,
            title: row.title,
            questions,
            updated_at: row.updated_at,
        })
    }
}
