use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Identifies a resume together with its owner. Every store call is scoped by both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResumeKey {
    pub resume_id: Uuid,
    pub owner_id: Uuid,
}

impl ResumeKey {
    pub fn new(resume_id: Uuid, owner_id: Uuid) -> Self {
        Self {
            resume_id,
            owner_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub text: Option<String>,
    /// Case-insensitively unique, in the order the user sees them.
    pub keywords: Vec<String>,
    /// Lower-cased exclusion list.
    pub non_keywords: Vec<String>,
    pub blob_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResumeRow {
    pub fn key(&self) -> ResumeKey {
        ResumeKey::new(self.id, self.owner_id)
    }
}

/// Fields for a freshly ingested resume. Keyword lists always start empty.
#[derive(Debug, Clone)]
pub struct NewResume {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub text: String,
    pub blob_path: Option<String>,
}

/// Partial update applied by the store as a single statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResumePatch {
    pub text: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub non_keywords: Option<Vec<String>>,
}

impl ResumePatch {
    pub fn keywords(keywords: Vec<String>) -> Self {
        Self {
            keywords: Some(keywords),
            ..Default::default()
        }
    }

    pub fn non_keywords(non_keywords: Vec<String>) -> Self {
        Self {
            non_keywords: Some(non_keywords),
            ..Default::default()
        }
    }

    pub fn lists(keywords: Vec<String>, non_keywords: Vec<String>) -> Self {
        Self {
            keywords: Some(keywords),
            non_keywords: Some(non_keywords),
            ..Default::default()
        }
    }

    pub fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Default::default()
        }
    }
}
