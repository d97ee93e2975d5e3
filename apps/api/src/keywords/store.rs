//! Persistence seams for resume keyword state.
//!
//! `ResumeStore` is the document store contract. Every call is scoped by
//! `ResumeKey`, so a resume owned by someone else looks exactly like a
//! missing one. Multi-field changes go through one `update` call.

use async_trait::async_trait;

use crate::errors::AppError;
use crate::keywords::normalizer::{comparison_key, contains_ignore_case};
use crate::models::resume::{NewResume, ResumeKey, ResumePatch, ResumeRow};

#[async_trait]
pub trait ResumeStore: Send + Sync {
    async fn create(&self, resume: NewResume) -> Result<ResumeRow, AppError>;

    /// Fails with `NotFound` when no resume matches both ids.
    async fn get(&self, key: &ResumeKey) -> Result<ResumeRow, AppError>;

    /// Applies every field of `patch` in a single update and returns the new row.
    async fn update(&self, key: &ResumeKey, patch: ResumePatch) -> Result<ResumeRow, AppError>;

    async fn delete(&self, key: &ResumeKey) -> Result<(), AppError>;
}

/// Persisted exclusion list of a resume.
#[async_trait]
pub trait ExclusionStore: Send + Sync {
    async fn read_exclusions(&self, key: &ResumeKey) -> Result<Vec<String>, AppError>;

    /// Adds the lower-cased keyword to the exclusion list and returns the new list.
    async fn add_exclusion(&self, key: &ResumeKey, keyword: &str) -> Result<Vec<String>, AppError>;
}

#[async_trait]
impl<S: ResumeStore + ?Sized> ExclusionStore for S {
    async fn read_exclusions(&self, key: &ResumeKey) -> Result<Vec<String>, AppError> {
        Ok(self.get(key).await?.non_keywords)
    }

    async fn add_exclusion(&self, key: &ResumeKey, keyword: &str) -> Result<Vec<String>, AppError> {
        let keyword = comparison_key(keyword);
        if keyword.is_empty() {
            return Err(AppError::Validation("Excluded keyword cannot be empty".to_string()));
        }

        let mut non_keywords = self.get(key).await?.non_keywords;
        if contains_ignore_case(&non_keywords, &keyword) {
            return Ok(non_keywords);
        }
        non_keywords.push(keyword);

        let row = self
            .update(key, ResumePatch::non_keywords(non_keywords))
            .await?;
        Ok(row.non_keywords)
    }
}
