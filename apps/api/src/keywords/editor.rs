//! Keyword Editor: manual edits to a resume's keyword lists.
//!
//! Every operation computes the new lists locally, persists them with a single
//! store update, and only then hands them back. On failure the caller's lists
//! are untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::keywords::normalizer::{
    comparison_key, contains_ignore_case, dedupe, normalize, position_ignore_case,
};
use crate::keywords::store::{ExclusionStore, ResumeStore};
use crate::models::resume::{ResumeKey, ResumePatch, ResumeRow};

/// The in-memory pair of lists an edit starts from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordLists {
    pub keywords: Vec<String>,
    pub non_keywords: Vec<String>,
}

impl From<&ResumeRow> for KeywordLists {
    fn from(row: &ResumeRow) -> Self {
        Self {
            keywords: row.keywords.clone(),
            non_keywords: row.non_keywords.clone(),
        }
    }
}

/// Addresses a keyword by position. `expected`, when given, must still be the
/// value at that position (case-insensitive) or the edit is refused.
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordTarget {
    pub index: usize,
    pub expected: Option<String>,
}

#[cfg(test)]
impl KeywordTarget {
    pub fn at(index: usize) -> Self {
        Self {
            index,
            expected: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupOutcome {
    NoDuplicates,
    Removed { removed: usize, lists: KeywordLists },
}

impl DedupOutcome {
    pub fn message(&self) -> String {
        match self {
            DedupOutcome::NoDuplicates => "No duplicates found".to_string(),
            DedupOutcome::Removed { removed: 1, .. } => "Removed 1 duplicate".to_string(),
            DedupOutcome::Removed { removed, .. } => format!("Removed {removed} duplicates"),
        }
    }
}

fn resolve_index(keywords: &[String], target: &KeywordTarget) -> Result<usize, AppError> {
    let current = keywords.get(target.index).ok_or_else(|| {
        AppError::Validation(format!(
            "Keyword index {} is out of range ({} keywords)",
            target.index,
            keywords.len()
        ))
    })?;
    if let Some(expected) = &target.expected {
        if comparison_key(expected) != comparison_key(current) {
            return Err(AppError::Validation(format!(
                "Keyword at index {} is now '{}', not '{}'. Refresh and try again.",
                target.index, current, expected
            )));
        }
    }
    Ok(target.index)
}

#[derive(Clone)]
pub struct KeywordEditor {
    store: Arc<dyn ResumeStore>,
}

impl KeywordEditor {
    pub fn new(store: Arc<dyn ResumeStore>) -> Self {
        Self { store }
    }

    async fn persist(&self, key: &ResumeKey, patch: ResumePatch) -> Result<KeywordLists, AppError> {
        let row = self.store.update(key, patch).await?;
        Ok(KeywordLists::from(&row))
    }

    pub async fn rename(
        &self,
        key: &ResumeKey,
        lists: &KeywordLists,
        target: &KeywordTarget,
        new_value: &str,
    ) -> Result<KeywordLists, AppError> {
        let index = resolve_index(&lists.keywords, target)?;
        let new_value = normalize(new_value);
        if new_value.is_empty() {
            return Err(AppError::Validation("Keyword cannot be empty".to_string()));
        }
        if let Some(other) = position_ignore_case(&lists.keywords, &new_value) {
            if other != index {
                return Err(AppError::Validation(format!(
                    "'{new_value}' is already a keyword"
                )));
            }
        }
        if contains_ignore_case(&lists.non_keywords, &new_value) {
            return Err(AppError::Validation(format!(
                "'{new_value}' is excluded from keywords"
            )));
        }

        let mut keywords = lists.keywords.clone();
        let old = std::mem::replace(&mut keywords[index], new_value);
        let updated = self.persist(key, ResumePatch::keywords(keywords)).await?;
        info!("Renamed keyword '{}' on resume {}", old, key.resume_id);
        Ok(updated)
    }

    pub async fn delete_one(
        &self,
        key: &ResumeKey,
        lists: &KeywordLists,
        target: &KeywordTarget,
    ) -> Result<KeywordLists, AppError> {
        let index = resolve_index(&lists.keywords, target)?;
        let mut keywords = lists.keywords.clone();
        let removed = keywords.remove(index);
        let updated = self.persist(key, ResumePatch::keywords(keywords)).await?;
        info!("Deleted keyword '{}' from resume {}", removed, key.resume_id);
        Ok(updated)
    }

    pub async fn delete_all(&self, key: &ResumeKey) -> Result<KeywordLists, AppError> {
        let updated = self.persist(key, ResumePatch::keywords(vec![])).await?;
        info!("Cleared all keywords on resume {}", key.resume_id);
        Ok(updated)
    }

    /// Removes case-insensitive duplicates, keeping the user's order.
    /// Nothing is written when there is nothing to remove.
    pub async fn deduplicate(
        &self,
        key: &ResumeKey,
        lists: &KeywordLists,
    ) -> Result<DedupOutcome, AppError> {
        let keywords = dedupe(&lists.keywords);
        let removed = lists.keywords.len() - keywords.len();
        if removed == 0 {
            return Ok(DedupOutcome::NoDuplicates);
        }

        let lists = self.persist(key, ResumePatch::keywords(keywords)).await?;
        info!("Removed {} duplicate keywords on resume {}", removed, key.resume_id);
        Ok(DedupOutcome::Removed { removed, lists })
    }

    /// Moves a keyword onto the exclusion list. Both lists are written in one update.
    pub async fn demote(
        &self,
        key: &ResumeKey,
        lists: &KeywordLists,
        keyword: &str,
    ) -> Result<KeywordLists, AppError> {
        let excluded = comparison_key(keyword);
        if position_ignore_case(&lists.keywords, &excluded).is_none() {
            return Err(AppError::NotFound(format!(
                "Keyword '{}' not found",
                normalize(keyword)
            )));
        }

        let keywords: Vec<String> = lists
            .keywords
            .iter()
            .filter(|k| comparison_key(k) != excluded)
            .cloned()
            .collect();
        let mut non_keywords = lists.non_keywords.clone();
        if !contains_ignore_case(&non_keywords, &excluded) {
            non_keywords.push(excluded.clone());
        }

        let updated = self
            .persist(key, ResumePatch::lists(keywords, non_keywords))
            .await?;
        info!("Demoted '{}' to non-keyword on resume {}", excluded, key.resume_id);
        Ok(updated)
    }

    /// Adds a keyword by hand. An excluded keyword has its exclusion lifted in
    /// the same update.
    pub async fn add(
        &self,
        key: &ResumeKey,
        lists: &KeywordLists,
        keyword: &str,
    ) -> Result<KeywordLists, AppError> {
        let keyword = normalize(keyword);
        if keyword.is_empty() {
            return Err(AppError::Validation("Keyword cannot be empty".to_string()));
        }
        if contains_ignore_case(&lists.keywords, &keyword) {
            return Err(AppError::Validation(format!("'{keyword}' is already a keyword")));
        }

        let mut keywords = lists.keywords.clone();
        let patch = if contains_ignore_case(&lists.non_keywords, &keyword) {
            let lifted = comparison_key(&keyword);
            let non_keywords = lists
                .non_keywords
                .iter()
                .filter(|n| comparison_key(n) != lifted)
                .cloned()
                .collect();
            keywords.push(keyword.clone());
            ResumePatch::lists(keywords, non_keywords)
        } else {
            keywords.push(keyword.clone());
            ResumePatch::keywords(keywords)
        };

        let updated = self.persist(key, patch).await?;
        info!("Added keyword '{}' to resume {}", keyword, key.resume_id);
        Ok(updated)
    }

    /// Removes a term from the exclusion list so future analyses may return it.
    pub async fn restore(
        &self,
        key: &ResumeKey,
        lists: &KeywordLists,
        non_keyword: &str,
    ) -> Result<KeywordLists, AppError> {
        let restored = comparison_key(non_keyword);
        if !contains_ignore_case(&lists.non_keywords, &restored) {
            return Err(AppError::NotFound(format!(
                "'{restored}' is not an excluded keyword"
            )));
        }
        let non_keywords = lists
            .non_keywords
            .iter()
            .filter(|n| comparison_key(n) != restored)
            .cloned()
            .collect();

        let updated = self
            .persist(key, ResumePatch::non_keywords(non_keywords))
            .await?;
        info!("Restored '{}' on resume {}", restored, key.resume_id);
        Ok(updated)
    }

    /// Excludes a term. A current keyword is demoted; anything else only joins
    /// the exclusion list.
    pub async fn exclude(
        &self,
        key: &ResumeKey,
        lists: &KeywordLists,
        term: &str,
    ) -> Result<KeywordLists, AppError> {
        if contains_ignore_case(&lists.keywords, term) {
            return self.demote(key, lists, term).await;
        }
        let non_keywords = self.store.add_exclusion(key, term).await?;
        info!("Excluded '{}' on resume {}", comparison_key(term), key.resume_id);
        Ok(KeywordLists {
            keywords: lists.keywords.clone(),
            non_keywords,
        })
    }
}
