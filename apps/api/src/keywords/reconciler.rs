//! Keyword Reconciler: one analysis pass over a resume.
//!
//! Flow: validate text → read exclusions → extract (with bounded retry) →
//!       split/filter/merge → persist → report how many keywords were added.
//!
//! Nothing is returned to the caller until the merged list is persisted.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::errors::AppError;
use crate::keywords::extraction::{AnalysisRequest, ExtractionClient};
use crate::keywords::normalizer::{
    contains_ignore_case, dedupe, sort_ignore_case, split_candidates, subtract_exclusions,
};
use crate::keywords::retry::{extract_with_retry, RetryPolicy};
use crate::keywords::store::{ExclusionStore, ResumeStore};
use crate::models::resume::{ResumePatch, ResumeRow};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReanalysisOutcome {
    pub keywords: Vec<String>,
    pub added_count: usize,
}

/// Merges raw extraction output into the existing keyword list.
///
/// Candidates are split, trimmed, stripped of excluded terms and of anything
/// already on the list, then appended before the case-insensitive sort.
/// Existing keywords keep their casing and are never dropped, case variants
/// included; removing those is `deduplicate`'s job. `added_count` is the
/// number of candidates that made it onto the list.
pub fn reconcile(
    existing: &[String],
    raw_candidates: &[String],
    non_keywords: &[String],
) -> ReanalysisOutcome {
    let candidates = subtract_exclusions(&split_candidates(raw_candidates), non_keywords);
    let added: Vec<String> = dedupe(&candidates)
        .into_iter()
        .filter(|c| !contains_ignore_case(existing, c))
        .collect();
    let added_count = added.len();

    let mut keywords: Vec<String> = existing.iter().cloned().chain(added).collect();
    sort_ignore_case(&mut keywords);
    ReanalysisOutcome {
        keywords,
        added_count,
    }
}

/// User-facing summary of a reanalysis.
pub fn analysis_message(added_count: usize) -> String {
    match added_count {
        0 => "No new keywords found".to_string(),
        1 => "Added 1 new keyword".to_string(),
        n => format!("Added {n} new keywords"),
    }
}

#[derive(Clone)]
pub struct KeywordReconciler {
    store: Arc<dyn ResumeStore>,
    extractor: Arc<dyn ExtractionClient>,
    retry: RetryPolicy,
}

impl KeywordReconciler {
    pub fn new(
        store: Arc<dyn ResumeStore>,
        extractor: Arc<dyn ExtractionClient>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            extractor,
            retry,
        }
    }

    pub async fn reanalyze(&self, resume: &ResumeRow) -> Result<ReanalysisOutcome, AppError> {
        let text = resume
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AppError::Validation("Resume has no text to analyze".to_string())
            })?;
        let key = resume.key();

        // The persisted list wins over a possibly stale in-memory copy; both are honored.
        let mut non_keywords = self.store.read_exclusions(&key).await?;
        non_keywords.extend(resume.non_keywords.iter().cloned());
        let non_keywords = dedupe(&non_keywords);

        let request = AnalysisRequest {
            resume_text: text.to_string(),
            existing_keywords: resume.keywords.clone(),
            non_keywords: non_keywords.clone(),
        };

        info!(
            "Analyzing resume {} ({} existing keywords, {} exclusions)",
            key.resume_id,
            resume.keywords.len(),
            non_keywords.len()
        );
        let (result, attempts) =
            extract_with_retry(self.extractor.as_ref(), &request, &self.retry).await?;

        let ReanalysisOutcome {
            keywords,
            added_count,
        } = reconcile(&resume.keywords, &result.raw_candidates, &non_keywords);

        let row = self
            .store
            .update(&key, ResumePatch::keywords(keywords))
            .await?;

        info!(
            "Resume {} analyzed in {} attempt(s): {} keywords (+{})",
            key.resume_id,
            attempts,
            row.keywords.len(),
            added_count
        );

        Ok(ReanalysisOutcome {
            keywords: row.keywords,
            added_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::extraction::ExtractionError;
    use crate::keywords::normalizer::comparison_key;
    use crate::keywords::testing::{resume_row, strings, InMemoryResumeStore, ScriptedExtractor};

    fn reconciler(
        store: Arc<InMemoryResumeStore>,
        extractor: Arc<ScriptedExtractor>,
    ) -> KeywordReconciler {
        KeywordReconciler::new(store, extractor, RetryPolicy::default())
    }

    #[test]
    fn test_reconcile_filters_exclusions_and_sorts() {
        let merged = reconcile(
            &strings(&["SQL"]),
            &strings(&["Python, AWS, SQL"]),
            &strings(&["aws"]),
        );
        assert_eq!(merged.keywords, vec!["Python", "SQL"]);
        assert_eq!(merged.added_count, 1);
    }

    #[test]
    fn test_reconcile_keeps_existing_casing() {
        let merged = reconcile(&strings(&["postgreSQL"]), &strings(&["PostgreSQL", "Go"]), &[]);
        assert_eq!(merged.keywords, vec!["Go", "postgreSQL"]);
        assert_eq!(merged.added_count, 1);
    }

    #[test]
    fn test_reconcile_result_is_disjoint_from_exclusions() {
        let non_keywords = strings(&["docker", "rust"]);
        let merged = reconcile(
            &strings(&["Go"]),
            &strings(&["Docker", "RUST", "Kafka", " docker "]),
            &non_keywords,
        );
        for keyword in &merged.keywords {
            assert!(!non_keywords.contains(&comparison_key(keyword)), "{keyword} leaked");
        }
    }

    #[test]
    fn test_reconcile_never_shrinks() {
        let existing = strings(&["Go", "Rust", "SQL"]);
        let merged = reconcile(&existing, &strings(&["rust", "", "  "]), &[]);
        assert!(merged.keywords.len() >= existing.len());
        assert_eq!(merged.added_count, 0);
    }

    #[test]
    fn test_reconcile_counts_only_new_keywords_next_to_case_variants() {
        let existing = strings(&["Python", "python"]);
        let merged = reconcile(&existing, &strings(&["Go, PYTHON, go"]), &[]);
        assert_eq!(merged.keywords, vec!["Go", "Python", "python"]);
        assert_eq!(merged.added_count, 1);
    }

    #[test]
    fn test_analysis_message() {
        assert_eq!(analysis_message(0), "No new keywords found");
        assert_eq!(analysis_message(1), "Added 1 new keyword");
        assert_eq!(analysis_message(4), "Added 4 new keywords");
    }

    #[tokio::test]
    async fn test_scenario_joined_string_with_exclusion() {
        let row = resume_row("Python developer with AWS and SQL", &["SQL"], &["aws"]);
        let store = Arc::new(InMemoryResumeStore::with_rows([row.clone()]));
        let extractor = Arc::new(ScriptedExtractor::new(vec![Ok(vec!["Python, AWS, SQL"])]));

        let outcome = reconciler(store.clone(), extractor.clone())
            .reanalyze(&row)
            .await
            .unwrap();

        assert_eq!(outcome.keywords, vec!["Python", "SQL"]);
        assert_eq!(outcome.added_count, 1);
        assert_eq!(store.row(row.id).unwrap().keywords, vec!["Python", "SQL"]);

        let request = extractor.last_request().unwrap();
        assert_eq!(request.existing_keywords, vec!["SQL"]);
        assert_eq!(request.non_keywords, vec!["aws"]);
    }

    #[tokio::test]
    async fn test_reanalysis_keeps_undeduplicated_keywords() {
        let row = resume_row("Python and Go", &["Python", "python"], &[]);
        let store = Arc::new(InMemoryResumeStore::with_rows([row.clone()]));
        let extractor = Arc::new(ScriptedExtractor::new(vec![Ok(vec!["Go"])]));

        let outcome = reconciler(store.clone(), extractor)
            .reanalyze(&row)
            .await
            .unwrap();

        assert_eq!(outcome.added_count, 1);
        assert_eq!(outcome.keywords, vec!["Go", "Python", "python"]);
        assert_eq!(store.row(row.id).unwrap().keywords.len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_payload_leaves_keywords_unchanged() {
        let row = resume_row("Rust engineer", &["Rust"], &[]);
        let store = Arc::new(InMemoryResumeStore::with_rows([row.clone()]));
        let extractor = Arc::new(ScriptedExtractor::new(vec![Err(ExtractionError::Malformed(
            "keywords was a number".to_string(),
        ))]));

        let err = reconciler(store.clone(), extractor)
            .reanalyze(&row)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::MalformedResponse(_)));
        assert_eq!(store.row(row.id).unwrap().keywords, vec!["Rust"]);
        assert_eq!(store.update_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_twice_then_success() {
        let row = resume_row("Python developer with AWS and SQL", &["SQL"], &["aws"]);
        let store = Arc::new(InMemoryResumeStore::with_rows([row.clone()]));
        let rate_limited = || Err(ExtractionError::RateLimited { retry_after: None });
        let extractor = Arc::new(ScriptedExtractor::new(vec![
            rate_limited(),
            rate_limited(),
            Ok(vec!["Python, AWS, SQL"]),
        ]));

        let outcome = reconciler(store, extractor.clone())
            .reanalyze(&row)
            .await
            .unwrap();

        assert_eq!(outcome.keywords, vec!["Python", "SQL"]);
        assert_eq!(outcome.added_count, 1);
        assert_eq!(extractor.calls(), 3);
    }

    #[tokio::test]
    async fn test_persistence_failure_surfaces_and_keeps_old_keywords() {
        let row = resume_row("Go and Kafka", &["Go"], &[]);
        let store = Arc::new(InMemoryResumeStore::with_rows([row.clone()]));
        store.fail_updates(true);
        let extractor = Arc::new(ScriptedExtractor::new(vec![Ok(vec!["Kafka"])]));

        let err = reconciler(store.clone(), extractor)
            .reanalyze(&row)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::PersistenceFailed(_)));
        assert_eq!(store.row(row.id).unwrap().keywords, vec!["Go"]);
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected_before_extraction() {
        let row = resume_row("   ", &[], &[]);
        let store = Arc::new(InMemoryResumeStore::with_rows([row.clone()]));
        let extractor = Arc::new(ScriptedExtractor::new(vec![Ok(vec!["Rust"])]));

        let err = reconciler(store, extractor.clone())
            .reanalyze(&row)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(extractor.calls(), 0);
    }

    #[tokio::test]
    async fn test_persisted_exclusions_are_honored() {
        let row = resume_row("Terraform and Ansible", &[], &[]);
        let store = Arc::new(InMemoryResumeStore::with_rows([row.clone()]));
        store
            .update(&row.key(), ResumePatch::non_keywords(strings(&["ansible"])))
            .await
            .unwrap();
        let extractor = Arc::new(ScriptedExtractor::new(vec![Ok(vec!["Terraform", "Ansible"])]));

        let outcome = reconciler(store, extractor)
            .reanalyze(&row)
            .await
            .unwrap();

        assert_eq!(outcome.keywords, vec!["Terraform"]);
    }
}
