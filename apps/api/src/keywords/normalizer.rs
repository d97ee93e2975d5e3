//! Keyword Normalizer: pure helpers over keyword strings.
//!
//! Display casing is preserved; every comparison goes through `comparison_key`.

use std::collections::HashSet;

/// Trims surrounding whitespace. Casing is kept for display.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_string()
}

/// The case-insensitive identity of a keyword.
pub fn comparison_key(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}

/// Removes case-insensitive duplicates, keeping the first occurrence in order.
pub fn dedupe<S: AsRef<str>>(list: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    list.iter()
        .map(|k| k.as_ref())
        .filter(|k| seen.insert(comparison_key(k)))
        .map(str::to_string)
        .collect()
}

/// Stable case-insensitive sort. Canonical order after reanalysis.
pub fn sort_ignore_case(list: &mut [String]) {
    list.sort_by_cached_key(|k| comparison_key(k));
}

/// Drops every candidate whose lower-cased form is excluded.
pub fn subtract_exclusions<S: AsRef<str>, N: AsRef<str>>(
    candidates: &[S],
    non_keywords: &[N],
) -> Vec<String> {
    let excluded: HashSet<String> = non_keywords
        .iter()
        .map(|n| comparison_key(n.as_ref()))
        .collect();
    candidates
        .iter()
        .map(|k| k.as_ref())
        .filter(|c| !excluded.contains(&comparison_key(c)))
        .map(str::to_string)
        .collect()
}

/// Splits raw extraction candidates on commas and newlines, trimming and
/// discarding empty fragments.
pub fn split_candidates<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter()
        .flat_map(|c| c.as_ref().split([',', '\n']))
        .map(normalize)
        .filter(|k| !k.is_empty())
        .collect()
}

pub fn position_ignore_case<S: AsRef<str>>(list: &[S], keyword: &str) -> Option<usize> {
    let key = comparison_key(keyword);
    list.iter().position(|k| comparison_key(k.as_ref()) == key)
}

pub fn contains_ignore_case<S: AsRef<str>>(list: &[S], keyword: &str) -> bool {
    position_ignore_case(list, keyword).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_but_keeps_case() {
        assert_eq!(normalize("  PostgreSQL \t"), "PostgreSQL");
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let list = ["Python", "python", "SQL", "PYTHON", "sql"];
        assert_eq!(dedupe(&list), vec!["Python", "SQL"]);
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let lists: Vec<Vec<&str>> = vec![
            vec![],
            vec!["a"],
            vec!["Go", "go", "GO", "Rust"],
            vec!["Kubernetes", "AWS", "aws ", "Docker", "kubernetes"],
        ];
        for list in lists {
            let once = dedupe(&list);
            assert_eq!(dedupe(&once), once);
        }
    }

    #[test]
    fn test_sort_ignore_case_is_stable() {
        let mut list: Vec<String> = ["sql", "Python", "aws", "python"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        sort_ignore_case(&mut list);
        assert_eq!(list, vec!["aws", "Python", "python", "sql"]);
    }

    #[test]
    fn test_subtract_exclusions_is_case_insensitive() {
        let candidates = ["Python", "AWS", "SQL"];
        let non_keywords = ["aws"];
        assert_eq!(
            subtract_exclusions(&candidates, &non_keywords),
            vec!["Python", "SQL"]
        );
    }

    #[test]
    fn test_split_candidates_handles_joined_strings() {
        let raw = ["Python, AWS,SQL", "  ", "Docker\nKubernetes,"];
        assert_eq!(
            split_candidates(&raw),
            vec!["Python", "AWS", "SQL", "Docker", "Kubernetes"]
        );
    }

    #[test]
    fn test_position_ignore_case() {
        let list = ["Rust", "TypeScript"];
        assert_eq!(position_ignore_case(&list, "typescript"), Some(1));
        assert!(!contains_ignore_case(&list, "Go"));
    }
}
