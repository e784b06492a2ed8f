//! Exclusion policy evaluator, spec §4.3: scoped folder-prefix and glob
//! rules that gate new discoveries and retroactively re-classify existing
//! queued files when rules change.

use crate::classifier::Classifier;
use crate::error::Result;
use crate::store::Store;
use crate::types::{Exclusion, ExclusionType};
use regex::Regex;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub excluded: bool,
    pub reason: Option<String>,
    pub matched_rule_id: Option<i64>,
}

pub struct ExclusionEvaluator {
    store: Arc<Store>,
}

impl ExclusionEvaluator {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// `evaluate(path, library_id) -> {excluded, reason?, matched_rule_id?}`.
    /// First match wins under the deterministic `(library_id NULLS FIRST,
    /// pattern)` ordering the store already applies.
    pub async fn evaluate(&self, path: &str, library_id: i64) -> Result<EvaluationResult> {
        let rules = self.store.list_exclusions_ordered().await?;
        for rule in rules {
            if rule.library_id.is_some() && rule.library_id != Some(library_id) {
                continue;
            }
            if rule_matches(&rule, path) {
                return Ok(EvaluationResult {
                    excluded: true,
                    reason: Some(rule.reason.clone().unwrap_or_else(|| "Excluded by rule".to_string())),
                    matched_rule_id: Some(rule.id),
                });
            }
        }
        Ok(EvaluationResult {
            excluded: false,
            reason: None,
            matched_rule_id: None,
        })
    }

    /// Create a rule and retroactively transition every currently `queued`
    /// file it now matches to `excluded`.
    pub async fn create_rule(
        &self,
        library_id: Option<i64>,
        pattern: &str,
        exclusion_type: ExclusionType,
        reason: Option<&str>,
    ) -> Result<Exclusion> {
        let rule = self
            .store
            .create_exclusion(library_id, pattern, exclusion_type, reason)
            .await?;

        let queued = self.store.list_files_by_status(crate::types::FileStatus::Queued).await?;
        let matching: Vec<i64> = queued
            .iter()
            .filter(|f| library_id.is_none() || library_id == Some(f.library_id))
            .filter(|f| rule_matches(&rule, &f.file_path))
            .map(|f| f.id)
            .collect();

        let reason_text = rule.reason.clone().unwrap_or_else(|| "Excluded by rule".to_string());
        let affected = self.store.bulk_exclude(&matching, &reason_text).await?;
        info!(rule_id = rule.id, affected, "exclusion rule created, files excluded");

        Ok(rule)
    }

    /// Delete a rule and re-queue every `excluded` file that no longer
    /// matches any remaining rule, re-running the Classifier on each so
    /// size/HEVC checks still apply (spec §4.3).
    pub async fn delete_rule(&self, id: i64, classifier: &Classifier) -> Result<Exclusion> {
        let deleted = self.store.delete_exclusion(id).await?;

        let excluded = self.store.list_files_by_status(crate::types::FileStatus::Excluded).await?;
        let mut to_requeue = Vec::new();
        for f in &excluded {
            let eval = self.evaluate(&f.file_path, f.library_id).await?;
            if !eval.excluded {
                to_requeue.push(f.id);
            }
        }

        let affected = self.store.bulk_unexclude(&to_requeue).await?;
        info!(rule_id = id, affected, "exclusion rule deleted, files re-queued");

        for f in &excluded {
            if to_requeue.contains(&f.id) {
                classifier.reclassify(&f.file_path, f.library_id).await?;
            }
        }

        Ok(deleted)
    }
}

fn rule_matches(rule: &Exclusion, path: &str) -> bool {
    match rule.exclusion_type {
        ExclusionType::Folder => path.as_bytes().starts_with(rule.pattern.as_bytes()),
        ExclusionType::Pattern => {
            let Some(re) = glob_to_regex(&rule.pattern) else {
                return false;
            };
            if re.is_match(path) {
                return true;
            }
            let basename = path.rsplit('/').next().unwrap_or(path);
            re.is_match(basename)
        }
    }
}

/// Translate a glob with `**`/`*`/`?` semantics (spec §4.3) into an anchored
/// regex. `**` matches zero or more path segments (i.e. any run of
/// characters, including `/`); `*` matches zero or more non-separator
/// characters; `?` matches exactly one non-separator character.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut out = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                if i + 1 < chars.len() && chars[i + 1] == '*' {
                    out.push_str(".*");
                    i += 2;
                } else {
                    out.push_str("[^/]*");
                    i += 1;
                }
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            c => {
                if regex_syntax::is_meta_character(c) {
                    out.push('\\');
                }
                out.push(c);
                i += 1;
            }
        }
    }
    out.push('$');
    Regex::new(&out).ok()
}

mod regex_syntax {
    pub fn is_meta_character(c: char) -> bool {
        matches!(
            c,
            '.' | '+' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' | '\\'
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExclusionType;

    fn folder(pattern: &str) -> Exclusion {
        Exclusion {
            id: 1,
            library_id: None,
            pattern: pattern.to_string(),
            exclusion_type: ExclusionType::Folder,
            reason: None,
            created_at: chrono::Utc::now(),
        }
    }

    fn pattern_rule(pattern: &str) -> Exclusion {
        Exclusion {
            id: 2,
            library_id: None,
            pattern: pattern.to_string(),
            exclusion_type: ExclusionType::Pattern,
            reason: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn folder_rule_matches_prefix() {
        let rule = folder("/media/m/Frasier");
        assert!(rule_matches(&rule, "/media/m/Frasier/s01e01.mkv"));
        assert!(!rule_matches(&rule, "/media/m/Friends/s01e01.mkv"));
    }

    #[test]
    fn glob_double_star_matches_any_depth() {
        let rule = pattern_rule("**/sample/**");
        assert!(rule_matches(&rule, "/media/m/Movie/sample/clip.mkv"));
        assert!(!rule_matches(&rule, "/media/m/Movie/main.mkv"));
    }

    #[test]
    fn glob_single_star_stays_within_segment() {
        let rule = pattern_rule("/media/m/*.mkv");
        assert!(rule_matches(&rule, "/media/m/a.mkv"));
        assert!(!rule_matches(&rule, "/media/m/sub/a.mkv"));
    }

    #[test]
    fn glob_matches_basename_alone() {
        let rule = pattern_rule("sample.mkv");
        assert!(rule_matches(&rule, "/media/m/whatever/sample.mkv"));
    }
}
