//! Work-type classification
//!
//! Precedence is fixed: labels first, then title/commit-message prefix
//! patterns, then the docs-path heuristic. Anything unmatched is `Other`.

use crate::model::WorkType;

const BUG_LABELS: &[&str] = &["bug", "fix", "defect", "regression"];
const FEATURE_LABELS: &[&str] = &["feature", "enhancement", "feat"];
const DOCS_LABELS: &[&str] = &["docs", "documentation"];
const CHORE_LABELS: &[&str] = &["chore", "maintenance", "dependencies", "ci"];

/// Classify from labels alone; `None` when no label matches.
pub fn classify_labels(labels: &[String]) -> Option<WorkType> {
    let matches = |candidates: &[&str]| {
        labels
            .iter()
            .any(|label| candidates.contains(&label.to_lowercase().as_str()))
    };

    if matches(BUG_LABELS) {
        Some(WorkType::Bug)
    } else if matches(FEATURE_LABELS) {
        Some(WorkType::Feature)
    } else if matches(DOCS_LABELS) {
        Some(WorkType::Docs)
    } else if matches(CHORE_LABELS) {
        Some(WorkType::Chore)
    } else {
        None
    }
}

/// Classify from a conventional-commit style prefix; `None` when absent.
///
/// Accepts an optional scope and the breaking-change marker, e.g.
/// `fix(parser)!: ...`.
pub fn classify_prefix(text: &str) -> Option<WorkType> {
    let head = text.split(':').next()?.trim().to_lowercase();
    let keyword = head
        .split_once('(')
        .map(|(kw, _)| kw)
        .unwrap_or(&head)
        .trim_end_matches('!');

    match keyword {
        "fix" | "bugfix" | "hotfix" => Some(WorkType::Bug),
        "feat" | "feature" => Some(WorkType::Feature),
        "docs" | "doc" => Some(WorkType::Docs),
        "chore" | "build" | "ci" | "refactor" => Some(WorkType::Chore),
        _ => None,
    }
}

pub fn classify_pull_request(labels: &[String], title: &str) -> WorkType {
    classify_labels(labels)
        .or_else(|| classify_prefix(title))
        .unwrap_or(WorkType::Other)
}

pub fn classify_issue(labels: &[String], title: &str) -> WorkType {
    classify_labels(labels)
        .or_else(|| classify_prefix(title))
        .unwrap_or(WorkType::Other)
}

/// Commits have no labels; prefix first, then the docs-path heuristic.
pub fn classify_commit(message: &str, touched_documentation: bool) -> WorkType {
    classify_prefix(message)
        .or(touched_documentation.then_some(WorkType::Docs))
        .unwrap_or(WorkType::Other)
}
