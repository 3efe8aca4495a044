//! Report validation
//!
//! Three conservative checks against the model result. Issue codes are
//! stable across versions; anything downstream may match on them.

use crate::model::{MachineSummary, ValidationIssue};

pub const CODE_EMPTY_SUMMARY: &str = "empty_summary";
pub const CODE_TRUNCATED_SUMMARY: &str = "truncated_summary";
pub const CODE_IMPLAUSIBLE_HIGHLIGHTS: &str = "implausible_highlights";

/// Trailing words that indicate an unterminated clause.
const DANGLING_WORDS: &[&str] = &["and", "or", "but", "with", "to", "the", "a", "of", "for"];

/// Validation verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

/// Validate a model result against its bundle's event count.
pub fn validate(result: &MachineSummary, total_event_count: usize) -> Validation {
    let mut issues = Vec::new();
    let summary = result.summary.trim();

    if summary.is_empty() {
        issues.push(ValidationIssue::new(
            CODE_EMPTY_SUMMARY,
            "summary is empty",
        ));
    } else if looks_truncated(summary) {
        issues.push(ValidationIssue::new(
            CODE_TRUNCATED_SUMMARY,
            "summary appears cut off mid-sentence",
        ));
    }

    let max_highlights = total_event_count.max(3);
    if result.highlights.len() > max_highlights
        || (total_event_count == 0 && !result.highlights.is_empty())
    {
        issues.push(ValidationIssue::new(
            CODE_IMPLAUSIBLE_HIGHLIGHTS,
            format!(
                "{} highlight(s) for {} event(s)",
                result.highlights.len(),
                total_event_count
            ),
        ));
    }

    Validation {
        valid: issues.is_empty(),
        issues,
    }
}

fn looks_truncated(summary: &str) -> bool {
    if summary.ends_with("...") || summary.ends_with('…') {
        return true;
    }
    if summary.ends_with(',') || summary.ends_with(';') || summary.ends_with(':') {
        return true;
    }
    let last_word = summary
        .rsplit(|c: char| c.is_whitespace())
        .next()
        .unwrap_or_default()
        .trim_end_matches(|c: char| c == '.' || c == '!' || c == '?')
        .to_lowercase();
    summary
        .chars()
        .last()
        .is_some_and(|c| c.is_alphanumeric())
        && DANGLING_WORDS.contains(&last_word.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StatusCode;

    fn result(summary: &str, highlights: usize) -> MachineSummary {
        MachineSummary {
            status: StatusCode::OnTrack,
            summary: summary.to_string(),
            highlights: (0..highlights).map(|i| format!("highlight {i}")).collect(),
            risks: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    #[test]
    fn empty_summary_fails() {
        let validation = validate(&result("   ", 0), 0);
        assert!(!validation.valid);
        assert_eq!(validation.issues[0].code, CODE_EMPTY_SUMMARY);
    }

    #[test]
    fn ellipsis_and_dangling_clauses_fail() {
        for summary in [
            "The work is going...",
            "The work is going…",
            "The team merged the pipeline and",
            "Progress was made on the",
            "Next we will,",
        ] {
            let validation = validate(&result(summary, 0), 5);
            assert!(!validation.valid, "expected truncated: {summary:?}");
            assert_eq!(validation.issues[0].code, CODE_TRUNCATED_SUMMARY);
        }
    }

    #[test]
    fn complete_sentences_pass() {
        let validation = validate(&result("The window was quiet but healthy.", 0), 5);
        assert!(validation.valid);
    }

    #[test]
    fn highlight_plausibility_boundaries() {
        // 0 events, 1 highlight: implausible.
        let validation = validate(&result("Quiet window.", 1), 0);
        assert!(!validation.valid);
        assert_eq!(validation.issues[0].code, CODE_IMPLAUSIBLE_HIGHLIGHTS);

        // 10 events, 3 highlights: fine.
        assert!(validate(&result("Busy window.", 3), 10).valid);

        // 2 events still allow up to 3 highlights.
        assert!(validate(&result("Small window.", 3), 2).valid);

        // But not 4.
        assert!(!validate(&result("Small window.", 4), 2).valid);
    }

    #[test]
    fn multiple_issues_accumulate() {
        let validation = validate(&result("", 2), 0);
        let codes: Vec<&str> = validation.issues.iter().map(|i| i.code.as_str()).collect();
        assert!(codes.contains(&CODE_EMPTY_SUMMARY));
        assert!(codes.contains(&CODE_IMPLAUSIBLE_HIGHLIGHTS));
    }
}
