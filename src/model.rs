//! Shared domain vocabulary used across the Medallion tiers
//!
//! Types here cross tier boundaries: status codes and machine summaries flow
//! from the status model into Gold rows and back out through evidence
//! bundles, work types label Silver entities inside bundles, and validation
//! issues travel from the validator into review rows and API responses.

use serde::{Deserialize, Serialize};

/// Report scope discriminator matching the DB constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportScope {
    Repository,
    Project,
    Estate,
}

impl ReportScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Repository => "repository",
            Self::Project => "project",
            Self::Estate => "estate",
        }
    }
}

/// Status code produced by a status model.
///
/// Unknown strings coming back from an LLM deserialize to `Unknown` rather
/// than failing the whole response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    OnTrack,
    AtRisk,
    Blocked,
    #[default]
    #[serde(other)]
    Unknown,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnTrack => "on_track",
            Self::AtRisk => "at_risk",
            Self::Blocked => "blocked",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured status report payload.
///
/// This is both the status model result and the `machine_summary` column of a
/// Gold report row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSummary {
    pub status: StatusCode,
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

/// Work classification for Silver entities inside an evidence bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkType {
    Bug,
    Feature,
    Docs,
    Chore,
    Other,
}

impl WorkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Docs => "docs",
            Self::Chore => "chore",
            Self::Other => "other",
        }
    }
}

/// Lifecycle state of a pull request or issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Open,
    Closed,
    Merged,
}

impl ItemState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Parses an upstream state string; anything unrecognised reads as open.
    pub fn parse(value: &str) -> Self {
        match value {
            "closed" => Self::Closed,
            "merged" => Self::Merged,
            _ => Self::Open,
        }
    }
}

/// A single validation finding with a stable machine-readable code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_strings_deserialize_to_unknown() {
        let parsed: StatusCode = serde_json::from_str("\"cruising\"").unwrap();
        assert_eq!(parsed, StatusCode::Unknown);

        let parsed: StatusCode = serde_json::from_str("\"at_risk\"").unwrap();
        assert_eq!(parsed, StatusCode::AtRisk);
    }

    #[test]
    fn machine_summary_tolerates_missing_lists() {
        let summary: MachineSummary =
            serde_json::from_str(r#"{"status":"on_track","summary":"steady"}"#).unwrap();
        assert!(summary.highlights.is_empty());
        assert!(summary.risks.is_empty());
        assert!(summary.next_steps.is_empty());
    }

    #[test]
    fn item_state_parse_defaults_to_open() {
        assert_eq!(ItemState::parse("open"), ItemState::Open);
        assert_eq!(ItemState::parse("merged"), ItemState::Merged);
        assert_eq!(ItemState::parse("draft"), ItemState::Open);
    }
}
