//! Deterministic heuristic status model
//!
//! No network, no randomness. The same bundle always produces the same
//! summary, which makes this the reference backend for tests and the `mock`
//! configuration.

use async_trait::async_trait;

use crate::evidence::{ProjectEvidenceBundle, RepositoryEvidenceBundle};
use crate::model::{MachineSummary, StatusCode};

use super::{StatusModel, StatusModelError};

/// Deterministic status model used by the `mock` backend
pub struct HeuristicStatusModel;

impl HeuristicStatusModel {
    fn repository_status(bundle: &RepositoryEvidenceBundle) -> StatusCode {
        if bundle.is_empty() {
            return StatusCode::Unknown;
        }
        if let Some(previous) = &bundle.previous_report {
            if !previous.summary.risks.is_empty() {
                return StatusCode::AtRisk;
            }
        }
        if bundle.work_breakdown.bug > bundle.work_breakdown.feature {
            return StatusCode::AtRisk;
        }
        StatusCode::OnTrack
    }

    fn next_steps(bundle: &RepositoryEvidenceBundle, status: StatusCode) -> Vec<String> {
        let mut steps = Vec::new();
        match status {
            StatusCode::AtRisk => steps.push("address risks".to_string()),
            StatusCode::Unknown => steps.push("investigate activity".to_string()),
            _ => {}
        }
        if bundle.open_pull_requests() > 0 {
            steps.push("review open PRs".to_string());
        }
        if bundle.open_issues() > 0 {
            steps.push("triage open issues".to_string());
        }
        steps
    }

    fn highlights(bundle: &RepositoryEvidenceBundle) -> Vec<String> {
        let mut highlights = Vec::new();
        if !bundle.commits.is_empty() {
            highlights.push(format!("{} commit(s) landed", bundle.commits.len()));
        }
        if !bundle.pull_requests.is_empty() {
            highlights.push(format!(
                "{} pull request(s) updated",
                bundle.pull_requests.len()
            ));
        }
        if !bundle.doc_changes.is_empty() {
            highlights.push(format!(
                "{} documentation change(s)",
                bundle.doc_changes.len()
            ));
        }
        highlights.truncate(3);
        highlights
    }

    fn risks(bundle: &RepositoryEvidenceBundle, status: StatusCode) -> Vec<String> {
        let mut risks = Vec::new();
        if let Some(previous) = &bundle.previous_report {
            risks.extend(previous.summary.risks.iter().cloned());
        }
        if status == StatusCode::AtRisk
            && bundle.work_breakdown.bug > bundle.work_breakdown.feature
        {
            risks.push(format!(
                "bug work ({}) outweighs feature work ({})",
                bundle.work_breakdown.bug, bundle.work_breakdown.feature
            ));
        }
        risks
    }
}

#[async_trait]
impl StatusModel for HeuristicStatusModel {
    fn model_id(&self) -> String {
        "heuristic".to_string()
    }

    async fn summarize_repository(
        &self,
        bundle: &RepositoryEvidenceBundle,
    ) -> Result<MachineSummary, StatusModelError> {
        let status = Self::repository_status(bundle);

        let summary = if bundle.is_empty() {
            format!(
                "No recorded activity for {} in this window.",
                bundle.repository.slug()
            )
        } else {
            format!(
                "{} saw {} event(s): {} commit(s), {} pull request(s), {} issue(s).",
                bundle.repository.slug(),
                bundle.total_event_count(),
                bundle.commits.len(),
                bundle.pull_requests.len(),
                bundle.issues.len()
            )
        };

        Ok(MachineSummary {
            status,
            summary,
            highlights: if bundle.is_empty() {
                Vec::new()
            } else {
                Self::highlights(bundle)
            },
            risks: Self::risks(bundle, status),
            next_steps: Self::next_steps(bundle, status),
        })
    }

    async fn summarize_project(
        &self,
        bundle: &ProjectEvidenceBundle,
    ) -> Result<MachineSummary, StatusModelError> {
        let statuses: Vec<StatusCode> = bundle
            .components
            .iter()
            .filter_map(|c| c.repository.as_ref())
            .filter_map(|r| r.latest_report.as_ref())
            .map(|report| report.summary.status)
            .collect();

        let status = if statuses.is_empty() {
            StatusCode::Unknown
        } else if statuses.contains(&StatusCode::Blocked) {
            StatusCode::Blocked
        } else if statuses.contains(&StatusCode::AtRisk) {
            StatusCode::AtRisk
        } else {
            StatusCode::OnTrack
        };

        let summary = format!(
            "Project {} has {} component(s), {} with repository reports.",
            bundle.project.key,
            bundle.components.len(),
            statuses.len()
        );

        let next_steps = match status {
            StatusCode::AtRisk | StatusCode::Blocked => vec!["address risks".to_string()],
            StatusCode::Unknown => vec!["investigate activity".to_string()],
            StatusCode::OnTrack => Vec::new(),
        };

        Ok(MachineSummary {
            status,
            summary,
            highlights: Vec::new(),
            risks: Vec::new(),
            next_steps,
        })
    }
}
