//! Prompt assembly for the LLM-backed status model
//!
//! The bundle serializes into a plain-text briefing: previous-report context,
//! an activity summary, the work-type breakdown, and PR/issue listings. The
//! system prompt pins the output to a single JSON object matching the result
//! schema.

use std::fmt::Write;

use crate::evidence::{ProjectEvidenceBundle, RepositoryEvidenceBundle};

/// Fixed system prompt enforcing JSON-only output.
pub const SYSTEM_PROMPT: &str = "You are an engineering status reporter. You receive evidence \
about recent repository or project activity and produce a status report. Respond with a single \
JSON object and nothing else, using exactly these keys: \"summary\" (string), \"status\" (one of \
\"on_track\", \"at_risk\", \"blocked\", \"unknown\"), \"highlights\" (array of short strings), \
\"risks\" (array of short strings), \"next_steps\" (array of short strings). Base every claim on \
the supplied evidence; do not invent activity.";

/// Serialize a repository bundle into the user prompt.
pub fn repository_prompt(bundle: &RepositoryEvidenceBundle) -> String {
    let mut text = String::new();

    let _ = writeln!(
        text,
        "Repository: {}\nWindow: {} to {} (end exclusive)\n",
        bundle.repository.slug(),
        bundle.window.start.to_rfc3339(),
        bundle.window.end.to_rfc3339(),
    );

    match &bundle.previous_report {
        Some(previous) => {
            let _ = writeln!(
                text,
                "Previous report ({}): status {}, summary: {}",
                previous.generated_at.to_rfc3339(),
                previous.summary.status,
                previous.summary.summary,
            );
            if !previous.summary.risks.is_empty() {
                let _ = writeln!(text, "Previous risks: {}", previous.summary.risks.join("; "));
            }
            text.push('\n');
        }
        None => {
            let _ = writeln!(text, "No previous report for this repository.\n");
        }
    }

    let _ = writeln!(
        text,
        "Activity: {} event(s), {} commit(s), {} pull request(s), {} issue(s), {} documentation change(s).",
        bundle.total_event_count(),
        bundle.commits.len(),
        bundle.pull_requests.len(),
        bundle.issues.len(),
        bundle.doc_changes.len(),
    );

    let breakdown = &bundle.work_breakdown;
    let _ = writeln!(
        text,
        "Work breakdown: bug={}, feature={}, docs={}, chore={}, other={}\n",
        breakdown.bug, breakdown.feature, breakdown.docs, breakdown.chore, breakdown.other,
    );

    if !bundle.pull_requests.is_empty() {
        text.push_str("Pull requests:\n");
        for pr in &bundle.pull_requests {
            let _ = writeln!(
                text,
                "- #{} [{}] ({}) {}",
                pr.number,
                pr.state.is_open().then_some("open").unwrap_or("closed"),
                pr.work_type.as_str(),
                pr.title,
            );
        }
        text.push('\n');
    }

    if !bundle.issues.is_empty() {
        text.push_str("Issues:\n");
        for issue in &bundle.issues {
            let _ = writeln!(
                text,
                "- #{} [{}] ({}) {}",
                issue.number,
                issue.state.is_open().then_some("open").unwrap_or("closed"),
                issue.work_type.as_str(),
                issue.title,
            );
        }
        text.push('\n');
    }

    if !bundle.commits.is_empty() {
        text.push_str("Commits:\n");
        for commit in &bundle.commits {
            let first_line = commit.message.lines().next().unwrap_or_default();
            let _ = writeln!(
                text,
                "- {} ({}) {}",
                &commit.sha[..commit.sha.len().min(10)],
                commit.work_type.as_str(),
                first_line,
            );
        }
        text.push('\n');
    }

    text.push_str("Produce the status report JSON now.");
    text
}

/// Serialize a project bundle into the user prompt.
pub fn project_prompt(bundle: &ProjectEvidenceBundle) -> String {
    let mut text = String::new();

    let _ = writeln!(
        text,
        "Project: {} ({})\n",
        bundle.project.name, bundle.project.key
    );

    text.push_str("Components:\n");
    for component in &bundle.components {
        match &component.repository {
            Some(repository) => {
                let status = repository
                    .latest_report
                    .as_ref()
                    .map(|r| r.summary.status.as_str())
                    .unwrap_or("no report yet");
                let _ = writeln!(
                    text,
                    "- {} [{}] repository {}: {}",
                    component.name,
                    component.lifecycle.as_str(),
                    repository.slug,
                    status,
                );
            }
            None => {
                let _ = writeln!(
                    text,
                    "- {} [{}] (no repository)",
                    component.name,
                    component.lifecycle.as_str(),
                );
            }
        }
    }
    text.push('\n');

    if !bundle.dependencies.is_empty() {
        text.push_str("Dependencies:\n");
        for edge in &bundle.dependencies {
            let _ = writeln!(
                text,
                "- {} {} {}",
                edge.from_component,
                edge.kind.as_str(),
                edge.to_component,
            );
        }
        text.push('\n');
    }

    text.push_str("Produce the status report JSON now.");
    text
}
