//! Markdown rendering of persisted reports
//!
//! Rendering is a pure function of the machine summary plus repository and
//! window metadata. Sections with empty lists are omitted.

use std::fmt::Write;

use crate::database::Report;

/// Render a repository report as Markdown.
pub fn render_report(owner: &str, name: &str, report: &Report) -> String {
    let mut text = String::new();

    let _ = writeln!(
        text,
        "# {owner}/{name} — Status report ({} to {})",
        report.window_start.format("%Y-%m-%d"),
        report.window_end.format("%Y-%m-%d"),
    );
    text.push('\n');

    let summary = &report.machine_summary;
    let _ = writeln!(text, "**Status:** {}", summary.status);
    text.push('\n');

    text.push_str("## Summary\n\n");
    let _ = writeln!(text, "{}", summary.summary);

    render_list(&mut text, "Highlights", &summary.highlights);
    render_list(&mut text, "Risks", &summary.risks);
    render_list(&mut text, "Next steps", &summary.next_steps);

    text.push('\n');
    let _ = writeln!(
        text,
        "---\n_Model: {} · Report: {}_",
        report.model, report.id
    );

    text
}

fn render_list(text: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = write!(text, "\n## {heading}\n\n");
    for item in items {
        let _ = writeln!(text, "- {item}");
    }
}
