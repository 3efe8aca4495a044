//! Reporting window computation
//!
//! Windows chain: a new window starts where the previous report for the same
//! scope ended, or `window_days` back when no report exists. Start inclusive,
//! end exclusive.

use chrono::{DateTime, Duration, Utc};

use crate::evidence::ReportWindow;

pub fn compute_window(
    previous_window_end: Option<DateTime<Utc>>,
    as_of: DateTime<Utc>,
    window_days: i64,
) -> ReportWindow {
    let start = previous_window_end.unwrap_or_else(|| as_of - Duration::days(window_days));
    ReportWindow::new(start, as_of)
}
