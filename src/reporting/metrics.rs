//! Reporting metrics aggregation
//!
//! Aggregates the nullable metric columns of reports generated inside a
//! period. The p95 is computed in-process (sort + index) so the snapshot
//! behaves identically across database backends. Null fields are ignored in
//! their respective aggregates.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::database::{GoldStore, ReportMetricRow, StoreResult};
use crate::model::ReportScope;

/// Aggregated reporting metrics over a period
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub report_count: usize,
    pub avg_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<i64>,
    pub total_prompt_tokens: i64,
    pub total_completion_tokens: i64,
    pub total_tokens: i64,
}

/// Computes metric snapshots from Gold report rows
pub struct ReportingMetricsService {
    gold: Arc<dyn GoldStore>,
}

impl ReportingMetricsService {
    pub fn new(gold: Arc<dyn GoldStore>) -> Self {
        Self { gold }
    }

    pub async fn snapshot(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        scope_filter: Option<ReportScope>,
    ) -> StoreResult<MetricsSnapshot> {
        let rows = self
            .gold
            .report_metric_rows(period_start, period_end, scope_filter)
            .await?;
        Ok(aggregate(&rows))
    }
}

/// Aggregate metric rows into a snapshot.
pub fn aggregate(rows: &[ReportMetricRow]) -> MetricsSnapshot {
    let mut latencies: Vec<i64> = rows.iter().filter_map(|r| r.model_latency_ms).collect();
    latencies.sort_unstable();

    let avg_latency_ms = if latencies.is_empty() {
        None
    } else {
        Some(latencies.iter().sum::<i64>() as f64 / latencies.len() as f64)
    };

    let p95_latency_ms = percentile_95(&latencies);

    MetricsSnapshot {
        report_count: rows.len(),
        avg_latency_ms,
        p95_latency_ms,
        total_prompt_tokens: rows.iter().filter_map(|r| r.prompt_tokens).sum(),
        total_completion_tokens: rows.iter().filter_map(|r| r.completion_tokens).sum(),
        total_tokens: rows.iter().filter_map(|r| r.total_tokens).sum(),
    }
}

/// p95 by sort + index at ceil(0.95 * n) - 1.
fn percentile_95(sorted: &[i64]) -> Option<i64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let index = ((n as f64) * 0.95).ceil() as usize - 1;
    sorted.get(index.min(n - 1)).copied()
}
