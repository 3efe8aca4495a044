//! Report sinks
//!
//! A sink receives the rendered Markdown of a successfully persisted report.
//! The filesystem sink keeps a rolling `latest.md` and an accumulating dated
//! copy per repository; writes are offloaded so the async runtime never
//! blocks on disk I/O.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

/// Sink failures
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("report sink I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("report sink worker failed: {0}")]
    Worker(String),
}

/// Metadata accompanying a sink write
#[derive(Debug, Clone)]
pub struct ReportSinkMetadata {
    pub owner: String,
    pub name: String,
    pub report_id: Uuid,
    pub window_end: DateTime<Utc>,
}

/// Destination for rendered reports
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn write_report(
        &self,
        markdown: &str,
        metadata: &ReportSinkMetadata,
    ) -> Result<(), SinkError>;
}

/// Filesystem sink writing `{base}/{owner}/{name}/latest.md` plus a dated copy
pub struct FilesystemReportSink {
    base: PathBuf,
}

impl FilesystemReportSink {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl ReportSink for FilesystemReportSink {
    async fn write_report(
        &self,
        markdown: &str,
        metadata: &ReportSinkMetadata,
    ) -> Result<(), SinkError> {
        let directory = self.base.join(&metadata.owner).join(&metadata.name);
        let dated_name = format!(
            "{}-{}.md",
            metadata.window_end.format("%Y-%m-%d"),
            metadata.report_id
        );
        let markdown = markdown.to_string();

        let written = tokio::task::spawn_blocking(move || -> Result<PathBuf, std::io::Error> {
            std::fs::create_dir_all(&directory)?;
            std::fs::write(directory.join("latest.md"), &markdown)?;
            let dated = directory.join(dated_name);
            std::fs::write(&dated, &markdown)?;
            Ok(dated)
        })
        .await
        .map_err(|e| SinkError::Worker(e.to_string()))??;

        debug!(path = %written.display(), "report written to filesystem sink");
        Ok(())
    }
}
