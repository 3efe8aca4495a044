//! Reporting engine: windows, validation, rendering, sinks, orchestration
//!
//! [`service::ReportingService`] owns the run: compute the window, build
//! evidence, call the status model inside a bounded validation retry loop,
//! persist the report with its coverage, and hand the rendered Markdown to
//! the configured sink.

pub mod markdown;
pub mod metrics;
pub mod scheduler;
pub mod service;
pub mod sink;
pub mod validator;
pub mod windows;

pub use metrics::{MetricsSnapshot, ReportingMetricsService};
pub use scheduler::{run_scheduler, SchedulerConfig};
pub use service::{ReportingConfig, ReportingError, ReportingService};
pub use sink::{FilesystemReportSink, ReportSink, ReportSinkMetadata, SinkError};
pub use validator::{validate, Validation};
pub use windows::compute_window;
