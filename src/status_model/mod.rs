//! Status model port
//!
//! A status model turns an evidence bundle into a structured status summary.
//! Two variants ship: a deterministic heuristic for tests and air-gapped
//! deployments, and an adapter for OpenAI-compatible chat-completions
//! endpoints. Invocation metrics are a side channel the reporting service
//! reads after each call; adapters without metrics simply return `None`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ConfigError, StatusModelBackend};
use crate::evidence::{ProjectEvidenceBundle, RepositoryEvidenceBundle};
use crate::model::MachineSummary;

pub mod heuristic;
pub mod openai;
pub mod prompt;

pub use heuristic::HeuristicStatusModel;
pub use openai::OpenAiStatusModel;

/// Metrics captured around one model invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationMetrics {
    pub latency_ms: i64,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

/// Classification of model API failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    RateLimited,
    HttpError,
    Timeout,
}

impl ApiErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::HttpError => "http_error",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status model failures
#[derive(Debug, thiserror::Error)]
pub enum StatusModelError {
    /// Output unparseable or missing required fields; counts toward the
    /// validation retry budget.
    #[error("model response did not match the expected shape: {0}")]
    ResponseShape(String),

    /// Transport-level failure; fails the reporting run.
    #[error("model API error ({kind}): {message}")]
    Api { kind: ApiErrorKind, message: String },
}

/// Summarises evidence bundles into structured status results
#[async_trait]
pub trait StatusModel: Send + Sync {
    /// Identifier recorded in `Report.model`.
    fn model_id(&self) -> String;

    async fn summarize_repository(
        &self,
        bundle: &RepositoryEvidenceBundle,
    ) -> Result<MachineSummary, StatusModelError>;

    async fn summarize_project(
        &self,
        bundle: &ProjectEvidenceBundle,
    ) -> Result<MachineSummary, StatusModelError>;

    /// Metrics from the most recent invocation, when the adapter records
    /// them.
    fn last_invocation_metrics(&self) -> Option<InvocationMetrics> {
        None
    }
}

/// Construct the configured status model variant.
pub fn build_status_model(
    backend: &StatusModelBackend,
) -> Result<Arc<dyn StatusModel>, ConfigError> {
    match backend {
        StatusModelBackend::Mock => Ok(Arc::new(HeuristicStatusModel)),
        StatusModelBackend::OpenAi(settings) => {
            let model = OpenAiStatusModel::new(settings.clone()).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "OPENAI_ENDPOINT",
                    message: e.to_string(),
                }
            })?;
            Ok(Arc::new(model))
        }
    }
}
