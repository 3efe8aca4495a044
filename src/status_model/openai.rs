//! OpenAI-compatible status model adapter
//!
//! Speaks the chat-completions subset: one system message, one user message,
//! JSON-object response format. `choices[0].message.content` is parsed as the
//! result JSON; `usage` feeds the invocation metrics side channel.

use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::OpenAiSettings;
use crate::evidence::{ProjectEvidenceBundle, RepositoryEvidenceBundle};
use crate::model::{MachineSummary, StatusCode};

use super::prompt::{project_prompt, repository_prompt, SYSTEM_PROMPT};
use super::{ApiErrorKind, InvocationMetrics, StatusModel, StatusModelError};

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<i64>,
    completion_tokens: Option<i64>,
    total_tokens: Option<i64>,
}

/// Tolerant shape for the model's content JSON: optional keys default, an
/// unknown status string reads as `unknown`.
#[derive(Debug, Deserialize)]
struct WireSummary {
    summary: Option<String>,
    status: Option<StatusCode>,
    #[serde(default)]
    highlights: Vec<String>,
    #[serde(default)]
    risks: Vec<String>,
    #[serde(default)]
    next_steps: Vec<String>,
}

// ============================================================================
// Adapter
// ============================================================================

/// Status model backed by an OpenAI-compatible endpoint
pub struct OpenAiStatusModel {
    settings: OpenAiSettings,
    client: Client,
    last_metrics: Mutex<Option<InvocationMetrics>>,
}

impl OpenAiStatusModel {
    pub fn new(settings: OpenAiSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            settings,
            client,
            last_metrics: Mutex::new(None),
        })
    }

    async fn complete(&self, user_prompt: String) -> Result<MachineSummary, StatusModelError> {
        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt,
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "status model call failed");
            let kind = if status.as_u16() == 429 {
                ApiErrorKind::RateLimited
            } else {
                ApiErrorKind::HttpError
            };
            return Err(StatusModelError::Api {
                kind,
                message: format!("HTTP {status}: {}", truncate(&body, 512)),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| StatusModelError::ResponseShape(e.to_string()))?;

        let latency_ms = started.elapsed().as_millis() as i64;
        self.record_metrics(latency_ms, parsed.usage.as_ref());

        let content = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| StatusModelError::ResponseShape("response has no choices".to_string()))?;

        debug!(latency_ms, "status model responded");
        parse_summary_content(content)
    }

    fn record_metrics(&self, latency_ms: i64, usage: Option<&ChatUsage>) {
        let metrics = InvocationMetrics {
            latency_ms,
            prompt_tokens: usage.and_then(|u| u.prompt_tokens),
            completion_tokens: usage.and_then(|u| u.completion_tokens),
            total_tokens: usage.and_then(|u| u.total_tokens),
        };
        if let Ok(mut slot) = self.last_metrics.lock() {
            *slot = Some(metrics);
        }
    }
}

#[async_trait]
impl StatusModel for OpenAiStatusModel {
    fn model_id(&self) -> String {
        self.settings.model.clone()
    }

    async fn summarize_repository(
        &self,
        bundle: &RepositoryEvidenceBundle,
    ) -> Result<MachineSummary, StatusModelError> {
        self.complete(repository_prompt(bundle)).await
    }

    async fn summarize_project(
        &self,
        bundle: &ProjectEvidenceBundle,
    ) -> Result<MachineSummary, StatusModelError> {
        self.complete(project_prompt(bundle)).await
    }

    fn last_invocation_metrics(&self) -> Option<InvocationMetrics> {
        self.last_metrics.lock().ok().and_then(|slot| *slot)
    }
}

/// Parse the model's content JSON into a summary.
///
/// Missing optional keys are tolerated; missing `summary` or `status` is a
/// [`StatusModelError::ResponseShape`] failure.
pub(crate) fn parse_summary_content(content: &str) -> Result<MachineSummary, StatusModelError> {
    let wire: WireSummary = serde_json::from_str(content)
        .map_err(|e| StatusModelError::ResponseShape(format!("content is not valid JSON: {e}")))?;

    let summary = wire
        .summary
        .ok_or_else(|| StatusModelError::ResponseShape("missing \"summary\" key".to_string()))?;
    let status = wire
        .status
        .ok_or_else(|| StatusModelError::ResponseShape("missing \"status\" key".to_string()))?;

    Ok(MachineSummary {
        status,
        summary,
        highlights: wire.highlights,
        risks: wire.risks,
        next_steps: wire.next_steps,
    })
}

fn classify_transport_error(error: reqwest::Error) -> StatusModelError {
    let kind = if error.is_timeout() {
        ApiErrorKind::Timeout
    } else {
        ApiErrorKind::HttpError
    };
    StatusModelError::Api {
        kind,
        message: error.to_string(),
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_complete_response() {
        let content = r#"{
            "summary": "Steady feature work, one regression fixed.",
            "status": "on_track",
            "highlights": ["merged estuary pipeline"],
            "risks": [],
            "next_steps": ["review open PRs"]
        }"#;
        let summary = parse_summary_content(content).unwrap();
        assert_eq!(summary.status, StatusCode::OnTrack);
        assert_eq!(summary.highlights.len(), 1);
    }

    #[test]
    fn tolerates_missing_optional_keys() {
        let content = r#"{"summary": "quiet week", "status": "on_track"}"#;
        let summary = parse_summary_content(content).unwrap();
        assert!(summary.highlights.is_empty());
        assert!(summary.next_steps.is_empty());
    }

    #[test]
    fn unknown_status_string_reads_as_unknown() {
        let content = r#"{"summary": "odd", "status": "cruising"}"#;
        let summary = parse_summary_content(content).unwrap();
        assert_eq!(summary.status, StatusCode::Unknown);
    }

    #[test]
    fn missing_required_keys_fail_shape_validation() {
        let err = parse_summary_content(r#"{"status": "on_track"}"#).unwrap_err();
        assert!(matches!(err, StatusModelError::ResponseShape(_)));

        let err = parse_summary_content(r#"{"summary": "no status"}"#).unwrap_err();
        assert!(matches!(err, StatusModelError::ResponseShape(_)));
    }

    #[test]
    fn malformed_json_fails_shape_validation() {
        let err = parse_summary_content("the project is fine, trust me").unwrap_err();
        assert!(matches!(err, StatusModelError::ResponseShape(_)));
    }
}
