//! Upstream GitHub activity contract
//!
//! The core consumes an injected client yielding normalised activity records;
//! the GitHub wire format stays outside the crate. Errors are classified for
//! retry policy: transient failures are retried on the next scheduled pass,
//! permanent ones are logged and dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::observability::ErrorCategory;

/// A normalised activity record from the upstream API.
///
/// `occurred_at` stays in its delivered string form so the Bronze writer can
/// enforce the timezone requirement at the write boundary.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub event_type: String,
    pub external_id: String,
    pub occurred_at: String,
    pub author_login: Option<String>,
    pub author_is_bot: bool,
    pub payload: JsonValue,
}

/// Upstream fetch failures, classified for retry policy
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("transient upstream failure: {0}")]
    Transient(String),

    #[error("permanent upstream failure: {0}")]
    Permanent(String),
}

impl ActivityError {
    /// Classify an HTTP status per the ingestion retry policy: 429 and 5xx
    /// are transient, other 4xx are permanent.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 || status >= 500 {
            Self::Transient(format!("HTTP {status}: {message}"))
        } else {
            Self::Permanent(format!("HTTP {status}: {message}"))
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transient(_) => ErrorCategory::Transient,
            Self::Permanent(_) => ErrorCategory::Permanent,
        }
    }
}

/// Injected upstream client yielding normalised event records
#[async_trait]
pub trait ActivityClient: Send + Sync {
    /// Fetch activity for a repository since the given checkpoint.
    async fn fetch_activity(
        &self,
        owner: &str,
        name: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ActivityRecord>, ActivityError>;
}
