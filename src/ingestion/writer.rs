//! Bronze raw event writer
//!
//! The single entry point for external activity. Timestamps must carry a UTC
//! offset; payloads are serialized once and stored byte-for-byte. Writes
//! deduplicate on `(source, external_id)` with no side effects beyond the
//! Bronze row.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::database::{BronzeStore, IngestOutcome, NewRawEvent, StoreError};

/// Ingestion failures
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("timestamp {value:?} has no UTC offset; timezone-aware timestamps are required")]
    TimezoneRequired { value: String },

    #[error("timestamp {value:?} is not a valid RFC 3339 datetime")]
    InvalidTimestamp { value: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Writes raw events into the Bronze store
pub struct RawEventWriter {
    bronze: Arc<dyn BronzeStore>,
}

impl RawEventWriter {
    pub fn new(bronze: Arc<dyn BronzeStore>) -> Self {
        Self { bronze }
    }

    /// Ingest one raw event.
    ///
    /// Returns [`IngestOutcome::Duplicate`] without writing when the
    /// `(source, external_id)` pair has been seen before.
    pub async fn ingest(
        &self,
        source: &str,
        event_type: &str,
        external_id: &str,
        occurred_at: &str,
        payload: &JsonValue,
    ) -> Result<IngestOutcome, IngestError> {
        let occurred_at = parse_event_timestamp(occurred_at)?;
        let payload_text = serde_json::to_string(payload).map_err(StoreError::Serialization)?;

        let event = NewRawEvent {
            id: Uuid::now_v7(),
            source: source.to_string(),
            event_type: event_type.to_string(),
            external_id: external_id.to_string(),
            payload: payload_text,
            received_at: Utc::now(),
            occurred_at,
        };

        Ok(self.bronze.insert_event(&event).await?)
    }
}

/// Parse an event timestamp, requiring an explicit UTC offset.
///
/// A naive datetime parses as [`IngestError::TimezoneRequired`]; anything else
/// unparseable as [`IngestError::InvalidTimestamp`].
pub fn parse_event_timestamp(value: &str) -> Result<DateTime<Utc>, IngestError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let naive_formats = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    if naive_formats
        .iter()
        .any(|fmt| NaiveDateTime::parse_from_str(value, fmt).is_ok())
    {
        return Err(IngestError::TimezoneRequired {
            value: value.to_string(),
        });
    }

    Err(IngestError::InvalidTimestamp {
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_utc_and_offset_timestamps() {
        let utc = parse_event_timestamp("2024-07-10T12:00:00Z").unwrap();
        assert_eq!(utc.to_rfc3339(), "2024-07-10T12:00:00+00:00");

        let offset = parse_event_timestamp("2024-07-10T14:00:00+02:00").unwrap();
        assert_eq!(offset, utc);
    }

    #[test]
    fn rejects_naive_timestamps_as_timezone_required() {
        let err = parse_event_timestamp("2024-07-10T12:00:00").unwrap_err();
        assert!(matches!(err, IngestError::TimezoneRequired { .. }));
    }

    #[test]
    fn rejects_garbage_as_invalid() {
        let err = parse_event_timestamp("next tuesday").unwrap_err();
        assert!(matches!(err, IngestError::InvalidTimestamp { .. }));
    }
}
