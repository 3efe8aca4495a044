//! Bronze store: append-only raw events
//!
//! Raw events are immutable after insert. The only mutable columns are the
//! lifecycle state and its failure reason; payload bytes are stored exactly as
//! delivered and never rewritten.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{StoreError, StoreResult};

/// Raw event lifecycle state matching the DB constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RawEventState {
    Pending,
    Transformed,
    Failed,
}

impl RawEventState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Transformed => "transformed",
            Self::Failed => "failed",
        }
    }
}

/// Persisted raw event row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RawEvent {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub external_id: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
    pub state: RawEventState,
    pub failure_reason: Option<String>,
}

/// Fields for inserting a raw event
#[derive(Debug, Clone)]
pub struct NewRawEvent {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub external_id: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Result of an ingest attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    Duplicate,
}

/// Append-only raw event storage
#[async_trait]
pub trait BronzeStore: Send + Sync {
    /// Insert a raw event, deduplicating on `(source, external_id)`.
    async fn insert_event(&self, event: &NewRawEvent) -> StoreResult<IngestOutcome>;

    /// Fetch up to `limit` pending rows ordered by `(occurred_at, external_id)`.
    async fn fetch_pending(&self, limit: i64) -> StoreResult<Vec<RawEvent>>;

    /// Fetch up to `limit` rows in the given state, oldest first.
    async fn fetch_by_state(&self, state: RawEventState, limit: i64) -> StoreResult<Vec<RawEvent>>;

    async fn get_event(&self, id: Uuid) -> StoreResult<Option<RawEvent>>;

    /// Flip a row to `failed` with a reason. Payload is untouched.
    async fn mark_failed(&self, id: Uuid, reason: &str) -> StoreResult<()>;

    async fn count_by_state(&self, state: RawEventState) -> StoreResult<i64>;
}

const RAW_EVENT_COLUMNS: &str = "id, source, event_type, external_id, payload, received_at, \
                                 occurred_at, state, failure_reason";

/// Postgres-backed Bronze store
pub struct PgBronzeStore {
    pool: PgPool,
}

impl PgBronzeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BronzeStore for PgBronzeStore {
    async fn insert_event(&self, event: &NewRawEvent) -> StoreResult<IngestOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO "ghillie".bronze_raw_events
                (id, source, event_type, external_id, payload, received_at, occurred_at, state)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
            ON CONFLICT (source, external_id) DO NOTHING
            "#,
        )
        .bind(event.id)
        .bind(&event.source)
        .bind(&event.event_type)
        .bind(&event.external_id)
        .bind(&event.payload)
        .bind(event.received_at)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        if result.rows_affected() == 0 {
            Ok(IngestOutcome::Duplicate)
        } else {
            Ok(IngestOutcome::Inserted)
        }
    }

    async fn fetch_pending(&self, limit: i64) -> StoreResult<Vec<RawEvent>> {
        let rows = sqlx::query_as::<_, RawEvent>(&format!(
            r#"
            SELECT {RAW_EVENT_COLUMNS}
            FROM "ghillie".bronze_raw_events
            WHERE state = 'pending'
            ORDER BY occurred_at, external_id
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn fetch_by_state(&self, state: RawEventState, limit: i64) -> StoreResult<Vec<RawEvent>> {
        let rows = sqlx::query_as::<_, RawEvent>(&format!(
            r#"
            SELECT {RAW_EVENT_COLUMNS}
            FROM "ghillie".bronze_raw_events
            WHERE state = $1
            ORDER BY occurred_at, external_id
            LIMIT $2
            "#
        ))
        .bind(state)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn get_event(&self, id: Uuid) -> StoreResult<Option<RawEvent>> {
        let row = sqlx::query_as::<_, RawEvent>(&format!(
            r#"
            SELECT {RAW_EVENT_COLUMNS}
            FROM "ghillie".bronze_raw_events
            WHERE id = $1
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE "ghillie".bronze_raw_events
            SET state = 'failed', failure_reason = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_by_state(&self, state: RawEventState) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM "ghillie".bronze_raw_events WHERE state = $1
            "#,
        )
        .bind(state)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
