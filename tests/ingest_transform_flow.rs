//! Bronze-to-Silver pipeline behaviour: dedup, idempotent replay, and the
//! payload digest integrity re-check.

mod helpers;

use std::sync::Arc;

use ghillie::database::{BronzeStore, IngestOutcome, RawEventState, SilverStore};
use ghillie::ingestion::{EventTransformer, IngestError, RawEventWriter, TransformerRegistry};
use helpers::{push_payload, InMemoryStores};

fn pipeline(stores: &Arc<InMemoryStores>) -> (RawEventWriter, EventTransformer) {
    let bronze: Arc<dyn BronzeStore> = stores.clone();
    let silver: Arc<dyn SilverStore> = stores.clone();
    (
        RawEventWriter::new(bronze.clone()),
        EventTransformer::new(bronze, silver, TransformerRegistry::standard()),
    )
}

async fn seed_repository(stores: &Arc<InMemoryStores>) {
    let silver: Arc<dyn SilverStore> = stores.clone();
    silver
        .upsert_repository("octo", "reef", Some(&["docs/".to_string()]), true)
        .await
        .unwrap();
}

#[tokio::test]
async fn ingest_then_transform_is_idempotent() {
    let stores = Arc::new(InMemoryStores::new());
    seed_repository(&stores).await;
    let (writer, transformer) = pipeline(&stores);
    let payload = push_payload("octo", "reef", "abc123", "feat: reef pipeline", &[]);

    // Same event twice: one Bronze row.
    let first = writer
        .ingest("github", "push", "push-1", "2024-07-10T12:00:00Z", &payload)
        .await
        .unwrap();
    let second = writer
        .ingest("github", "push", "push-1", "2024-07-10T12:00:00Z", &payload)
        .await
        .unwrap();
    assert_eq!(first, IngestOutcome::Inserted);
    assert_eq!(second, IngestOutcome::Duplicate);
    assert_eq!(stores.raw_event_ids().len(), 1);

    // Two transform passes: one fact, one commit, and the second pass is a
    // no-op.
    let outcome = transformer.transform_pending(100).await.unwrap();
    assert_eq!(outcome.transformed, 1);

    let quiescent = transformer.transform_pending(100).await.unwrap();
    assert_eq!(quiescent.transformed, 0);
    assert_eq!(quiescent.failed, 0);
    assert_eq!(quiescent.skipped, 0);

    let silver: Arc<dyn SilverStore> = stores.clone();
    assert_eq!(silver.count_facts().await.unwrap(), 1);
    assert_eq!(stores.commit_count(), 1);
}

#[tokio::test]
async fn corrupted_payload_fails_the_digest_recheck() {
    let stores = Arc::new(InMemoryStores::new());
    seed_repository(&stores).await;
    let (writer, transformer) = pipeline(&stores);
    let payload = push_payload("octo", "reef", "abc123", "feat: reef pipeline", &[]);

    writer
        .ingest("github", "push", "push-1", "2024-07-10T12:00:00Z", &payload)
        .await
        .unwrap();
    transformer.transform_pending(100).await.unwrap();

    let raw_id = stores.raw_event_ids()[0];
    stores.corrupt_payload(raw_id, r#"{"tampered": true}"#);

    let outcome = transformer.verify_digests(100).await.unwrap();
    assert_eq!(outcome.checked, 1);
    assert_eq!(outcome.mismatched, 1);

    let raw = stores.raw_event(raw_id).unwrap();
    assert_eq!(raw.state, RawEventState::Failed);
    assert_eq!(raw.failure_reason.as_deref(), Some("payload_mismatch"));

    // The fact row is untouched: still exactly one.
    let silver: Arc<dyn SilverStore> = stores.clone();
    assert_eq!(silver.count_facts().await.unwrap(), 1);
}

#[tokio::test]
async fn uncorrupted_payloads_pass_the_recheck() {
    let stores = Arc::new(InMemoryStores::new());
    seed_repository(&stores).await;
    let (writer, transformer) = pipeline(&stores);
    let payload = push_payload("octo", "reef", "abc123", "chore: tidy", &[]);

    writer
        .ingest("github", "push", "push-1", "2024-07-10T12:00:00Z", &payload)
        .await
        .unwrap();
    transformer.transform_pending(100).await.unwrap();

    let outcome = transformer.verify_digests(100).await.unwrap();
    assert_eq!(outcome.checked, 1);
    assert_eq!(outcome.mismatched, 0);

    let bronze: Arc<dyn BronzeStore> = stores.clone();
    assert_eq!(
        bronze.count_by_state(RawEventState::Transformed).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn naive_timestamps_are_rejected_before_any_write() {
    let stores = Arc::new(InMemoryStores::new());
    seed_repository(&stores).await;
    let (writer, _) = pipeline(&stores);
    let payload = push_payload("octo", "reef", "abc123", "fix: naive time", &[]);

    let err = writer
        .ingest("github", "push", "push-1", "2024-07-10T12:00:00", &payload)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::TimezoneRequired { .. }));
    assert!(stores.raw_event_ids().is_empty());
}

#[tokio::test]
async fn events_for_unregistered_repositories_stay_pending() {
    let stores = Arc::new(InMemoryStores::new());
    // No repository seeded.
    let (writer, transformer) = pipeline(&stores);
    let payload = push_payload("ghost", "ship", "abc123", "feat: phantom", &[]);

    writer
        .ingest("github", "push", "push-1", "2024-07-10T12:00:00Z", &payload)
        .await
        .unwrap();

    let outcome = transformer.transform_pending(100).await.unwrap();
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.transformed, 0);

    // Register the slug; the next pass claims the row.
    let silver: Arc<dyn SilverStore> = stores.clone();
    silver
        .upsert_repository("ghost", "ship", None, true)
        .await
        .unwrap();

    let outcome = transformer.transform_pending(100).await.unwrap();
    assert_eq!(outcome.transformed, 1);
}

#[tokio::test]
async fn payloads_without_a_repository_fail() {
    let stores = Arc::new(InMemoryStores::new());
    let (writer, transformer) = pipeline(&stores);

    writer
        .ingest(
            "github",
            "ping",
            "ping-1",
            "2024-07-10T12:00:00Z",
            &serde_json::json!({"zen": "Keep it logically awesome."}),
        )
        .await
        .unwrap();

    let outcome = transformer.transform_pending(100).await.unwrap();
    assert_eq!(outcome.failed, 1);

    let raw = stores.raw_event(stores.raw_event_ids()[0]).unwrap();
    assert_eq!(raw.failure_reason.as_deref(), Some("unknown_repository"));
}

#[tokio::test]
async fn replaying_entity_events_does_not_change_counts() {
    let stores = Arc::new(InMemoryStores::new());
    seed_repository(&stores).await;
    let (writer, transformer) = pipeline(&stores);

    let payload = helpers::pull_request_payload("octo", "reef", 7, "feat: estuary", "open", &[]);
    writer
        .ingest("github", "pull_request", "pr-7-a", "2024-07-10T12:00:00Z", &payload)
        .await
        .unwrap();
    // A later delivery of the same PR with updated state.
    let payload = helpers::pull_request_payload("octo", "reef", 7, "feat: estuary", "closed", &[]);
    writer
        .ingest("github", "pull_request", "pr-7-b", "2024-07-11T12:00:00Z", &payload)
        .await
        .unwrap();

    transformer.transform_pending(100).await.unwrap();

    let silver: Arc<dyn SilverStore> = stores.clone();
    let prs = silver
        .get_pull_requests(
            silver
                .get_repository_by_slug("octo", "reef")
                .await
                .unwrap()
                .unwrap()
                .id,
            &[7],
        )
        .await
        .unwrap();
    assert_eq!(prs.len(), 1);
    assert!(!prs[0].state.is_open());
}
