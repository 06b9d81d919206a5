//! Integration tests for the batch upload pipeline:
//!
//! 1. Full upload flow: partition, submit, summarize, verify point count
//! 2. Recovery from transient faults with retry and backoff
//! 3. Mixed permanent/transient failures with partial-failure isolation
//! 4. Strict mode on total failure
//! 5. Idempotent re-upload with a different batch size
//! 6. Pooled upload under faults

use std::sync::Arc;

use quantbench::{
    BackendError, BatchUploader, CollectionSpec, Distance, Error, MemoryBackend, Payload,
    UploadConfig, VectorBackend,
};

const DIM: usize = 4;

fn make_corpus(n: usize) -> (Vec<Payload>, Vec<Vec<f32>>) {
    let payloads = (0..n)
        .map(|i| {
            let mut payload = Payload::new();
            payload.insert("title".to_string(), serde_json::json!(format!("document {i}")));
            payload.insert("position".to_string(), serde_json::json!(i));
            payload
        })
        .collect();
    let vectors = (0..n)
        .map(|i| {
            let angle = i as f32 * 0.1;
            vec![angle.cos(), angle.sin(), 1.0, i as f32 / n as f32]
        })
        .collect();
    (payloads, vectors)
}

async fn new_collection(name: &str) -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .create_collection(name, &CollectionSpec::new(DIM, Distance::Cosine))
        .await
        .unwrap();
    backend
}

/// Test 1: a clean dataset flows through in `ceil(N / batch_size)` batches
/// and every point lands in the collection.
#[tokio::test]
async fn test_full_upload_flow() {
    let backend = new_collection("articles").await;
    let (payloads, vectors) = make_corpus(120);

    let uploader = BatchUploader::new(
        Arc::clone(&backend),
        UploadConfig::default().with_batch_size(25),
    );
    let summary = uploader
        .upload("articles", payloads, vectors)
        .await
        .unwrap();
    println!("{summary}");

    assert_eq!(summary.outcomes.len(), 5);
    assert_eq!(summary.total_items, 120);
    assert_eq!(summary.succeeded_items, 120);
    assert_eq!(summary.failed_items, 0);
    assert!(summary.all_succeeded());
    assert!(summary.to_string().contains("120/120"));

    let info = backend.collection_info("articles").await.unwrap();
    assert_eq!(info.points_count, 120);
}

/// Test 2: transient faults are absorbed by retry with backoff and the
/// upload still completes in full.
#[tokio::test(start_paused = true)]
async fn test_recovery_from_transient_faults() {
    let backend = new_collection("articles").await;
    for message in ["connection reset", "timeout", "backend busy"] {
        backend
            .fail_next_upsert(BackendError::transient(message))
            .await;
    }

    let (payloads, vectors) = make_corpus(80);
    let uploader = BatchUploader::new(
        Arc::clone(&backend),
        UploadConfig::resilient().with_batch_size(20),
    );
    let summary = uploader
        .upload("articles", payloads, vectors)
        .await
        .unwrap();

    assert_eq!(summary.succeeded_items, 80);
    assert_eq!(summary.failed_items, 0);
    // The three faults all hit batch 0, so it took four submissions.
    assert_eq!(summary.outcomes[0].attempts, 4);
    assert!(summary.outcomes[1..].iter().all(|o| o.attempts == 1));
    assert_eq!(
        backend.collection_info("articles").await.unwrap().points_count,
        80
    );
}

/// Test 3: a permanent fault fails its batch without retries and without
/// touching the rest of the run.
#[tokio::test(start_paused = true)]
async fn test_mixed_failures_are_isolated() {
    let backend = new_collection("articles").await;
    backend
        .fail_next_upsert(BackendError::permanent("payload too large"))
        .await;
    backend
        .fail_next_upsert(BackendError::transient("timeout"))
        .await;

    let (payloads, vectors) = make_corpus(60);
    let uploader = BatchUploader::new(
        Arc::clone(&backend),
        UploadConfig::default()
            .with_batch_size(20)
            .with_retry(true)
            .with_max_retries(2),
    );
    let summary = uploader
        .upload("articles", payloads, vectors)
        .await
        .unwrap();

    // Batch 0 died on the permanent fault; batch 1 retried past the
    // transient one; batch 2 was clean.
    let first = &summary.outcomes[0];
    assert!(!first.succeeded);
    assert_eq!(first.attempts, 1);
    assert!(first.error.as_ref().unwrap().is_permanent());

    let second = &summary.outcomes[1];
    assert!(second.succeeded);
    assert_eq!(second.attempts, 2);

    assert_eq!(summary.succeeded_items, 40);
    assert_eq!(summary.failed_items, 20);
    assert_eq!(summary.succeeded_items + summary.failed_items, 60);
}

/// Test 4: strict mode turns zero successful batches into a hard error.
#[tokio::test]
async fn test_strict_mode_total_failure() {
    let backend = new_collection("articles").await;
    for _ in 0..3 {
        backend
            .fail_next_upsert(BackendError::permanent("auth revoked"))
            .await;
    }

    let (payloads, vectors) = make_corpus(30);
    let uploader = BatchUploader::new(
        Arc::clone(&backend),
        UploadConfig::default().with_batch_size(10).with_strict(true),
    );
    let err = uploader
        .upload("articles", payloads, vectors)
        .await
        .unwrap_err();

    match err {
        Error::AllBatchesFailed { collection, batches } => {
            assert_eq!(collection, "articles");
            assert_eq!(batches, 3);
        }
        other => panic!("expected AllBatchesFailed, got {other}"),
    }
}

/// Test 5: ids come from dataset position, so re-uploading with another
/// batch size overwrites in place instead of duplicating.
#[tokio::test]
async fn test_reupload_with_different_batch_size() {
    let backend = new_collection("articles").await;

    let (payloads, vectors) = make_corpus(50);
    let first = BatchUploader::new(
        Arc::clone(&backend),
        UploadConfig::default().with_batch_size(7),
    );
    first.upload("articles", payloads, vectors).await.unwrap();

    let (payloads, vectors) = make_corpus(50);
    let second = BatchUploader::new(
        Arc::clone(&backend),
        UploadConfig::default().with_batch_size(13),
    );
    second.upload("articles", payloads, vectors).await.unwrap();

    let info = backend.collection_info("articles").await.unwrap();
    assert_eq!(info.points_count, 50);
}

/// Test 6: the worker pool covers every batch exactly once and recovers
/// from transient faults just like the sequential path.
#[tokio::test(start_paused = true)]
async fn test_pooled_upload_with_faults() {
    let backend = new_collection("articles").await;
    backend
        .fail_next_upsert(BackendError::transient("timeout"))
        .await;
    backend
        .fail_next_upsert(BackendError::transient("timeout"))
        .await;

    let (payloads, vectors) = make_corpus(90);
    let uploader = BatchUploader::new(
        Arc::clone(&backend),
        UploadConfig::resilient()
            .with_batch_size(10)
            .with_concurrency(3),
    );
    let summary = uploader
        .upload("articles", payloads, vectors)
        .await
        .unwrap();

    assert_eq!(summary.outcomes.len(), 9);
    let indexes: Vec<usize> = summary.outcomes.iter().map(|o| o.batch_index).collect();
    assert_eq!(indexes, (0..9).collect::<Vec<_>>());
    assert_eq!(summary.succeeded_items, 90);
    assert_eq!(
        backend.collection_info("articles").await.unwrap().points_count,
        90
    );
}

/// The summary serializes with per-batch outcomes for downstream tooling.
#[tokio::test]
async fn test_summary_serialization_shape() {
    let backend = new_collection("articles").await;
    backend
        .fail_next_upsert(BackendError::permanent("quota exceeded"))
        .await;

    let (payloads, vectors) = make_corpus(20);
    let uploader = BatchUploader::new(
        backend,
        UploadConfig::default().with_batch_size(10),
    );
    let summary = uploader
        .upload("articles", payloads, vectors)
        .await
        .unwrap();

    let value = serde_json::to_value(&summary).unwrap();
    assert_eq!(value["total_items"], 20);
    assert_eq!(value["succeeded_items"], 10);
    assert_eq!(value["failed_items"], 10);
    assert_eq!(value["outcomes"][0]["succeeded"], false);
    assert_eq!(value["outcomes"][0]["error"]["kind"], "permanent");
    assert_eq!(value["outcomes"][1]["succeeded"], true);
    assert!(value["outcomes"][1].get("error").is_none());
}
