use std::io::Cursor;

use bytesize::ByteSize;
use common::{create_test_backend, csv_properties, fast_options};
use quay_client::{
    IngestClient, IngestError, IngestOutcome, IngestionKind, ManagedStreamingIngestClient,
};
use quay_control_plane::{BackendError, ErrorKind, InMemoryBackend};
use quay_resources::{IngestionSource, IngestionState};
use tokio_util::sync::CancellationToken;

mod common;

#[tokio::test]
async fn test_streams_when_possible() {
    let test = create_test_backend(InMemoryBackend::new());
    let client = ManagedStreamingIngestClient::with_options(test.backend.clone(), fast_options());

    let outcome = client
        .ingest(
            IngestionSource::from_bytes("a,b\n"),
            csv_properties(),
            &CancellationToken::new(),
        )
        .await
        .expect("ingest");

    let IngestOutcome::Completed { result, status } = outcome else {
        panic!("expected a completed ingestion, got {outcome:?}");
    };
    assert_eq!(result.kind, IngestionKind::Streamed);
    assert_eq!(status.state, IngestionState::Succeeded);
    assert!(test.service.enqueued().await.is_empty());
}

#[tokio::test]
async fn test_unknown_size_goes_queued_without_streaming() {
    let test = create_test_backend(InMemoryBackend::new());
    let client = ManagedStreamingIngestClient::with_options(test.backend.clone(), fast_options());

    let outcome = client
        .ingest(
            IngestionSource::from_reader(Cursor::new(b"a,b\n1,2\n".to_vec()), None),
            csv_properties(),
            &CancellationToken::new(),
        )
        .await
        .expect("ingest");

    assert_eq!(outcome.result().unwrap().kind, IngestionKind::Queued);
    assert_eq!(test.service.streaming_calls(), 0);
    assert_eq!(test.service.messages().await.len(), 1);
}

#[tokio::test]
async fn test_large_payload_goes_queued() {
    let test = create_test_backend(InMemoryBackend::new());
    let client = ManagedStreamingIngestClient::with_options(
        test.backend.clone(),
        fast_options().with_streaming_threshold(ByteSize::b(16)),
    );

    let outcome = client
        .ingest(
            IngestionSource::from_bytes("a".repeat(16)),
            csv_properties(),
            &CancellationToken::new(),
        )
        .await
        .expect("ingest");

    assert!(matches!(outcome, IngestOutcome::Accepted(_)));
    assert_eq!(test.service.streaming_calls(), 0);
}

#[tokio::test]
async fn test_undersized_hint_goes_queued() {
    let test = create_test_backend(InMemoryBackend::new());
    let client = ManagedStreamingIngestClient::with_options(
        test.backend.clone(),
        fast_options().with_streaming_threshold(ByteSize::b(16)),
    );

    let outcome = client
        .ingest(
            IngestionSource::from_reader(Cursor::new(vec![b'a'; 1000]), Some(4)),
            csv_properties(),
            &CancellationToken::new(),
        )
        .await
        .expect("ingest");

    let IngestOutcome::Accepted(result) = outcome else {
        panic!("expected a queued ingestion, got {outcome:?}");
    };
    assert_eq!(result.kind, IngestionKind::Queued);
    assert_eq!(test.service.streaming_calls(), 0);
    assert_eq!(test.service.messages().await.len(), 1);
}

#[tokio::test]
async fn test_retryable_rejection_falls_back_once_with_same_id() {
    let test = create_test_backend(InMemoryBackend::new());
    let client = ManagedStreamingIngestClient::with_options(test.backend.clone(), fast_options());
    test.service.reject_streaming_always(BackendError::Throttled {
        message: "slow down".into(),
    });

    let outcome = client
        .ingest(
            IngestionSource::from_bytes("a,b\n"),
            csv_properties(),
            &CancellationToken::new(),
        )
        .await
        .expect("ingest");

    let IngestOutcome::Accepted(result) = outcome else {
        panic!("expected a queued ingestion, got {outcome:?}");
    };
    assert_eq!(result.kind, IngestionKind::Queued);
    assert!(result.reason.is_some());
    assert_eq!(test.service.streaming_calls(), 3);

    let messages = test.service.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, result.operation_id);
}

#[tokio::test]
async fn test_permanent_streaming_rejection_falls_back_immediately() {
    let test = create_test_backend(InMemoryBackend::new());
    let client = ManagedStreamingIngestClient::with_options(test.backend.clone(), fast_options());
    test.service.fail_streaming(BackendError::StreamingRejected {
        message: "streaming ingestion is disabled for t1".into(),
    });

    let outcome = client
        .ingest(
            IngestionSource::from_bytes("a,b\n"),
            csv_properties(),
            &CancellationToken::new(),
        )
        .await
        .expect("ingest");

    assert!(matches!(outcome, IngestOutcome::Accepted(_)));
    assert_eq!(test.service.streaming_calls(), 1);
    assert_eq!(test.service.enqueued().await.len(), 1);
}

#[tokio::test]
async fn test_transient_streaming_error_is_retried() {
    let test = create_test_backend(InMemoryBackend::new());
    let client = ManagedStreamingIngestClient::with_options(test.backend.clone(), fast_options());
    test.service.fail_streaming(BackendError::Timeout {
        operation: "streaming_ingest",
    });

    let outcome = client
        .ingest(
            IngestionSource::from_bytes("a,b\n"),
            csv_properties(),
            &CancellationToken::new(),
        )
        .await
        .expect("ingest");

    assert_eq!(outcome.result().unwrap().kind, IngestionKind::Streamed);
    assert_eq!(test.service.streaming_calls(), 2);
    assert!(test.service.enqueued().await.is_empty());
}

#[tokio::test]
async fn test_authentication_failure_does_not_fall_back() {
    let test = create_test_backend(InMemoryBackend::new());
    let client = ManagedStreamingIngestClient::with_options(test.backend.clone(), fast_options());
    test.service.fail_streaming(BackendError::Unauthorized {
        message: "token rejected".into(),
    });

    let err = client
        .ingest(
            IngestionSource::from_bytes("a,b\n"),
            csv_properties(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::OperationFailed { .. }));
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(test.service.enqueued().await.is_empty());
}
