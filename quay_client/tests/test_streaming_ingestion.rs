use std::{collections::HashSet, io::Cursor};

use bytesize::ByteSize;
use common::{create_test_backend, csv_properties, fast_options};
use futures::future::join_all;
use quay_client::{IngestClient, IngestError, IngestOutcome, IngestionKind, StreamingIngestClient};
use quay_control_plane::{ErrorKind, InMemoryBackend};
use quay_resources::{DataFormat, IngestionProperties, IngestionSource, IngestionState};
use tokio_util::sync::CancellationToken;

mod common;

/// Unwrap a streaming refusal, which carries the id of the operation it ended.
fn assert_streaming_refused(err: &IngestError) -> &str {
    let IngestError::OperationFailed { source, .. } = err else {
        panic!("expected an operation failure, got {err:?}");
    };
    let IngestError::StreamingNotSupported { reason } = source.as_ref() else {
        panic!("expected a streaming refusal, got {source:?}");
    };
    assert!(err.operation_id().is_some());
    assert_eq!(err.kind(), ErrorKind::Validation);
    reason
}

#[tokio::test]
async fn test_small_payload_is_streamed() {
    let test = create_test_backend(InMemoryBackend::new());
    let client = StreamingIngestClient::with_options(test.backend.clone(), fast_options());

    let outcome = client
        .ingest(
            IngestionSource::from_bytes("a,b\n1,2\n"),
            csv_properties(),
            &CancellationToken::new(),
        )
        .await
        .expect("ingest");

    let IngestOutcome::Completed { result, status } = outcome else {
        panic!("expected a completed ingestion, got {outcome:?}");
    };
    assert_eq!(result.kind, IngestionKind::Streamed);
    assert!(result.blob_uri.is_none());
    assert_eq!(status.state, IngestionState::Succeeded);

    let streamed = test.service.streamed().await;
    assert_eq!(streamed.len(), 1);
    assert_eq!(streamed[0].operation_id, result.operation_id);
    assert_eq!(streamed[0].format, DataFormat::Csv);
    assert_eq!(&streamed[0].payload[..], b"a,b\n1,2\n");
    assert!(test.service.enqueued().await.is_empty());
}

#[tokio::test]
async fn test_unknown_size_is_never_streamed() {
    let test = create_test_backend(InMemoryBackend::new());
    let client = StreamingIngestClient::with_options(test.backend.clone(), fast_options());

    let err = client
        .ingest(
            IngestionSource::from_reader(Cursor::new(b"a,b\n".to_vec()), None),
            csv_properties(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_streaming_refused(&err);
    assert_eq!(test.service.streaming_calls(), 0);
}

#[tokio::test]
async fn test_undersized_hint_is_checked_against_bytes_read() {
    let test = create_test_backend(InMemoryBackend::new());
    let client = StreamingIngestClient::with_options(
        test.backend.clone(),
        fast_options().with_streaming_threshold(ByteSize::b(16)),
    );

    let err = client
        .ingest(
            IngestionSource::from_reader(Cursor::new(vec![b'a'; 1000]), Some(4)),
            csv_properties(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    let reason = assert_streaming_refused(&err);
    assert!(reason.contains("1000"), "{reason}");
    assert_eq!(test.service.streaming_calls(), 0);
}

#[tokio::test]
async fn test_formats_requiring_a_mapping_are_not_streamed_without_one() {
    let test = create_test_backend(InMemoryBackend::new());
    let client = StreamingIngestClient::with_options(test.backend.clone(), fast_options());

    let err = client
        .ingest(
            IngestionSource::from_bytes("{\"a\":1}"),
            IngestionProperties::new("db1", "t1").with_format(DataFormat::Json),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_streaming_refused(&err);

    client
        .ingest(
            IngestionSource::from_bytes("{\"a\":1}"),
            IngestionProperties::new("db1", "t1")
                .with_format(DataFormat::Json)
                .with_mapping_reference("events_mapping"),
            &CancellationToken::new(),
        )
        .await
        .expect("ingest with mapping");
    assert_eq!(test.service.streaming_calls(), 1);
}

#[tokio::test]
async fn test_concurrent_operations_have_unique_ids() {
    let test = create_test_backend(InMemoryBackend::new());
    let client = StreamingIngestClient::with_options(test.backend.clone(), fast_options());
    let ct = CancellationToken::new();

    let outcomes = join_all((0..10_000).map(|i| {
        client.ingest(
            IngestionSource::from_bytes(format!("{i},row\n")),
            csv_properties(),
            &ct,
        )
    }))
    .await;

    let ids: HashSet<_> = outcomes
        .into_iter()
        .map(|outcome| outcome.expect("ingest").operation_id())
        .collect();
    assert_eq!(ids.len(), 10_000);

    let streamed: HashSet<_> = test
        .service
        .streamed()
        .await
        .into_iter()
        .map(|request| request.operation_id)
        .collect();
    assert_eq!(streamed, ids);
}

#[tokio::test]
async fn test_cancelled_before_sending() {
    let test = create_test_backend(InMemoryBackend::new());
    let client = StreamingIngestClient::with_options(test.backend.clone(), fast_options());
    let ct = CancellationToken::new();
    ct.cancel();

    let outcome = client
        .ingest(IngestionSource::from_bytes("a,b\n"), csv_properties(), &ct)
        .await
        .expect("cancellation is not an error");

    assert!(outcome.is_cancelled());
    assert_eq!(test.service.streaming_calls(), 0);
}
