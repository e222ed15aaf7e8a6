use std::{sync::Arc, time::Duration};

use futures::TryStreamExt;
use object_store::{ObjectStore, path::Path};
use quay_client::{IngestBackend, IngestClientOptions, PollOptions};
use quay_control_plane::{InMemoryBackend, ResourceManagerOptions, RetryPolicy};
use quay_object_store::InMemoryObjectStoreFactory;
use quay_resources::{DataFormat, IngestionProperties, ReportLevel, ReportMethod, StagedResource};

pub struct TestBackend {
    pub service: Arc<InMemoryBackend>,
    pub stores: Arc<InMemoryObjectStoreFactory>,
    pub backend: IngestBackend,
}

pub fn fast_retry(max_attempts: usize) -> RetryPolicy {
    RetryPolicy::new(max_attempts, vec![Duration::from_millis(5)])
}

pub fn create_test_backend(service: InMemoryBackend) -> TestBackend {
    let service = Arc::new(service);
    let stores = Arc::new(InMemoryObjectStoreFactory::new());
    let backend = IngestBackend::in_memory(
        service.clone(),
        stores.clone(),
        ResourceManagerOptions::default().with_discovery_retry(fast_retry(4)),
    );

    TestBackend {
        service,
        stores,
        backend,
    }
}

/// Client options with millisecond retries, for tests that do not measure time.
pub fn fast_options() -> IngestClientOptions {
    IngestClientOptions::default()
        .with_streaming_retry(fast_retry(3))
        .with_transport_retry(fast_retry(4))
        .with_poll(
            PollOptions::default()
                .with_initial_interval(Duration::from_millis(10))
                .with_max_interval(Duration::from_millis(50)),
        )
}

pub fn csv_properties() -> IngestionProperties {
    IngestionProperties::new("db1", "t1").with_format(DataFormat::Csv)
}

/// CSV properties whose outcome, success or failure, is written to the status table.
pub fn reported_csv_properties() -> IngestionProperties {
    csv_properties()
        .with_report_level(ReportLevel::FailuresAndSuccesses)
        .with_report_method(ReportMethod::Table)
}

/// Names of every blob staged into `container`.
pub async fn staged_blobs(stores: &InMemoryObjectStoreFactory, container: &StagedResource) -> Vec<Path> {
    let Some(store) = stores.store(container) else {
        return Vec::new();
    };
    store
        .list(None)
        .map_ok(|meta| meta.location)
        .try_collect()
        .await
        .expect("list staged blobs")
}
