use quay_observability::{Counter, Histogram};

#[derive(Debug)]
pub struct IngestMetrics {
    pub operations: Counter<u64>,
    pub failures: Counter<u64>,
    pub fallbacks: Counter<u64>,
    pub retries: Counter<u64>,
    pub staged_bytes: Histogram<u64>,
}

impl Default for IngestMetrics {
    fn default() -> Self {
        let meter = quay_observability::meter("ingest");

        Self {
            operations: meter
                .u64_counter("ingest.operation.count")
                .with_description("the number of accepted ingestion operations, by path")
                .build(),
            failures: meter
                .u64_counter("ingest.operation.failure.count")
                .with_description("the number of failed ingestion operations, by path")
                .build(),
            fallbacks: meter
                .u64_counter("ingest.fallback.count")
                .with_description("the number of streaming ingestions that fell back to queued")
                .build(),
            retries: meter
                .u64_counter("ingest.retry.count")
                .with_description("the number of retried calls, by operation")
                .build(),
            staged_bytes: meter
                .u64_histogram("ingest.staged.bytes")
                .with_description("the size of staged blobs")
                .with_unit("By")
                .build(),
        }
    }
}
