//! Streaming ingestion: send the payload inline to the streaming endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use quay_control_plane::{ErrorKind, RetryPolicy, StreamingRequest};
use quay_observability::KeyValue;
use quay_resources::{
    DescriptorBuilder, IngestionDescriptor, IngestionProperties, IngestionSource, IngestionState,
    IngestionStatus,
};
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    backend::IngestBackend,
    client::{ClientCore, IngestClient, IngestState, Operation, Step},
    error::{AuthenticationSnafu, IngestError, ReadSourceSnafu, Result, ValidationSnafu},
    options::IngestClientOptions,
    result::{IngestOutcome, IngestionKind, IngestionResult},
    status::StatusTracker,
};

/// Ingests small payloads inline. Payloads that cannot be streamed are rejected.
pub struct StreamingIngestClient {
    core: Arc<ClientCore>,
}

impl StreamingIngestClient {
    pub fn new(backend: IngestBackend) -> Self {
        Self::with_options(backend, IngestClientOptions::default())
    }

    pub fn with_options(backend: IngestBackend, options: IngestClientOptions) -> Self {
        Self {
            core: Arc::new(ClientCore::new(backend, options)),
        }
    }
}

#[async_trait]
impl IngestClient for StreamingIngestClient {
    async fn ingest(
        &self,
        source: IngestionSource,
        properties: IngestionProperties,
        ct: &CancellationToken,
    ) -> Result<IngestOutcome> {
        let descriptor = DescriptorBuilder::new()
            .build(source, properties)
            .context(ValidationSnafu)?;
        let mut op = Operation::new(descriptor.operation_id(), "streaming", ct);

        let result = async {
            // Checked before reading a stream and again once its real size is known.
            self.core.ensure_streamable(&descriptor)?;
            let descriptor = op
                .guard(descriptor.buffered())
                .await?
                .context(ValidationSnafu)?;
            self.core.ensure_streamable(&descriptor)?;
            let payload = op.guard(self.core.read_streaming_payload(&descriptor)).await??;
            self.core
                .ingest_streaming(&mut op, &descriptor, payload, &self.core.options.streaming_retry)
                .await
                .map(|result| streamed_outcome(&descriptor, result))
        }
        .await;

        op.finish(result, &self.core.metrics)
    }

    fn status_tracker(&self) -> &StatusTracker {
        &self.core.tracker
    }
}

/// A streamed ingestion is complete once the endpoint accepted it.
pub(crate) fn streamed_outcome(
    descriptor: &IngestionDescriptor,
    result: IngestionResult,
) -> IngestOutcome {
    let mut status = IngestionStatus::pending(
        result.operation_id,
        descriptor.database(),
        descriptor.table(),
        descriptor.source_name(),
    );
    status.transition(IngestionState::Succeeded);
    IngestOutcome::Completed { result, status }
}

impl ClientCore {
    /// Why `descriptor` cannot take the streaming path, if it cannot.
    pub(crate) fn streaming_blocker(&self, descriptor: &IngestionDescriptor) -> Option<String> {
        if descriptor.is_blob() {
            return Some("blob sources are always queued".to_string());
        }

        let threshold = self.options.streaming_threshold.as_u64();
        match descriptor.raw_size() {
            None => return Some("source size is unknown".to_string()),
            Some(size) if size >= threshold => {
                return Some(format!(
                    "source size {size} exceeds the streaming limit of {}",
                    self.options.streaming_threshold
                ));
            }
            Some(_) => {}
        }

        if !descriptor.has_required_mapping() {
            return Some(format!(
                "format {} requires an ingestion mapping",
                descriptor.format()
            ));
        }

        None
    }

    pub(crate) fn ensure_streamable(&self, descriptor: &IngestionDescriptor) -> Result<()> {
        match self.streaming_blocker(descriptor) {
            Some(reason) => Err(IngestError::StreamingNotSupported { reason }),
            None => Ok(()),
        }
    }

    pub(crate) async fn read_streaming_payload(
        &self,
        descriptor: &IngestionDescriptor,
    ) -> Result<Bytes> {
        descriptor
            .read_payload()
            .await
            .context(ReadSourceSnafu)?
            .ok_or_else(|| IngestError::StreamingNotSupported {
                reason: "blob sources are always queued".to_string(),
            })
    }

    pub(crate) async fn ingest_streaming(
        &self,
        op: &mut Operation<'_>,
        descriptor: &IngestionDescriptor,
        payload: Bytes,
        retry: &RetryPolicy,
    ) -> Step<IngestionResult> {
        let tokens = self.backend.resources.tokens();
        let token = op.guard(tokens.get()).await?.context(AuthenticationSnafu)?;

        let request = StreamingRequest {
            operation_id: op.id(),
            database: descriptor.database().to_string(),
            table: descriptor.table().to_string(),
            format: descriptor.format(),
            mapping: descriptor.properties().mapping.clone(),
            compression: descriptor.compression(),
            payload,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            op.transition(IngestState::Streaming { attempt });

            let err = match op
                .guard(self.backend.streaming.ingest(request.clone(), &token))
                .await?
            {
                Ok(()) => break,
                Err(err) => err,
            };

            if err.kind() == ErrorKind::Authentication {
                tokens.invalidate().await;
            }
            if !err.is_retryable() || attempt >= retry.max_attempts() {
                return Err(IngestError::from_backend("streaming_ingest", err).into());
            }

            let delay = retry.delay_for(attempt - 1);
            warn!(
                operation_id = %op.id(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "streaming attempt failed, retrying"
            );
            self.count_retry("streaming_ingest");
            op.guard(tokio::time::sleep(delay)).await?;
        }

        self.metrics
            .operations
            .add(1, &[KeyValue::new("path", "streaming")]);
        info!(
            operation_id = %op.id(),
            database = descriptor.database(),
            table = descriptor.table(),
            attempts = attempt,
            "ingestion streamed"
        );

        Ok(IngestionResult::new(
            op.id(),
            IngestionKind::Streamed,
            descriptor.properties(),
        ))
    }
}
