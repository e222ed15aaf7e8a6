//! Queued ingestion: stage the payload, enqueue a message, record a pending status.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use quay_control_plane::BackendError;
use quay_observability::KeyValue;
use quay_resources::{
    DescriptorBuilder, DescriptorPayload, IngestionDescriptor, IngestionMessage,
    IngestionProperties, IngestionSource, IngestionStatus, obfuscate_query,
};
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    backend::IngestBackend,
    client::{ClientCore, IngestClient, IngestState, Operation, Step},
    error::{
        IngestError, ReadSourceSnafu, ResourceDiscoverySnafu, Result, SerializationSnafu,
        ValidationSnafu,
    },
    options::IngestClientOptions,
    result::{IngestOutcome, IngestionKind, IngestionResult},
    status::StatusTracker,
};

/// Ingests everything through staging and the ingestion queue.
pub struct QueuedIngestClient {
    core: Arc<ClientCore>,
}

impl QueuedIngestClient {
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
impl IngestClient for QueuedIngestClient {
    async fn ingest(
        &self,
        source: IngestionSource,
        properties: IngestionProperties,
        ct: &CancellationToken,
    ) -> Result<IngestOutcome> {
        let descriptor = DescriptorBuilder::new()
            .build(source, properties)
            .context(ValidationSnafu)?;
        let mut op = Operation::new(descriptor.operation_id(), "queued", ct);

        let result = async {
            let descriptor = op
                .guard(descriptor.buffered())
                .await?
                .context(ValidationSnafu)?;
            self.core
                .ingest_queued(&mut op, &descriptor, None, None)
                .await
                .map(IngestOutcome::Accepted)
        }
        .await;

        op.finish(result, &self.core.metrics)
    }

    fn status_tracker(&self) -> &StatusTracker {
        &self.core.tracker
    }
}

impl ClientCore {
    /// Run the queued path for `descriptor`.
    ///
    /// `payload` is the already read payload when falling back from streaming.
    pub(crate) async fn ingest_queued(
        &self,
        op: &mut Operation<'_>,
        descriptor: &IngestionDescriptor,
        payload: Option<Bytes>,
        reason: Option<String>,
    ) -> Step<IngestionResult> {
        let authorization_context = op
            .guard(self.backend.resources.authorization_context())
            .await?
            .context(ResourceDiscoverySnafu)?;

        let (blob_uri, staged) = match descriptor.payload() {
            DescriptorPayload::Blob(uri) => (uri.clone(), None),
            _ => {
                let payload = match payload {
                    Some(payload) => payload,
                    None => op
                        .guard(descriptor.read_payload())
                        .await?
                        .context(ReadSourceSnafu)?
                        .ok_or_else(|| IngestError::Internal {
                            message: "source has no payload to stage".to_string(),
                        })?,
                };
                let staged = op.guard(self.stage(descriptor, payload)).await??;
                op.transition(IngestState::Staged);
                (staged.uri.clone(), Some(staged))
            }
        };

        let content = IngestionMessage::new(
            descriptor,
            blob_uri.as_str(),
            authorization_context.as_str(),
        )
        .and_then(|message| message.to_json())
        .context(SerializationSnafu)?;

        if let Err(err) = op.guard(self.enqueue(content)).await? {
            if let Some(blob) = &staged {
                self.delete_staged(blob).await;
            }
            return Err(err.into());
        }
        op.transition(IngestState::Enqueued);

        let status = IngestionStatus::pending(
            op.id(),
            descriptor.database(),
            descriptor.table(),
            obfuscate_query(&blob_uri),
        );
        if let Err(err) = op.guard(self.create_status(status)).await? {
            warn!(operation_id = %op.id(), error = %err, "failed to record pending status");
        }

        self.metrics
            .operations
            .add(1, &[KeyValue::new("path", "queued")]);
        info!(
            operation_id = %op.id(),
            database = descriptor.database(),
            table = descriptor.table(),
            "ingestion enqueued"
        );

        let mut result =
            IngestionResult::new(op.id(), IngestionKind::Queued, descriptor.properties());
        if !result.is_status_reported() {
            debug!(
                operation_id = %op.id(),
                report_level = ?result.report_level,
                report_method = ?result.report_method,
                "ingestion outcome will not be written to the status table"
            );
        }
        result.blob_uri = Some(blob_uri);
        result.reason = reason;
        Ok(result)
    }

    /// Put `content` on an ingestion queue, moving to the next queue on every retry.
    async fn enqueue(&self, content: String) -> Result<()> {
        let queues = self
            .backend
            .resources
            .queues()
            .await
            .context(ResourceDiscoverySnafu)?;
        if queues.is_empty() {
            return Err(IngestError::Internal {
                message: "no ingestion queue available".to_string(),
            });
        }

        let (queues, content) = (&queues, &content);
        self.options
            .transport_retry
            .run(
                "enqueue",
                |attempt| async move {
                    if attempt > 0 {
                        self.count_retry("enqueue");
                    }
                    let queue = &queues[attempt % queues.len()];
                    let result = self.backend.queue.put_message(queue, content.clone()).await;
                    self.backend
                        .resources
                        .report_result(queue, result.as_ref().map(|_| ()))
                        .await;
                    result
                },
                BackendError::is_retryable,
            )
            .await
            .map_err(|err| IngestError::from_backend("enqueue", err))
    }

    async fn create_status(&self, status: IngestionStatus) -> Result<()> {
        let status = &status;
        self.options
            .transport_retry
            .run(
                "create_status",
                |attempt| async move {
                    if attempt > 0 {
                        self.count_retry("create_status");
                    }
                    self.backend.status.create(status.clone()).await
                },
                BackendError::is_retryable,
            )
            .await
            .map_err(|err| IngestError::from_backend("create_status", err))
    }
}
