//! Managed streaming ingestion.
//!
//! Payloads that can be streamed are sent to the streaming endpoint first.
//! When the endpoint keeps failing transiently or rejects the payload, the
//! same operation falls back to the queued path exactly once, reusing the
//! payload already read and the same operation id. Everything that cannot be
//! streamed goes queued directly.

use std::sync::Arc;

use async_trait::async_trait;
use quay_resources::{DescriptorBuilder, IngestionProperties, IngestionSource};
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    backend::IngestBackend,
    client::{Abort, ClientCore, IngestClient, Operation},
    error::{Result, ValidationSnafu},
    options::IngestClientOptions,
    result::IngestOutcome,
    status::StatusTracker,
    streaming::streamed_outcome,
};

pub struct ManagedStreamingIngestClient {
    core: Arc<ClientCore>,
}

impl ManagedStreamingIngestClient {
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
impl IngestClient for ManagedStreamingIngestClient {
    async fn ingest(
        &self,
        source: IngestionSource,
        properties: IngestionProperties,
        ct: &CancellationToken,
    ) -> Result<IngestOutcome> {
        let descriptor = DescriptorBuilder::new()
            .build(source, properties)
            .context(ValidationSnafu)?;
        let mut op = Operation::new(descriptor.operation_id(), "managed", ct);
        let core = &self.core;

        let result = async {
            let descriptor = op
                .guard(descriptor.buffered())
                .await?
                .context(ValidationSnafu)?;

            if let Some(reason) = core.streaming_blocker(&descriptor) {
                debug!(operation_id = %op.id(), reason = %reason, "using queued ingestion");
                return core
                    .ingest_queued(&mut op, &descriptor, None, None)
                    .await
                    .map(IngestOutcome::Accepted);
            }

            let payload = op.guard(core.read_streaming_payload(&descriptor)).await??;
            let streamed = core
                .ingest_streaming(
                    &mut op,
                    &descriptor,
                    payload.clone(),
                    &core.options.streaming_retry,
                )
                .await;

            match streamed {
                Ok(result) => Ok(streamed_outcome(&descriptor, result)),
                Err(Abort::Failed(err)) if err.allows_queued_fallback() => {
                    warn!(
                        operation_id = %op.id(),
                        state = ?op.state(),
                        error = %err,
                        "streaming ingestion failed, falling back to queued"
                    );
                    core.metrics.fallbacks.add(1, &[]);
                    core.ingest_queued(&mut op, &descriptor, Some(payload), Some(err.to_string()))
                        .await
                        .map(IngestOutcome::Accepted)
                }
                Err(abort) => Err(abort),
            }
        }
        .await;

        op.finish(result, &core.metrics)
    }

    fn status_tracker(&self) -> &StatusTracker {
        &self.core.tracker
    }
}
