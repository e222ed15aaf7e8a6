//! Shared machinery of the ingestion clients.
//!
//! Every ingestion is one [`Operation`]. It walks the states
//! `Building -> Streaming -> Staged -> Enqueued -> Completed | Failed`, where
//! the queued path skips `Streaming` and the streaming path skips `Staged` and
//! `Enqueued`. Every remote call is raced against the caller's cancellation
//! token; a cancelled operation reports the last state it reached.

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use quay_observability::KeyValue;
use quay_resources::{IngestionProperties, IngestionSource, IngestionState, OperationId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    backend::IngestBackend,
    error::{IngestError, Result},
    metrics::IngestMetrics,
    options::IngestClientOptions,
    result::IngestOutcome,
    status::{PollOutcome, StatusTracker},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestState {
    Building,
    Streaming { attempt: usize },
    Staged,
    Enqueued,
    Completed,
    Failed,
}

/// Common interface of the queued, streaming and managed streaming clients.
#[async_trait]
pub trait IngestClient: Send + Sync {
    /// Submit one ingestion.
    ///
    /// Queued ingestions return [`IngestOutcome::Accepted`] once enqueued;
    /// streamed ingestions return [`IngestOutcome::Completed`].
    async fn ingest(
        &self,
        source: IngestionSource,
        properties: IngestionProperties,
        ct: &CancellationToken,
    ) -> Result<IngestOutcome>;

    fn status_tracker(&self) -> &StatusTracker;

    /// Submit one ingestion and wait for its terminal status.
    ///
    /// Ingestions whose report settings keep the outcome out of the status
    /// table return [`IngestOutcome::NotReported`] without waiting. Under
    /// `ReportLevel::FailuresOnly` successes are never written either; set
    /// [`PollOptions::timeout`](crate::PollOptions::timeout) or cancel `ct`
    /// to bound the wait.
    async fn ingest_and_wait(
        &self,
        source: IngestionSource,
        properties: IngestionProperties,
        ct: &CancellationToken,
    ) -> Result<IngestOutcome> {
        let outcome = self.ingest(source, properties, ct).await?;
        let IngestOutcome::Accepted(result) = outcome else {
            return Ok(outcome);
        };

        let operation_id = result.operation_id;
        let polled = self
            .status_tracker()
            .wait(&result, ct)
            .await
            .map_err(|source| IngestError::OperationFailed {
                operation_id,
                source: Box::new(source),
            })?;

        match polled {
            PollOutcome::Completed(status) if status.state == IngestionState::Failed => {
                Err(IngestError::OperationFailed {
                    operation_id,
                    source: Box::new(IngestError::IngestionFailed {
                        operation_id,
                        status: Box::new(status),
                    }),
                })
            }
            PollOutcome::Completed(status) => Ok(IngestOutcome::Completed { result, status }),
            PollOutcome::Cancelled { .. } => Ok(IngestOutcome::Cancelled {
                operation_id,
                state: IngestState::Enqueued,
            }),
            PollOutcome::TimedOut { last } => Ok(IngestOutcome::TimedOut { result, last }),
            PollOutcome::NotReported => Ok(IngestOutcome::NotReported(result)),
        }
    }
}

/// Why an operation stopped before completing.
#[derive(Debug)]
pub(crate) enum Abort {
    Cancelled,
    Failed(IngestError),
}

impl From<IngestError> for Abort {
    fn from(err: IngestError) -> Self {
        Self::Failed(err)
    }
}

pub(crate) type Step<T> = std::result::Result<T, Abort>;

pub(crate) struct Operation<'a> {
    id: OperationId,
    state: IngestState,
    path: &'static str,
    ct: &'a CancellationToken,
}

impl<'a> Operation<'a> {
    pub(crate) fn new(id: OperationId, path: &'static str, ct: &'a CancellationToken) -> Self {
        debug!(operation_id = %id, path, "ingestion started");
        Self {
            id,
            state: IngestState::Building,
            path,
            ct,
        }
    }

    pub(crate) fn id(&self) -> OperationId {
        self.id
    }

    pub(crate) fn state(&self) -> IngestState {
        self.state
    }

    pub(crate) fn transition(&mut self, next: IngestState) {
        debug!(
            operation_id = %self.id,
            from = ?self.state,
            to = ?next,
            "ingestion state changed"
        );
        self.state = next;
    }

    /// Await `fut` unless the caller cancels first.
    pub(crate) async fn guard<T>(&self, fut: impl Future<Output = T>) -> Step<T> {
        tokio::select! {
            biased;
            _ = self.ct.cancelled() => Err(Abort::Cancelled),
            value = fut => Ok(value),
        }
    }

    /// Turn the result of the operation body into what the caller sees.
    pub(crate) fn finish(
        mut self,
        result: Step<IngestOutcome>,
        metrics: &IngestMetrics,
    ) -> Result<IngestOutcome> {
        let path = KeyValue::new("path", self.path);
        match result {
            Ok(outcome) => {
                if matches!(outcome, IngestOutcome::Completed { .. }) {
                    self.transition(IngestState::Completed);
                }
                Ok(outcome)
            }
            Err(Abort::Cancelled) => {
                debug!(operation_id = %self.id, state = ?self.state, "ingestion cancelled");
                Ok(IngestOutcome::Cancelled {
                    operation_id: self.id,
                    state: self.state,
                })
            }
            Err(Abort::Failed(err)) => {
                self.transition(IngestState::Failed);
                warn!(operation_id = %self.id, error = %err, "ingestion failed");
                metrics.failures.add(1, &[path]);
                Err(IngestError::OperationFailed {
                    operation_id: self.id,
                    source: Box::new(err),
                })
            }
        }
    }
}

/// State shared by a client and the paths it can take.
pub(crate) struct ClientCore {
    pub backend: IngestBackend,
    pub options: IngestClientOptions,
    pub metrics: Arc<IngestMetrics>,
    pub tracker: StatusTracker,
}

impl ClientCore {
    pub(crate) fn new(backend: IngestBackend, options: IngestClientOptions) -> Self {
        let tracker = StatusTracker::with_options(backend.status.clone(), options.poll.clone());
        Self {
            backend,
            options,
            metrics: Arc::new(IngestMetrics::default()),
            tracker,
        }
    }

    pub(crate) fn count_retry(&self, operation: &'static str) {
        self.metrics
            .retries
            .add(1, &[KeyValue::new("operation", operation)]);
    }
}
