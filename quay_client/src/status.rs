//! Observing queued ingestions until they reach a terminal state.
//!
//! Only ingestions whose report settings write to the status table can be
//! observed. Under `ReportLevel::FailuresOnly` a successful ingestion is never
//! written, so waiting on one only ends through [`PollOptions::timeout`] or
//! cancellation.

use std::{sync::Arc, time::Duration};

use futures::{
    future,
    stream::{self, BoxStream, StreamExt},
};
use quay_control_plane::{BackendError, ErrorKind, StatusTable};
use quay_resources::{IngestionState, IngestionStatus, OperationId};
use tokio::{sync::watch, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::{IngestError, Result},
    result::IngestionResult,
};

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub initial_interval: Duration,
    /// Growth of the interval after every poll that found the operation pending.
    pub multiplier: f64,
    pub max_interval: Duration,
    /// Consecutive transient errors tolerated before polling gives up.
    pub max_transient_errors: usize,
    /// How long [`StatusTracker::poll`] waits for a terminal status. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            multiplier: 2.0,
            max_interval: Duration::from_secs(30),
            max_transient_errors: 5,
            timeout: None,
        }
    }
}

impl PollOptions {
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_max_transient_errors(mut self, errors: usize) -> Self {
        self.max_transient_errors = errors;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn next_interval(&self, interval: Duration) -> Duration {
        let multiplier = if self.multiplier.is_finite() {
            self.multiplier.max(1.0)
        } else {
            1.0
        };
        Duration::try_from_secs_f64(interval.as_secs_f64() * multiplier)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }

    /// Whether polling should keep going after `err`, the `errors`-th in a row.
    fn tolerates(&self, err: &BackendError, errors: usize) -> bool {
        // The status record is created after the enqueue and may not be visible yet.
        let transient = err.is_retryable() || err.kind() == ErrorKind::NotFound;
        transient && errors <= self.max_transient_errors
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed(IngestionStatus),
    /// The caller stopped waiting. The ingestion itself is unaffected.
    Cancelled { last: Option<IngestionStatus> },
    /// No terminal status before [`PollOptions::timeout`].
    TimedOut { last: Option<IngestionStatus> },
    /// The report settings keep the outcome out of the status table.
    NotReported,
}

/// Reads ingestion statuses from the status table.
#[derive(Clone)]
pub struct StatusTracker {
    table: Arc<dyn StatusTable>,
    options: PollOptions,
}

impl StatusTracker {
    pub fn new(table: Arc<dyn StatusTable>) -> Self {
        Self::with_options(table, PollOptions::default())
    }

    pub fn with_options(table: Arc<dyn StatusTable>, options: PollOptions) -> Self {
        Self { table, options }
    }

    pub async fn status(&self, operation_id: OperationId) -> Result<IngestionStatus> {
        self.table
            .get(operation_id)
            .await
            .map_err(|err| IngestError::from_backend("get_status", err))
    }

    /// Wait for the terminal status of an enqueued ingestion.
    ///
    /// Returns [`PollOutcome::NotReported`] right away when the ingestion's
    /// report settings never write to the status table.
    pub async fn wait(
        &self,
        result: &IngestionResult,
        ct: &CancellationToken,
    ) -> Result<PollOutcome> {
        if !result.is_status_reported() {
            debug!(
                operation_id = %result.operation_id,
                report_level = ?result.report_level,
                report_method = ?result.report_method,
                "ingestion status is not reported, not waiting"
            );
            return Ok(PollOutcome::NotReported);
        }
        self.poll(result.operation_id, ct).await
    }

    /// Poll until the operation is terminal, `ct` is cancelled or the timeout passes.
    pub async fn poll(
        &self,
        operation_id: OperationId,
        ct: &CancellationToken,
    ) -> Result<PollOutcome> {
        let deadline = self.options.timeout.map(|timeout| Instant::now() + timeout);
        let mut interval = self.options.initial_interval;
        let mut errors = 0;
        let mut last = None;

        loop {
            let fetched = tokio::select! {
                biased;
                _ = ct.cancelled() => return Ok(PollOutcome::Cancelled { last }),
                _ = expiry(deadline) => return Ok(timed_out(operation_id, last)),
                fetched = self.table.get(operation_id) => fetched,
            };

            match fetched {
                Ok(status) if status.is_terminal() => {
                    debug!(%operation_id, state = ?status.state, "ingestion finished");
                    return Ok(PollOutcome::Completed(status));
                }
                Ok(status) => {
                    errors = 0;
                    last = Some(status);
                }
                Err(err) => {
                    errors += 1;
                    if !self.options.tolerates(&err, errors) {
                        return Err(IngestError::from_backend("get_status", err));
                    }
                    warn!(%operation_id, errors, error = %err, "status poll failed");
                }
            }

            tokio::select! {
                biased;
                _ = ct.cancelled() => return Ok(PollOutcome::Cancelled { last }),
                _ = expiry(deadline) => return Ok(timed_out(operation_id, last)),
                _ = tokio::time::sleep(interval) => {}
            }
            interval = self.options.next_interval(interval);
        }
    }

    /// Stream every observed status of the operation.
    ///
    /// Uses push notifications when the table offers them and polls otherwise.
    /// The stream ends after yielding a terminal status or an error. Dropping
    /// it only stops observing.
    pub async fn subscribe(
        &self,
        operation_id: OperationId,
    ) -> BoxStream<'static, Result<IngestionStatus>> {
        match self.table.watch(operation_id).await {
            Some(receiver) => watch_statuses(receiver),
            None => poll_statuses(PollState {
                table: self.table.clone(),
                options: self.options.clone(),
                operation_id,
                interval: self.options.initial_interval,
                errors: 0,
                last: None,
                first: true,
            }),
        }
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

fn timed_out(operation_id: OperationId, last: Option<IngestionStatus>) -> PollOutcome {
    debug!(%operation_id, last = ?last.as_ref().map(|status| status.state), "status poll timed out");
    PollOutcome::TimedOut { last }
}

fn watch_statuses(
    receiver: watch::Receiver<IngestionStatus>,
) -> BoxStream<'static, Result<IngestionStatus>> {
    stream::unfold(Some((receiver, true)), |state| async move {
        let (mut receiver, first) = state?;
        if !first && receiver.changed().await.is_err() {
            return None;
        }
        let status = receiver.borrow_and_update().clone();
        let next = (!status.is_terminal()).then_some((receiver, false));
        Some((Ok(status), next))
    })
    .boxed()
}

struct PollState {
    table: Arc<dyn StatusTable>,
    options: PollOptions,
    operation_id: OperationId,
    interval: Duration,
    errors: usize,
    last: Option<IngestionState>,
    first: bool,
}

fn poll_statuses(state: PollState) -> BoxStream<'static, Result<IngestionStatus>> {
    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            if !state.first {
                tokio::time::sleep(state.interval).await;
                state.interval = state.options.next_interval(state.interval);
            }
            state.first = false;

            match state.table.get(state.operation_id).await {
                Ok(status) => {
                    state.errors = 0;
                    if state.last == Some(status.state) {
                        continue;
                    }
                    state.last = Some(status.state);
                    let next = (!status.is_terminal()).then_some(state);
                    return Some((Ok(status), next));
                }
                Err(err) => {
                    state.errors += 1;
                    if !state.options.tolerates(&err, state.errors) {
                        return Some((Err(IngestError::from_backend("get_status", err)), None));
                    }
                    warn!(
                        operation_id = %state.operation_id,
                        errors = state.errors,
                        error = %err,
                        "status poll failed"
                    );
                }
            }
        }
    })
    .boxed()
}
