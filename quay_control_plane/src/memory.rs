//! In-memory implementation of the ingestion service surfaces.
//!
//! This implementation keeps queues, streamed payloads and status records in
//! memory and is suitable for testing and development. Failures and latency
//! can be injected per surface.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use quay_resources::{
    IngestionMessage, IngestionResources, IngestionState, IngestionStatus, OperationId,
    ResourceKind, StagedResource,
};
use tokio::sync::{RwLock, watch};

use crate::{
    backend::{MessageQueue, ResourceDiscovery, StatusTable, StreamingEndpoint, StreamingRequest},
    credential::AccessToken,
    error::{BackendError, Result},
};

/// A message as it was put on a queue.
#[derive(Debug, Clone)]
pub struct EnqueuedMessage {
    pub queue: Arc<StagedResource>,
    pub content: String,
}

#[derive(Debug, Default)]
struct FailurePlan {
    discovery: VecDeque<BackendError>,
    queue: VecDeque<BackendError>,
    streaming: VecDeque<BackendError>,
    status: VecDeque<BackendError>,
    streaming_always: Option<BackendError>,
}

#[derive(Debug, Default)]
struct BackendStore {
    messages: Vec<EnqueuedMessage>,
    streamed: Vec<StreamingRequest>,
    statuses: HashMap<OperationId, watch::Sender<IngestionStatus>>,
}

/// In-memory ingestion service.
#[derive(Debug)]
pub struct InMemoryBackend {
    resources: IngestionResources,
    authorization_context: String,
    discovery_latency: Duration,
    status_push: bool,
    discovery_calls: AtomicUsize,
    streaming_calls: AtomicUsize,
    failures: Mutex<FailurePlan>,
    store: RwLock<BackendStore>,
}

impl InMemoryBackend {
    /// A backend with two accounts, each with one queue and one container.
    pub fn new() -> Self {
        let resources = IngestionResources {
            queues: default_resources(ResourceKind::Queue, "queue", "ingest"),
            containers: default_resources(ResourceKind::Container, "blob", "staging"),
        };

        Self {
            resources,
            authorization_context: "in-memory-authorization-context".to_string(),
            discovery_latency: Duration::ZERO,
            status_push: false,
            discovery_calls: AtomicUsize::new(0),
            streaming_calls: AtomicUsize::new(0),
            failures: Mutex::new(FailurePlan::default()),
            store: RwLock::new(BackendStore::default()),
        }
    }

    pub fn with_resources(mut self, resources: IngestionResources) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_discovery_latency(mut self, latency: Duration) -> Self {
        self.discovery_latency = latency;
        self
    }

    /// Enable push notifications on the status table.
    pub fn with_status_push(mut self, enabled: bool) -> Self {
        self.status_push = enabled;
        self
    }

    pub fn fail_discovery(&self, err: BackendError) {
        self.with_failures(|plan| plan.discovery.push_back(err));
    }

    pub fn fail_queue(&self, err: BackendError) {
        self.with_failures(|plan| plan.queue.push_back(err));
    }

    pub fn fail_streaming(&self, err: BackendError) {
        self.with_failures(|plan| plan.streaming.push_back(err));
    }

    pub fn fail_status(&self, err: BackendError) {
        self.with_failures(|plan| plan.status.push_back(err));
    }

    /// Fail every streaming call with `err`.
    pub fn reject_streaming_always(&self, err: BackendError) {
        self.with_failures(|plan| plan.streaming_always = Some(err));
    }

    pub fn discovery_calls(&self) -> usize {
        self.discovery_calls.load(Ordering::SeqCst)
    }

    pub fn streaming_calls(&self) -> usize {
        self.streaming_calls.load(Ordering::SeqCst)
    }

    pub async fn enqueued(&self) -> Vec<EnqueuedMessage> {
        self.store.read().await.messages.clone()
    }

    /// Enqueued messages, decoded.
    pub async fn messages(&self) -> Vec<IngestionMessage> {
        self.store
            .read()
            .await
            .messages
            .iter()
            .filter_map(|m| IngestionMessage::from_json(&m.content).ok())
            .collect()
    }

    pub async fn streamed(&self) -> Vec<StreamingRequest> {
        self.store.read().await.streamed.clone()
    }

    /// Move an operation to `state`, as the service does once it processed the data.
    pub async fn complete(&self, operation_id: OperationId, state: IngestionState) -> bool {
        let store = self.store.read().await;
        match store.statuses.get(&operation_id) {
            Some(sender) => sender.send_if_modified(|status| status.transition(state)),
            None => false,
        }
    }

    fn with_failures<T>(&self, f: impl FnOnce(&mut FailurePlan) -> T) -> T {
        let mut plan = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut plan)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn default_resources(kind: ResourceKind, service: &str, name: &str) -> Vec<Arc<StagedResource>> {
    ["account1", "account2"]
        .iter()
        .filter_map(|account| {
            let uri = format!("https://{account}.{service}.quay.local/{name}?sig=in-memory");
            StagedResource::parse(&uri, kind).ok()
        })
        .map(Arc::new)
        .collect()
}

#[async_trait]
impl ResourceDiscovery for InMemoryBackend {
    async fn get_ingestion_resources(&self, _token: &AccessToken) -> Result<IngestionResources> {
        self.discovery_calls.fetch_add(1, Ordering::SeqCst);
        if !self.discovery_latency.is_zero() {
            tokio::time::sleep(self.discovery_latency).await;
        }
        if let Some(err) = self.with_failures(|plan| plan.discovery.pop_front()) {
            return Err(err);
        }
        Ok(self.resources.clone())
    }

    async fn get_authorization_context(&self, _token: &AccessToken) -> Result<String> {
        Ok(self.authorization_context.clone())
    }
}

#[async_trait]
impl MessageQueue for InMemoryBackend {
    async fn put_message(&self, queue: &StagedResource, content: String) -> Result<()> {
        if let Some(err) = self.with_failures(|plan| plan.queue.pop_front()) {
            return Err(err);
        }
        self.store.write().await.messages.push(EnqueuedMessage {
            queue: Arc::new(queue.clone()),
            content,
        });
        Ok(())
    }
}

#[async_trait]
impl StreamingEndpoint for InMemoryBackend {
    async fn ingest(&self, request: StreamingRequest, _token: &AccessToken) -> Result<()> {
        self.streaming_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.with_failures(|plan| {
            plan.streaming_always
                .clone()
                .or_else(|| plan.streaming.pop_front())
        });
        if let Some(err) = failure {
            return Err(err);
        }
        self.store.write().await.streamed.push(request);
        Ok(())
    }
}

#[async_trait]
impl StatusTable for InMemoryBackend {
    async fn create(&self, status: IngestionStatus) -> Result<()> {
        if let Some(err) = self.with_failures(|plan| plan.status.pop_front()) {
            return Err(err);
        }
        let mut store = self.store.write().await;
        let operation_id = status.operation_id;
        let (sender, _) = watch::channel(status);
        store.statuses.insert(operation_id, sender);
        Ok(())
    }

    async fn get(&self, operation_id: OperationId) -> Result<IngestionStatus> {
        if let Some(err) = self.with_failures(|plan| plan.status.pop_front()) {
            return Err(err);
        }
        let store = self.store.read().await;
        store
            .statuses
            .get(&operation_id)
            .map(|sender| sender.borrow().clone())
            .ok_or_else(|| BackendError::NotFound {
                resource: "ingestion status",
                message: operation_id.to_string(),
            })
    }

    async fn watch(&self, operation_id: OperationId) -> Option<watch::Receiver<IngestionStatus>> {
        if !self.status_push {
            return None;
        }
        let store = self.store.read().await;
        store
            .statuses
            .get(&operation_id)
            .map(|sender| sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn token() -> AccessToken {
        AccessToken::new("t", Utc::now())
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let backend = InMemoryBackend::new();
        backend.fail_discovery(BackendError::Timeout {
            operation: "discovery",
        });

        assert!(backend.get_ingestion_resources(&token()).await.is_err());
        assert!(backend.get_ingestion_resources(&token()).await.is_ok());
        assert_eq!(backend.discovery_calls(), 2);
    }

    #[tokio::test]
    async fn test_status_lifecycle() {
        let backend = InMemoryBackend::new().with_status_push(true);
        let id = OperationId::new();
        backend
            .create(IngestionStatus::pending(id, "db", "t", "blob"))
            .await
            .unwrap();

        let mut rx = backend.watch(id).await.unwrap();
        assert!(backend.complete(id, IngestionState::Succeeded).await);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().state, IngestionState::Succeeded);

        assert!(!backend.complete(id, IngestionState::Failed).await);
        assert_eq!(backend.get(id).await.unwrap().state, IngestionState::Succeeded);
    }

    #[tokio::test]
    async fn test_unknown_status_is_not_found() {
        let backend = InMemoryBackend::new();
        let err = backend.get(OperationId::new()).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound { .. }));
    }
}
