//! The remote surfaces of the ingestion service.

use async_trait::async_trait;
use bytes::Bytes;
use quay_resources::{
    CompressionType, DataFormat, IngestionMapping, IngestionResources, IngestionStatus,
    OperationId, StagedResource,
};
use tokio::sync::watch;

use crate::{credential::AccessToken, error::Result};

/// Discovers the queues and containers used to stage ingestions.
#[async_trait]
pub trait ResourceDiscovery: Send + Sync {
    async fn get_ingestion_resources(&self, token: &AccessToken) -> Result<IngestionResources>;

    /// Opaque identity token embedded in every queued message.
    async fn get_authorization_context(&self, token: &AccessToken) -> Result<String>;
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn put_message(&self, queue: &StagedResource, content: String) -> Result<()>;
}

/// A payload sent inline to the streaming endpoint.
#[derive(Debug, Clone)]
pub struct StreamingRequest {
    pub operation_id: OperationId,
    pub database: String,
    pub table: String,
    pub format: DataFormat,
    pub mapping: Option<IngestionMapping>,
    pub compression: CompressionType,
    pub payload: Bytes,
}

#[async_trait]
pub trait StreamingEndpoint: Send + Sync {
    async fn ingest(&self, request: StreamingRequest, token: &AccessToken) -> Result<()>;
}

/// Status records of queued ingestions, keyed by operation id.
#[async_trait]
pub trait StatusTable: Send + Sync {
    async fn create(&self, status: IngestionStatus) -> Result<()>;

    async fn get(&self, operation_id: OperationId) -> Result<IngestionStatus>;

    /// Push notifications for an operation, when the table supports them.
    async fn watch(&self, _operation_id: OperationId) -> Option<watch::Receiver<IngestionStatus>> {
        None
    }
}
