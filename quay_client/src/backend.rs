use std::sync::Arc;

use quay_control_plane::{
    CredentialProvider, InMemoryBackend, MessageQueue, ResourceManager, ResourceManagerOptions,
    StaticCredentialProvider, StatusTable, StreamingEndpoint, TokenCache,
};
use quay_object_store::{InMemoryObjectStoreFactory, ObjectStoreFactory};

/// The remote collaborators shared by all clients.
#[derive(Clone)]
pub struct IngestBackend {
    pub resources: Arc<ResourceManager>,
    pub queue: Arc<dyn MessageQueue>,
    pub streaming: Arc<dyn StreamingEndpoint>,
    pub status: Arc<dyn StatusTable>,
    pub object_stores: Arc<dyn ObjectStoreFactory>,
}

impl IngestBackend {
    pub fn new(
        resources: Arc<ResourceManager>,
        queue: Arc<dyn MessageQueue>,
        streaming: Arc<dyn StreamingEndpoint>,
        status: Arc<dyn StatusTable>,
        object_stores: Arc<dyn ObjectStoreFactory>,
    ) -> Self {
        Self {
            resources,
            queue,
            streaming,
            status,
            object_stores,
        }
    }

    /// Wire every surface to an in-process backend.
    pub fn in_memory(
        backend: Arc<InMemoryBackend>,
        object_stores: Arc<InMemoryObjectStoreFactory>,
        options: ResourceManagerOptions,
    ) -> Self {
        let credentials: Arc<dyn CredentialProvider> = Arc::new(StaticCredentialProvider::default());
        let resources = ResourceManager::with_options(
            backend.clone(),
            TokenCache::new(credentials),
            options,
        );

        Self {
            resources: Arc::new(resources),
            queue: backend.clone(),
            streaming: backend.clone(),
            status: backend,
            object_stores,
        }
    }
}
