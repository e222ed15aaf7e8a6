use std::{sync::Arc, time::Duration};

use quay_control_plane::{
    InMemoryBackend, ResourceManager, ResourceManagerOptions, RetryPolicy,
    StaticCredentialProvider, TokenCache,
};

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(4, vec![Duration::from_millis(5)])
}

pub fn create_resource_manager(
    backend: InMemoryBackend,
    options: ResourceManagerOptions,
) -> (Arc<InMemoryBackend>, Arc<ResourceManager>) {
    let backend = Arc::new(backend);
    let tokens = TokenCache::new(Arc::new(StaticCredentialProvider::default()));
    let manager = ResourceManager::with_options(
        backend.clone(),
        tokens,
        options.with_discovery_retry(fast_retry()),
    );
    (backend, Arc::new(manager))
}
