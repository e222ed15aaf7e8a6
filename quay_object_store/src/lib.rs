//! Object store factory for staging containers.
//!
//! The ingestion client stages payloads into containers handed out by the
//! resource manager. The `ObjectStoreFactory` trait turns such a container
//! into an `ObjectStore` client, so the staging code does not depend on the
//! concrete storage service.

pub mod local;
pub mod memory;

use std::sync::Arc;

use object_store::ObjectStore;
use quay_resources::StagedResource;

pub use local::{LocalFileSystemFactory, TemporaryFileSystemFactory};
pub use memory::InMemoryObjectStoreFactory;

/// Factory trait for creating ObjectStore instances for staging containers.
#[async_trait::async_trait]
pub trait ObjectStoreFactory: Send + Sync {
    /// Create an ObjectStore rooted at the given container.
    async fn create_object_store(
        &self,
        container: &StagedResource,
    ) -> Result<Arc<dyn ObjectStore>, object_store::Error>;
}

/// Directory or key prefix used for a container: `<account>-<container>`.
pub fn container_prefix(container: &StagedResource) -> String {
    format!("{}-{}", container.account(), container.object_name())
}
