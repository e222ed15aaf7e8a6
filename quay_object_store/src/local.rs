//! Local file system object store factory implementation.
//!
//! Each staging container gets its own subdirectory within the configured
//! root path, named `<account>-<container>`.
//!
//! `TemporaryFileSystemFactory` creates the root directory in a temporary
//! location that is removed when the factory is dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use object_store::{Error as ObjectStoreError, ObjectStore, local::LocalFileSystem};
use quay_resources::StagedResource;
use tempfile::TempDir;

use crate::{ObjectStoreFactory, container_prefix};

/// Factory for creating local file system object stores.
pub struct LocalFileSystemFactory {
    root_path: PathBuf,
}

impl LocalFileSystemFactory {
    pub fn new(root_path: impl AsRef<Path>) -> Result<Self, ObjectStoreError> {
        let canonical_path =
            std::fs::canonicalize(root_path.as_ref()).map_err(|e| ObjectStoreError::Generic {
                store: "LocalFileSystem",
                source: Box::new(e),
            })?;

        Ok(Self {
            root_path: canonical_path,
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn container_path(&self, container: &StagedResource) -> PathBuf {
        self.root_path.join(container_prefix(container))
    }
}

#[async_trait::async_trait]
impl ObjectStoreFactory for LocalFileSystemFactory {
    async fn create_object_store(
        &self,
        container: &StagedResource,
    ) -> Result<Arc<dyn ObjectStore>, ObjectStoreError> {
        let store_path = self.container_path(container);

        std::fs::create_dir_all(&store_path).map_err(|e| ObjectStoreError::Generic {
            store: "LocalFileSystem",
            source: Box::new(e),
        })?;

        let local_fs = LocalFileSystem::new_with_prefix(store_path)?;

        Ok(Arc::new(local_fs))
    }
}

/// Factory for creating object stores in a temporary directory.
pub struct TemporaryFileSystemFactory {
    _temp_dir: TempDir,
    local_factory: LocalFileSystemFactory,
}

impl TemporaryFileSystemFactory {
    pub fn new() -> Result<Self, ObjectStoreError> {
        let temp_dir = TempDir::new().map_err(|e| ObjectStoreError::Generic {
            store: "TemporaryFileSystem",
            source: Box::new(e),
        })?;

        let local_factory = LocalFileSystemFactory::new(temp_dir.path())?;

        Ok(Self {
            _temp_dir: temp_dir,
            local_factory,
        })
    }

    pub fn root_path(&self) -> &Path {
        self.local_factory.root_path()
    }

    pub fn container_path(&self, container: &StagedResource) -> PathBuf {
        self.local_factory.container_path(container)
    }
}

#[async_trait::async_trait]
impl ObjectStoreFactory for TemporaryFileSystemFactory {
    async fn create_object_store(
        &self,
        container: &StagedResource,
    ) -> Result<Arc<dyn ObjectStore>, ObjectStoreError> {
        self.local_factory.create_object_store(container).await
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use object_store::{PutPayload, path::Path as ObjectPath};
    use quay_resources::ResourceKind;

    use super::*;

    fn container() -> StagedResource {
        StagedResource::parse(
            "https://acct1.blob.example.net/staging?sig=abc",
            ResourceKind::Container,
        )
        .unwrap()
    }

    #[test]
    fn test_factory_creation() {
        let temp_dir = TempDir::new().unwrap();
        let factory = LocalFileSystemFactory::new(temp_dir.path()).unwrap();

        assert_eq!(factory.root_path(), temp_dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_factory_rejects_missing_root() {
        assert!(LocalFileSystemFactory::new("/does/not/exist").is_err());
    }

    #[tokio::test]
    async fn test_blobs_land_in_container_directory() {
        let factory = TemporaryFileSystemFactory::new().unwrap();
        let container = container();
        let store = factory.create_object_store(&container).await.unwrap();

        store
            .put(
                &ObjectPath::from("db__t__id__data.csv.gz"),
                PutPayload::from(Bytes::from_static(b"payload")),
            )
            .await
            .unwrap();

        let on_disk = factory
            .container_path(&container)
            .join("db__t__id__data.csv.gz");
        assert_eq!(std::fs::read(on_disk).unwrap(), b"payload");
    }

    #[test]
    fn test_temporary_directory_is_removed() {
        let factory = TemporaryFileSystemFactory::new().unwrap();
        let root = factory.root_path().to_path_buf();
        assert!(root.exists());

        drop(factory);
        assert!(!root.exists());
    }
}
