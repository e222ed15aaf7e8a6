//! In-memory object store factory.
//!
//! Every container maps to its own `InMemory` store, kept for the lifetime of
//! the factory so staged blobs can be inspected after an ingestion.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use object_store::{Error as ObjectStoreError, ObjectStore, memory::InMemory};
use quay_resources::StagedResource;

use crate::{ObjectStoreFactory, container_prefix};

#[derive(Debug, Default)]
pub struct InMemoryObjectStoreFactory {
    stores: DashMap<String, Arc<InMemory>>,
    unavailable_accounts: DashSet<String>,
}

impl InMemoryObjectStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every container of `account` fail to open.
    pub fn set_account_unavailable(&self, account: impl Into<String>) {
        self.unavailable_accounts.insert(account.into());
    }

    pub fn set_account_available(&self, account: &str) {
        self.unavailable_accounts.remove(account);
    }

    /// The store backing `container`, if anything was ever staged there.
    pub fn store(&self, container: &StagedResource) -> Option<Arc<InMemory>> {
        self.stores
            .get(&container_prefix(container))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait::async_trait]
impl ObjectStoreFactory for InMemoryObjectStoreFactory {
    async fn create_object_store(
        &self,
        container: &StagedResource,
    ) -> Result<Arc<dyn ObjectStore>, ObjectStoreError> {
        if self.unavailable_accounts.contains(container.account()) {
            return Err(ObjectStoreError::Generic {
                store: "InMemory",
                source: format!("account {} is unavailable", container.account()).into(),
            });
        }

        let store = self
            .stores
            .entry(container_prefix(container))
            .or_insert_with(|| Arc::new(InMemory::new()))
            .clone();

        Ok(store)
    }
}
