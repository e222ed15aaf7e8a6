//! Control plane of the ingestion client.
//!
//! This crate defines the remote surfaces of the ingestion service as traits,
//! an in-memory implementation of all of them, and the machinery the clients
//! use on top: retry policies, token caching, account ranking and the
//! resource manager.

pub mod backend;
pub mod credential;
pub mod error;
mod error_kind;
pub mod memory;
mod metrics;
pub mod ranking;
pub mod resource_manager;
pub mod retry;
pub mod token;

pub use self::{
    backend::{MessageQueue, ResourceDiscovery, StatusTable, StreamingEndpoint, StreamingRequest},
    credential::{AccessToken, CredentialProvider, StaticCredentialProvider},
    error::BackendError,
    error_kind::ErrorKind,
    memory::{EnqueuedMessage, InMemoryBackend},
    ranking::{RankedAccountSet, RankingOptions},
    resource_manager::{ResourceManager, ResourceManagerError, ResourceManagerOptions},
    retry::RetryPolicy,
    token::{TokenCache, TokenCacheOptions, TokenError},
};
