//! Ingestion clients.
//!
//! [`QueuedIngestClient`] stages every payload and enqueues a message for the
//! service to pick up. [`StreamingIngestClient`] sends small payloads inline.
//! [`ManagedStreamingIngestClient`] streams when it can and falls back to the
//! queued path when streaming keeps failing. Queued ingestions complete
//! asynchronously; [`StatusTracker`] observes them.

mod backend;
mod client;
mod error;
mod managed;
mod metrics;
mod options;
mod queued;
mod result;
mod status;
mod streaming;
mod uploader;

pub use self::{
    backend::IngestBackend,
    client::{IngestClient, IngestState},
    error::{IngestError, Result},
    managed::ManagedStreamingIngestClient,
    options::IngestClientOptions,
    queued::QueuedIngestClient,
    result::{IngestOutcome, IngestionKind, IngestionResult},
    status::{PollOptions, PollOutcome, StatusTracker},
    streaming::StreamingIngestClient,
};
