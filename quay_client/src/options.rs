use std::time::Duration;

use bytesize::ByteSize;
use quay_control_plane::RetryPolicy;

use crate::status::PollOptions;

#[derive(Debug, Clone)]
pub struct IngestClientOptions {
    /// Payloads at or above this size always go through the queued path.
    pub streaming_threshold: ByteSize,
    pub streaming_retry: RetryPolicy,
    /// Retry schedule for uploads, enqueues and status table calls.
    pub transport_retry: RetryPolicy,
    pub poll: PollOptions,
}

impl Default for IngestClientOptions {
    fn default() -> Self {
        Self {
            streaming_threshold: ByteSize::mib(4),
            streaming_retry: RetryPolicy::exponential(
                Duration::from_secs(1),
                Duration::from_secs(30),
                3,
            )
            .with_jitter(Duration::from_secs(1)),
            transport_retry: RetryPolicy::transport(),
            poll: PollOptions::default(),
        }
    }
}

impl IngestClientOptions {
    pub fn with_streaming_threshold(mut self, threshold: ByteSize) -> Self {
        self.streaming_threshold = threshold;
        self
    }

    pub fn with_streaming_retry(mut self, retry: RetryPolicy) -> Self {
        self.streaming_retry = retry;
        self
    }

    pub fn with_transport_retry(mut self, retry: RetryPolicy) -> Self {
        self.transport_retry = retry;
        self
    }

    pub fn with_poll(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }
}
