//! Explicit retry schedules.
//!
//! A policy is a list of delays plus a maximum number of attempts. When there
//! are more retries than delays, the last delay is reused. A random jitter of
//! up to `max_jitter` is added to every delay.

use std::{future::Future, time::Duration};

use rand::Rng;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    delays: Vec<Duration>,
    max_jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delays: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delays,
            max_jitter: Duration::ZERO,
        }
    }

    /// Schedule used for queue, blob and status table calls: 5s, 30s, 60s.
    pub fn transport() -> Self {
        Self::new(
            4,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(30),
                Duration::from_secs(60),
            ],
        )
        .with_jitter(Duration::from_secs(1))
    }

    /// Doubling delays starting at `base`, capped at `max_delay`.
    pub fn exponential(base: Duration, max_delay: Duration, max_attempts: usize) -> Self {
        let delays = (0..max_attempts.saturating_sub(1))
            .map(|retry| {
                let factor = 1u32.checked_shl(retry as u32).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max_delay)
            })
            .collect();
        Self::new(max_attempts, delays)
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::new(1, Vec::new())
    }

    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Delay before retry number `retry`, starting at zero.
    pub fn delay_for(&self, retry: usize) -> Duration {
        let base = self
            .delays
            .get(retry)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or_default();

        if self.max_jitter.is_zero() {
            return base;
        }

        let jitter_ms = rand::thread_rng().gen_range(0..=self.max_jitter.as_millis() as u64);
        base + Duration::from_millis(jitter_ms)
    }

    /// Run `op` until it succeeds, fails with an error `is_retryable` rejects,
    /// or the attempts are exhausted. The last error is returned.
    pub async fn run<T, E, F, Fut>(
        &self,
        name: &'static str,
        mut op: F,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !is_retryable(&err) {
                        return Err(err);
                    }

                    let delay = self.delay_for(attempt - 1);
                    warn!(
                        operation = name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after error"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::transport()
    }
}
