//! Memoization of bearer tokens per credential identity.
//!
//! Concurrent callers that find no valid token share a single acquisition.
//! Entries expire `refresh_skew` before the token itself does.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use moka::Expiry;
use snafu::Snafu;
use tracing::debug;

use crate::{
    credential::{AccessToken, CredentialProvider},
    error::BackendError,
    retry::RetryPolicy,
};

#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum TokenError {
    #[snafu(display("failed to acquire token for {identity}"))]
    Acquire {
        identity: String,
        source: BackendError,
    },
}

#[derive(Debug, Clone)]
pub struct TokenCacheOptions {
    pub refresh_skew: Duration,
    pub max_lifetime: Duration,
    pub retry: RetryPolicy,
}

impl Default for TokenCacheOptions {
    fn default() -> Self {
        Self {
            refresh_skew: Duration::from_secs(5 * 60),
            max_lifetime: Duration::from_secs(60 * 60),
            retry: RetryPolicy::exponential(Duration::from_millis(500), Duration::from_secs(5), 3),
        }
    }
}

impl TokenCacheOptions {
    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = skew;
        self
    }

    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

struct TokenExpiry {
    refresh_skew: Duration,
    max_lifetime: Duration,
}

impl Expiry<String, Arc<AccessToken>> for TokenExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<AccessToken>,
        _created_at: Instant,
    ) -> Option<Duration> {
        let remaining = (value.expires_at - Utc::now())
            .to_std()
            .unwrap_or_default()
            .saturating_sub(self.refresh_skew);
        Some(remaining.min(self.max_lifetime))
    }
}

#[derive(Clone)]
pub struct TokenCache {
    provider: Arc<dyn CredentialProvider>,
    retry: RetryPolicy,
    inner: moka::future::Cache<String, Arc<AccessToken>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn CredentialProvider>) -> Self {
        Self::with_options(provider, TokenCacheOptions::default())
    }

    pub fn with_options(provider: Arc<dyn CredentialProvider>, options: TokenCacheOptions) -> Self {
        let inner = moka::future::Cache::builder()
            .max_capacity(16)
            .expire_after(TokenExpiry {
                refresh_skew: options.refresh_skew,
                max_lifetime: options.max_lifetime,
            })
            .build();

        Self {
            provider,
            retry: options.retry,
            inner,
        }
    }

    /// Return a valid token, acquiring one if none is cached.
    pub async fn get(&self) -> Result<Arc<AccessToken>, TokenError> {
        let identity = self.provider.identity();
        self.inner
            .try_get_with(identity.clone(), self.acquire(identity))
            .await
            .map_err(|err| Arc::try_unwrap(err).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// Drop the cached token, for example after the service rejected it.
    pub async fn invalidate(&self) {
        self.inner.invalidate(&self.provider.identity()).await;
    }

    async fn acquire(&self, identity: String) -> Result<Arc<AccessToken>, TokenError> {
        debug!(identity, "acquiring access token");
        let token = self
            .retry
            .run(
                "acquire_token",
                |_| self.provider.acquire_token(),
                BackendError::is_retryable,
            )
            .await
            .map_err(|source| TokenError::Acquire {
                identity: identity.clone(),
                source,
            })?;
        Ok(Arc::new(token))
    }
}
