use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// A short lived bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Supplies bearer tokens for the ingestion service.
///
/// Implementations talk to an identity provider and may fail transiently.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Stable identity of the credential, used to key cached tokens.
    fn identity(&self) -> String;

    async fn acquire_token(&self) -> Result<AccessToken>;
}

/// Hands out the same token forever. Used with the in-memory backend.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    identity: String,
    token: String,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl StaticCredentialProvider {
    pub fn new(identity: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            token: token.into(),
        }
    }
}

impl Default for StaticCredentialProvider {
    fn default() -> Self {
        Self::new("static", "static-token")
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    async fn acquire_token(&self) -> Result<AccessToken> {
        Ok(AccessToken::new(
            self.token.clone(),
            DateTime::<Utc>::MAX_UTC,
        ))
    }
}
