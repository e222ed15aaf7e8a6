//! Discovery and caching of ingestion resources.
//!
//! The resource snapshot and the authorization context are cached for
//! `refresh_period`. Concurrent callers that find an empty or expired cache
//! share a single discovery call. Results reported by the clients feed the
//! account ranking; authorization and not-found failures drop the snapshot so
//! the next caller rediscovers.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::Utc;
use quay_resources::{IngestionResources, StagedResource};
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, info, warn};

use crate::{
    ErrorKind,
    backend::ResourceDiscovery,
    error::BackendError,
    metrics::ResourceManagerMetrics,
    ranking::{RankedAccountSet, RankingOptions},
    retry::RetryPolicy,
    token::{TokenCache, TokenError},
};

#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum ResourceManagerError {
    #[snafu(display("failed to discover ingestion resources"))]
    Discovery { source: BackendError },
    #[snafu(display(
        "discovered resources are incomplete: {queues} queues, {containers} containers"
    ))]
    Incomplete { queues: usize, containers: usize },
    #[snafu(display("every discovered {resource} lease has expired"))]
    Expired { resource: &'static str },
    #[snafu(display("failed to authenticate resource discovery"))]
    Authentication { source: TokenError },
}

pub type Result<T, E = ResourceManagerError> = ::std::result::Result<T, E>;

impl ResourceManagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Discovery { source } => source.kind(),
            Self::Incomplete { .. } => ErrorKind::Configuration,
            Self::Expired { .. } => ErrorKind::Temporary,
            Self::Authentication { .. } => ErrorKind::Authentication,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceManagerOptions {
    pub refresh_period: Duration,
    pub discovery_retry: RetryPolicy,
    pub ranking: RankingOptions,
}

impl Default for ResourceManagerOptions {
    fn default() -> Self {
        Self {
            refresh_period: Duration::from_secs(60 * 60),
            discovery_retry: RetryPolicy::exponential(
                Duration::from_secs(1),
                Duration::from_secs(30),
                4,
            )
            .with_jitter(Duration::from_secs(1)),
            ranking: RankingOptions::default(),
        }
    }
}

impl ResourceManagerOptions {
    pub fn with_refresh_period(mut self, refresh_period: Duration) -> Self {
        self.refresh_period = refresh_period;
        self
    }

    pub fn with_discovery_retry(mut self, retry: RetryPolicy) -> Self {
        self.discovery_retry = retry;
        self
    }

    pub fn with_ranking(mut self, ranking: RankingOptions) -> Self {
        self.ranking = ranking;
        self
    }
}

pub struct ResourceManager {
    discovery: Arc<dyn ResourceDiscovery>,
    tokens: TokenCache,
    retry: RetryPolicy,
    resources: moka::future::Cache<(), Arc<IngestionResources>>,
    auth_context: moka::future::Cache<(), Arc<String>>,
    ranking: Mutex<RankedAccountSet>,
    metrics: ResourceManagerMetrics,
}

impl ResourceManager {
    pub fn new(discovery: Arc<dyn ResourceDiscovery>, tokens: TokenCache) -> Self {
        Self::with_options(discovery, tokens, ResourceManagerOptions::default())
    }

    pub fn with_options(
        discovery: Arc<dyn ResourceDiscovery>,
        tokens: TokenCache,
        options: ResourceManagerOptions,
    ) -> Self {
        let resources = moka::future::Cache::builder()
            .max_capacity(1)
            .time_to_live(options.refresh_period)
            .build();
        let auth_context = moka::future::Cache::builder()
            .max_capacity(1)
            .time_to_live(options.refresh_period)
            .build();

        Self {
            discovery,
            tokens,
            retry: options.discovery_retry,
            resources,
            auth_context,
            ranking: Mutex::new(RankedAccountSet::new(options.ranking)),
            metrics: ResourceManagerMetrics::default(),
        }
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// The current resource snapshot, discovering it if needed.
    pub async fn get_ingestion_resources(&self) -> Result<Arc<IngestionResources>> {
        self.resources
            .try_get_with((), self.discover_resources())
            .await
            .map_err(unwrap_shared)
    }

    /// Queues with a live lease, ordered by account rank.
    pub async fn queues(&self) -> Result<Vec<Arc<StagedResource>>> {
        self.live_resources("queue", |resources| &resources.queues).await
    }

    /// Containers with a live lease, ordered by account rank.
    pub async fn containers(&self) -> Result<Vec<Arc<StagedResource>>> {
        self.live_resources("container", |resources| &resources.containers).await
    }

    pub async fn authorization_context(&self) -> Result<Arc<String>> {
        self.auth_context
            .try_get_with((), self.discover_auth_context())
            .await
            .map_err(unwrap_shared)
    }

    /// Record the outcome of using `resource`.
    pub async fn report_result(
        &self,
        resource: &StagedResource,
        result: std::result::Result<(), &BackendError>,
    ) {
        self.with_ranking(|ranking| ranking.record(resource.account(), result.is_ok()));

        if let Err(err) = result {
            if err.invalidates_resource() {
                warn!(resource = %resource, error = %err, "resource rejected request, invalidating");
                if err.kind() == ErrorKind::Authentication {
                    self.tokens.invalidate().await;
                }
                self.invalidate().await;
            }
        }
    }

    /// Drop the cached snapshot and authorization context.
    pub async fn invalidate(&self) {
        self.metrics.invalidations.add(1, &[]);
        self.resources.invalidate(&()).await;
        self.auth_context.invalidate(&()).await;
    }

    /// Resources picked by `select` whose lease has not expired.
    ///
    /// When every cached lease has expired the snapshot is rediscovered once.
    async fn live_resources(
        &self,
        resource: &'static str,
        select: impl Fn(&IngestionResources) -> &Vec<Arc<StagedResource>>,
    ) -> Result<Vec<Arc<StagedResource>>> {
        let resources = self.get_ingestion_resources().await?;
        let mut live = unexpired(select(&resources));

        if live.is_empty() {
            debug!(resource, "every cached lease expired, rediscovering");
            self.invalidate().await;
            let resources = self.get_ingestion_resources().await?;
            live = unexpired(select(&resources));
        }

        ensure!(!live.is_empty(), ExpiredSnafu { resource });
        Ok(self.with_ranking(|ranking| ranking.order(&live)))
    }

    fn with_ranking<T>(&self, f: impl FnOnce(&mut RankedAccountSet) -> T) -> T {
        let mut ranking = self.ranking.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut ranking)
    }

    async fn discover_resources(&self) -> Result<Arc<IngestionResources>> {
        let token = self.tokens.get().await.context(AuthenticationSnafu)?;

        debug!("discovering ingestion resources");
        let resources = self
            .retry
            .run(
                "get_ingestion_resources",
                |_| self.discovery.get_ingestion_resources(&token),
                BackendError::is_retryable,
            )
            .await
            .inspect_err(|_| self.metrics.refresh_failures.add(1, &[]))
            .context(DiscoverySnafu)?;

        ensure!(
            resources.is_applicable(),
            IncompleteSnafu {
                queues: resources.queues.len(),
                containers: resources.containers.len(),
            }
        );

        self.with_ranking(|ranking| {
            for resource in resources.queues.iter().chain(resources.containers.iter()) {
                ranking.register(resource.account());
            }
        });

        info!(
            queues = resources.queues.len(),
            containers = resources.containers.len(),
            "discovered ingestion resources"
        );
        self.metrics.refreshes.add(1, &[]);

        Ok(Arc::new(resources))
    }

    async fn discover_auth_context(&self) -> Result<Arc<String>> {
        let token = self.tokens.get().await.context(AuthenticationSnafu)?;

        let context = self
            .retry
            .run(
                "get_authorization_context",
                |_| self.discovery.get_authorization_context(&token),
                BackendError::is_retryable,
            )
            .await
            .context(DiscoverySnafu)?;

        Ok(Arc::new(context))
    }
}

fn unexpired(resources: &[Arc<StagedResource>]) -> Vec<Arc<StagedResource>> {
    let now = Utc::now();
    resources
        .iter()
        .filter(|resource| !resource.is_expired(now))
        .cloned()
        .collect()
}

fn unwrap_shared(err: Arc<ResourceManagerError>) -> ResourceManagerError {
    Arc::try_unwrap(err).unwrap_or_else(|e| (*e).clone())
}
