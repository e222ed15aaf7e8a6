//! Ranking of storage accounts by recent success rate.
//!
//! Every account keeps a ring of time buckets. The rank of an account is the
//! success rate over those buckets, with newer buckets weighted higher.
//! Accounts are grouped into tiers by rank and shuffled within a tier, so load
//! spreads across healthy accounts while failing ones are tried last.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use quay_resources::StagedResource;
use rand::seq::SliceRandom;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RankingOptions {
    pub bucket_count: usize,
    pub bucket_duration: Duration,
    /// Lower bounds of the tiers in percent, highest first.
    pub tiers: Vec<u32>,
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self {
            bucket_count: 6,
            bucket_duration: Duration::from_secs(10),
            tiers: vec![90, 70, 30, 0],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    started_at: Instant,
    successes: u32,
    total: u32,
}

#[derive(Debug)]
struct AccountStats {
    // newest bucket last
    buckets: VecDeque<Bucket>,
}

#[derive(Debug)]
pub struct RankedAccountSet {
    options: RankingOptions,
    accounts: HashMap<String, AccountStats>,
}

impl AccountStats {
    fn new(now: Instant) -> Self {
        Self {
            buckets: VecDeque::from([Bucket::new(now)]),
        }
    }

    fn current(&mut self, now: Instant, options: &RankingOptions) -> &mut Bucket {
        let needs_new = self
            .buckets
            .back()
            .is_none_or(|b| now.duration_since(b.started_at) >= options.bucket_duration);

        if needs_new {
            self.buckets.push_back(Bucket::new(now));
            while self.buckets.len() > options.bucket_count {
                self.buckets.pop_front();
            }
        }

        // a bucket was pushed above if the deque was empty
        let last = self.buckets.len() - 1;
        &mut self.buckets[last]
    }

    fn rank(&self, now: Instant, options: &RankingOptions) -> f64 {
        let window = options.bucket_duration * options.bucket_count as u32;
        let mut weighted = 0.0;
        let mut total_weight = 0.0;

        for bucket in self.buckets.iter() {
            let age = now.duration_since(bucket.started_at);
            if bucket.total == 0 || age >= window {
                continue;
            }
            let age_buckets = (age.as_secs_f64() / options.bucket_duration.as_secs_f64()) as usize;
            let weight = options.bucket_count.saturating_sub(age_buckets) as f64;
            weighted += weight * f64::from(bucket.successes) / f64::from(bucket.total);
            total_weight += weight;
        }

        if total_weight == 0.0 {
            1.0
        } else {
            weighted / total_weight
        }
    }
}

impl Bucket {
    fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            successes: 0,
            total: 0,
        }
    }
}

impl RankedAccountSet {
    pub fn new(options: RankingOptions) -> Self {
        Self {
            options,
            accounts: HashMap::new(),
        }
    }

    /// Start tracking an account. Known accounts keep their history.
    pub fn register(&mut self, account: &str) {
        if !self.accounts.contains_key(account) {
            self.accounts
                .insert(account.to_string(), AccountStats::new(Instant::now()));
        }
    }

    pub fn record(&mut self, account: &str, success: bool) {
        let now = Instant::now();
        let stats = self
            .accounts
            .entry(account.to_string())
            .or_insert_with(|| AccountStats::new(now));
        let bucket = stats.current(now, &self.options);
        bucket.total += 1;
        if success {
            bucket.successes += 1;
        }
    }

    /// Success rate of the account between 0 and 1. Unknown accounts rank 1.
    pub fn rank(&self, account: &str) -> f64 {
        self.accounts
            .get(account)
            .map(|stats| stats.rank(Instant::now(), &self.options))
            .unwrap_or(1.0)
    }

    fn tier_of(&self, rank: f64) -> usize {
        let percent = (rank * 100.0).round() as u32;
        self.options
            .tiers
            .iter()
            .position(|lower| percent >= *lower)
            .unwrap_or(self.options.tiers.len())
    }

    /// Accounts ordered by tier, shuffled within each tier.
    pub fn ranked_accounts(&self, accounts: &[&str]) -> Vec<String> {
        let mut tiers: Vec<Vec<String>> = vec![Vec::new(); self.options.tiers.len() + 1];
        for account in accounts {
            let tier = self.tier_of(self.rank(account));
            if !tiers[tier].iter().any(|a| a == account) {
                tiers[tier].push(account.to_string());
            }
        }

        let mut rng = rand::thread_rng();
        tiers
            .into_iter()
            .flat_map(|mut tier| {
                tier.shuffle(&mut rng);
                tier
            })
            .collect()
    }

    /// Order resources so each round takes one resource per account, best accounts first.
    pub fn order(&self, resources: &[Arc<StagedResource>]) -> Vec<Arc<StagedResource>> {
        let accounts: Vec<&str> = resources.iter().map(|r| r.account()).collect();
        let ranked = self.ranked_accounts(&accounts);

        let mut per_account: Vec<VecDeque<Arc<StagedResource>>> = ranked
            .iter()
            .map(|account| {
                resources
                    .iter()
                    .filter(|r| r.account() == account)
                    .cloned()
                    .collect()
            })
            .collect();

        let mut ordered = Vec::with_capacity(resources.len());
        while ordered.len() < resources.len() {
            for queue in per_account.iter_mut() {
                if let Some(resource) = queue.pop_front() {
                    ordered.push(resource);
                }
            }
        }
        ordered
    }
}

impl Default for RankedAccountSet {
    fn default() -> Self {
        Self::new(RankingOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use quay_resources::ResourceKind;

    use super::*;

    fn container(account: &str, name: &str) -> Arc<StagedResource> {
        let uri = format!("https://{account}.blob.example.net/{name}");
        Arc::new(StagedResource::parse(&uri, ResourceKind::Container).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_account_ranks_best() {
        let set = RankedAccountSet::default();
        assert_eq!(set.rank("nobody"), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_account_is_ordered_last() {
        let mut set = RankedAccountSet::default();
        for _ in 0..10 {
            set.record("bad", false);
            set.record("good", true);
        }

        let ranked = set.ranked_accounts(&["bad", "good"]);
        assert_eq!(ranked, vec!["good".to_string(), "bad".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_buckets_weigh_more() {
        let mut set = RankedAccountSet::default();
        set.record("acct", false);
        tokio::time::advance(Duration::from_secs(15)).await;
        set.record("acct", true);

        let rank = set.rank("acct");
        assert!(rank > 0.5, "rank {rank}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_buckets_are_forgotten() {
        let mut set = RankedAccountSet::default();
        set.record("acct", false);
        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(set.rank("acct"), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_interleaves_accounts() {
        let mut set = RankedAccountSet::default();
        set.record("a2", false);

        let resources = vec![
            container("a1", "c1"),
            container("a1", "c2"),
            container("a2", "c3"),
        ];
        let ordered = set.order(&resources);
        let names: Vec<_> = ordered.iter().map(|r| r.object_name().to_string()).collect();

        assert_eq!(names, vec!["c1", "c3", "c2"]);
    }
}
