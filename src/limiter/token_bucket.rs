//! Token bucket limiter for a single identity dimension.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::{BucketLimiter, Identity, Limiter, DEFAULT_REQUEST_COST};
use crate::bucket::{RefillRate, TokenBucket};
use crate::error::{AuthGuardError, Result};

/// Keeps one bucket per distinct value of a dimension, e.g. one per login.
///
/// All buckets share capacity, refill rate and request cost. The map lock
/// is only held to find, create or remove a bucket; the token arithmetic
/// runs under the bucket's own lock.
pub struct TokenBucketLimiter {
    /// Identity dimension this limiter reads, e.g. "ip"
    dimension: String,
    capacity: u64,
    refill_rate: RefillRate,
    request_cost: AtomicU64,
    buckets: DashMap<String, Arc<TokenBucket>>,
}

impl TokenBucketLimiter {
    pub fn new(dimension: impl Into<String>, capacity: u64, refill_rate: RefillRate) -> Self {
        Self {
            dimension: dimension.into(),
            capacity,
            refill_rate,
            request_cost: AtomicU64::new(DEFAULT_REQUEST_COST),
            buckets: DashMap::new(),
        }
    }

    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn request_cost(&self) -> u64 {
        self.request_cost.load(Ordering::SeqCst)
    }

    /// Try to spend one request's worth of tokens from the bucket of `identity`.
    pub fn try_acquire(&self, identity: &Identity) -> Result<bool> {
        let value = self.identity_value(identity)?;
        let bucket = self.bucket_for(value);

        let allowed = bucket.take(self.request_cost());
        trace!(
            dimension = %self.dimension,
            allowed,
            tokens = bucket.tokens(),
            "Checked token bucket"
        );
        Ok(allowed)
    }

    /// Fill the bucket of `identity`. A missing bucket is left missing.
    pub fn reset(&self, identity: &Identity) -> Result<()> {
        let value = self.identity_value(identity)?;

        // Clone out so the map shard is unlocked while the bucket is touched
        let bucket = self.buckets.get(value).map(|b| Arc::clone(b.value()));
        if let Some(bucket) = bucket {
            bucket.reset();
        }
        Ok(())
    }

    /// Requests the bucket of `identity` can afford after refilling.
    pub fn allowed(&self, identity: &Identity) -> Result<u64> {
        let value = self.identity_value(identity)?;
        Ok(self.bucket_for(value).affordable(self.request_cost()))
    }

    fn identity_value<'a>(&self, identity: &'a Identity) -> Result<&'a str> {
        identity
            .get(&self.dimension)
            .ok_or(AuthGuardError::IncorrectIdentity)
    }

    fn bucket_for(&self, value: &str) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(value) {
            return Arc::clone(bucket.value());
        }

        let bucket = self
            .buckets
            .entry(value.to_string())
            .or_insert_with(|| {
                debug!(
                    dimension = %self.dimension,
                    capacity = self.capacity,
                    "Creating new token bucket"
                );
                Arc::new(TokenBucket::new(self.capacity, self.refill_rate))
            });
        Arc::clone(bucket.value())
    }
}

impl std::fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("dimension", &self.dimension)
            .field("capacity", &self.capacity)
            .field("request_cost", &self.request_cost())
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

#[async_trait]
impl Limiter for TokenBucketLimiter {
    async fn satisfy_limit(&self, identity: &Identity) -> Result<bool> {
        self.try_acquire(identity)
    }

    async fn reset_limit(&self, identity: &Identity) -> Result<()> {
        self.reset(identity)
    }
}

#[async_trait]
impl BucketLimiter for TokenBucketLimiter {
    fn set_request_cost(&self, cost: u64) {
        self.request_cost.store(cost.max(1), Ordering::SeqCst);
    }

    async fn requests_allowed(&self, identity: &Identity) -> Result<u64> {
        self.allowed(identity)
    }

    fn buckets(&self) -> HashMap<String, Arc<TokenBucket>> {
        self.buckets
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    fn sweep_bucket(&self, key: &str) -> Result<()> {
        self.buckets.remove(key);
        Ok(())
    }

    fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
