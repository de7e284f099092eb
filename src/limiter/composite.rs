//! Composite limiter combining one token bucket limiter per dimension.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{BucketLimiter, Identity, LimitStore, Limiter, TokenBucketLimiter, DEFAULT_REQUEST_COST};
use crate::bucket::{RefillRate, TokenBucket};
use crate::error::{AuthGuardError, Result};

/// Separates the dimension from the identity value in composite bucket keys.
const BUCKET_KEY_SEPARATOR: char = '_';

/// Requires a request to pass the token bucket of every dimension it names.
///
/// The per-dimension limiters are built once, on first use, from the limits
/// stored for the dimensions of that first identity. From then on the set of
/// dimensions is fixed: identities naming any other dimension are rejected.
pub struct CompositeLimiter {
    limit_store: Arc<dyn LimitStore>,
    refill_rate: RefillRate,
    request_cost: AtomicU64,
    limiters: OnceCell<HashMap<String, TokenBucketLimiter>>,
}

impl CompositeLimiter {
    pub fn new(limit_store: Arc<dyn LimitStore>, refill_rate: RefillRate) -> Self {
        Self {
            limit_store,
            refill_rate,
            request_cost: AtomicU64::new(DEFAULT_REQUEST_COST),
            limiters: OnceCell::new(),
        }
    }

    /// Whether the per-dimension limiters have been built.
    pub fn is_initialized(&self) -> bool {
        self.limiters.initialized()
    }

    /// Dimensions served once initialized, in no particular order.
    pub fn dimensions(&self) -> Vec<String> {
        self.limiters
            .get()
            .map(|limiters| limiters.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Build the per-dimension limiters, once.
    ///
    /// Concurrent first callers wait for a single fetch. A failed fetch
    /// leaves the limiter uninitialized so a later call can retry it.
    async fn init(&self, identity: &Identity) -> Result<&HashMap<String, TokenBucketLimiter>> {
        self.limiters
            .get_or_try_init(|| async {
                let dimensions: Vec<String> = identity.dimensions().map(str::to_string).collect();
                let limits = self.limit_store.limits_by_types(&dimensions).await?;
                if limits.is_empty() {
                    return Err(AuthGuardError::NoLimitsFound);
                }

                let request_cost = self.request_cost.load(Ordering::SeqCst);
                let limiters: HashMap<String, TokenBucketLimiter> = limits
                    .into_iter()
                    .map(|limit| {
                        let limiter = TokenBucketLimiter::new(
                            limit.dimension.clone(),
                            limit.capacity,
                            self.refill_rate,
                        );
                        limiter.set_request_cost(request_cost);
                        debug!(
                            dimension = limiter.dimension(),
                            capacity = limiter.capacity(),
                            "Dimension limiter built"
                        );
                        (limit.dimension, limiter)
                    })
                    .collect();

                info!(
                    dimensions = ?limiters.keys().collect::<Vec<_>>(),
                    request_cost,
                    "Composite limiter initialized"
                );
                Ok(limiters)
            })
            .await
    }

    fn limiter_for<'a>(
        limiters: &'a HashMap<String, TokenBucketLimiter>,
        dimension: &str,
    ) -> Result<&'a TokenBucketLimiter> {
        limiters
            .get(dimension)
            .ok_or(AuthGuardError::IncorrectIdentity)
    }
}

impl std::fmt::Debug for CompositeLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeLimiter")
            .field("refill_rate", &self.refill_rate)
            .field("request_cost", &self.request_cost.load(Ordering::SeqCst))
            .field("limiters", &self.limiters.get())
            .finish()
    }
}

#[async_trait]
impl Limiter for CompositeLimiter {
    async fn satisfy_limit(&self, identity: &Identity) -> Result<bool> {
        if identity.is_empty() {
            return Err(AuthGuardError::IncorrectIdentity);
        }

        let limiters = self.init(identity).await?;
        for dimension in identity.dimensions() {
            let limiter = Self::limiter_for(limiters, dimension)?;
            if !limiter.try_acquire(identity)? {
                debug!(dimension, "Composite limit denied");
                return Ok(false);
            }
        }

        Ok(true)
    }

    async fn reset_limit(&self, identity: &Identity) -> Result<()> {
        if identity.is_empty() {
            return Err(AuthGuardError::IncorrectIdentity);
        }

        let limiters = self.limiters.get().ok_or(AuthGuardError::NoLimitsFound)?;
        for dimension in identity.dimensions() {
            Self::limiter_for(limiters, dimension)?.reset(identity)?;
        }

        Ok(())
    }
}

#[async_trait]
impl BucketLimiter for CompositeLimiter {
    fn set_request_cost(&self, cost: u64) {
        let cost = cost.max(1);
        self.request_cost.store(cost, Ordering::SeqCst);

        if let Some(limiters) = self.limiters.get() {
            for limiter in limiters.values() {
                limiter.set_request_cost(cost);
            }
        }
    }

    /// The scarcest dimension named by `identity` decides.
    async fn requests_allowed(&self, identity: &Identity) -> Result<u64> {
        if identity.is_empty() {
            return Err(AuthGuardError::IncorrectIdentity);
        }

        let limiters = self.init(identity).await?;
        let mut min_allowed = u64::MAX;
        for dimension in identity.dimensions() {
            let allowed = Self::limiter_for(limiters, dimension)?.allowed(identity)?;
            min_allowed = min_allowed.min(allowed);
        }

        Ok(min_allowed)
    }

    /// Buckets of every dimension, keyed `<dimension>_<value>`.
    fn buckets(&self) -> HashMap<String, Arc<TokenBucket>> {
        let Some(limiters) = self.limiters.get() else {
            return HashMap::new();
        };

        limiters
            .iter()
            .flat_map(|(dimension, limiter)| {
                limiter
                    .buckets()
                    .into_iter()
                    .map(move |(value, bucket)| {
                        (format!("{dimension}{BUCKET_KEY_SEPARATOR}{value}"), bucket)
                    })
            })
            .collect()
    }

    fn sweep_bucket(&self, key: &str) -> Result<()> {
        let (dimension, value) = key
            .split_once(BUCKET_KEY_SEPARATOR)
            .ok_or_else(|| AuthGuardError::IncorrectBucketKey(key.to_string()))?;

        let limiter = self
            .limiters
            .get()
            .and_then(|limiters| limiters.get(dimension))
            .ok_or_else(|| AuthGuardError::IncorrectBucketKey(key.to_string()))?;

        limiter.sweep_bucket(value)
    }

    fn bucket_count(&self) -> usize {
        self.limiters
            .get()
            .map(|limiters| limiters.values().map(|l| l.bucket_count()).sum())
            .unwrap_or(0)
    }
}
