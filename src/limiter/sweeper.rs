//! Eviction of idle token buckets.
//!
//! A bucket is evicted when it is full and has not gained a token for at
//! least the configured TTL. Fullness stands in for "unused": a bucket that
//! was drained and has since refilled to exactly full looks the same as one
//! never touched, and loses its history when swept. Evicted identities simply
//! get a fresh, full bucket on their next request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::BucketLimiter;
use crate::error::Result;

/// Periodically prunes idle buckets from a bucket limiter.
pub struct Sweeper {
    limiter: Arc<dyn BucketLimiter>,
    ttl: Duration,
}

impl Sweeper {
    pub fn new(limiter: Arc<dyn BucketLimiter>, ttl: Duration) -> Self {
        Self { limiter, ttl }
    }

    /// Evict every full bucket idle for at least the TTL.
    ///
    /// Returns the number of evicted buckets. Stops at the first failed
    /// deletion; buckets already removed stay removed.
    pub fn sweep(&self) -> Result<usize> {
        self.sweep_at(Instant::now())
    }

    pub(crate) fn sweep_at(&self, now: Instant) -> Result<usize> {
        let buckets = self.limiter.buckets();
        if buckets.is_empty() {
            return Ok(0);
        }

        let expired: Vec<String> = buckets
            .into_iter()
            .filter(|(_, bucket)| bucket.is_full() && bucket.idle_for(now) >= self.ttl)
            .map(|(key, _)| key)
            .collect();

        for key in &expired {
            self.limiter.sweep_bucket(key)?;
        }

        Ok(expired.len())
    }

    /// Run `sweep` every `interval` until `shutdown` flips to `true` or its
    /// sender is dropped.
    pub fn spawn(self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = interval.as_secs_f64(),
                ttl_secs = self.ttl.as_secs_f64(),
                "Bucket sweeper started"
            );

            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.sweep() {
                            Ok(evicted) => debug!(
                                evicted,
                                remaining = self.limiter.bucket_count(),
                                "Bucket sweep finished"
                            ),
                            Err(e) => error!(error = %e, "Bucket sweep failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Bucket sweeper stopped");
        })
    }
}
