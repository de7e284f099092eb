//! Rate limiting logic and state management.
//!
//! Every limiter answers two questions through [`Limiter`]: may this request
//! proceed, and can its consumption be forgotten. Bucket-based limiters also
//! implement [`BucketLimiter`], which exposes their buckets to the sweeper.

mod auth;
mod composite;
mod list;
mod storage;
mod sweeper;
mod token_bucket;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::bucket::TokenBucket;
use crate::error::Result;

pub use auth::AuthLimiter;
pub use composite::CompositeLimiter;
pub use list::ListLimiter;
pub use storage::{LimitStore, MemoryLimitStore};
pub use sweeper::Sweeper;
pub use token_bucket::TokenBucketLimiter;

/// Tokens consumed by one request unless configured otherwise.
pub const DEFAULT_REQUEST_COST: u64 = 1;

/// Identity dimensions known to the auth limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Ip,
    Login,
    Password,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Ip => "ip",
            Dimension::Login => "login",
            Dimension::Password => "password",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The dimension/value pairs identifying the client of a request.
///
/// Dimensions are plain strings so that limiters can work with dimensions
/// beyond [`Dimension`]. Iteration follows dimension name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity(BTreeMap<String, String>);

impl Identity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the value of a dimension.
    pub fn with(mut self, dimension: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(dimension, value);
        self
    }

    pub fn insert(&mut self, dimension: impl Into<String>, value: impl Into<String>) {
        self.0.insert(dimension.into(), value.into());
    }

    pub fn get(&self, dimension: &str) -> Option<&str> {
        self.0.get(dimension).map(String::as_str)
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Identity {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Bucket capacity configured for one dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    /// Dimension name, e.g. "login"
    pub dimension: String,
    /// Requests a fresh bucket can absorb
    pub capacity: u64,
    #[serde(default)]
    pub description: Option<String>,
}

impl Limit {
    pub fn new(dimension: impl Into<String>, capacity: u64) -> Self {
        Self {
            dimension: dimension.into(),
            capacity,
            description: None,
        }
    }
}

/// Common contract of every limiter.
#[async_trait]
pub trait Limiter: Send + Sync {
    /// Whether the request identified by `identity` may proceed.
    ///
    /// A denial is `Ok(false)`, not an error.
    async fn satisfy_limit(&self, identity: &Identity) -> Result<bool>;

    /// Forget the consumption recorded for `identity`.
    async fn reset_limit(&self, identity: &Identity) -> Result<()>;
}

/// Limiters backed by token buckets.
#[async_trait]
pub trait BucketLimiter: Limiter {
    /// Tokens consumed by each future request. Values below one count as one.
    fn set_request_cost(&self, cost: u64);

    /// Requests `identity` can still make right now.
    async fn requests_allowed(&self, identity: &Identity) -> Result<u64>;

    /// Snapshot of every live bucket, keyed the way `sweep_bucket` expects.
    fn buckets(&self) -> HashMap<String, Arc<TokenBucket>>;

    /// Drop the bucket stored under `key`.
    fn sweep_bucket(&self, key: &str) -> Result<()>;

    /// Number of live buckets.
    fn bucket_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_builder() {
        let identity = Identity::new()
            .with(Dimension::Login.as_str(), "root")
            .with(Dimension::Ip.as_str(), "10.0.0.1");

        assert_eq!(identity.len(), 2);
        assert_eq!(identity.get("ip"), Some("10.0.0.1"));
        assert_eq!(identity.get("password"), None);
        assert_eq!(identity.dimensions().collect::<Vec<_>>(), vec!["ip", "login"]);
    }

    #[test]
    fn test_identity_keys_are_unique() {
        let identity: Identity = [("ip", "10.0.0.1"), ("ip", "10.0.0.2")].into_iter().collect();
        assert_eq!(identity.len(), 1);
        assert_eq!(identity.get("ip"), Some("10.0.0.2"));
    }

    #[test]
    fn test_limit_description_is_optional() {
        let limit: Limit = serde_yaml::from_str("dimension: login\ncapacity: 10\n").unwrap();
        assert_eq!(limit, Limit::new("login", 10));
    }
}
