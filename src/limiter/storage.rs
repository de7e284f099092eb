//! Limit storage.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::Limit;
use crate::error::Result;

/// Source of per-dimension bucket capacities.
#[async_trait]
pub trait LimitStore: Send + Sync {
    /// Every configured limit.
    async fn limits(&self) -> Result<Vec<Limit>>;

    /// Limits for the named dimensions only. Unknown names are ignored.
    async fn limits_by_types(&self, dimensions: &[String]) -> Result<Vec<Limit>>;
}

/// Process-local limit store, usually seeded from configuration.
#[derive(Debug, Default)]
pub struct MemoryLimitStore {
    limits: RwLock<Vec<Limit>>,
}

impl MemoryLimitStore {
    pub fn new(limits: Vec<Limit>) -> Self {
        Self {
            limits: RwLock::new(limits),
        }
    }
}

#[async_trait]
impl LimitStore for MemoryLimitStore {
    async fn limits(&self) -> Result<Vec<Limit>> {
        Ok(self.limits.read().clone())
    }

    async fn limits_by_types(&self, dimensions: &[String]) -> Result<Vec<Limit>> {
        Ok(self
            .limits
            .read()
            .iter()
            .filter(|limit| dimensions.contains(&limit.dimension))
            .cloned()
            .collect())
    }
}
