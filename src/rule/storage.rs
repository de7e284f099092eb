//! Rule storage.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use super::{ListType, Rule};
use crate::error::Result;

/// Persistence for white/black list rules.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Insert a rule and return its new id.
    async fn create(&self, rule: Rule) -> Result<i64>;

    /// Delete a rule by id. Unknown ids are not an error.
    async fn delete(&self, id: i64) -> Result<()>;

    /// All rules of one list.
    async fn get_for_type(&self, list_type: ListType) -> Result<Vec<Rule>>;

    /// Rules whose value equals `ip_net` exactly.
    async fn find(&self, ip_net: &str, list_type: ListType) -> Result<Vec<Rule>>;
}

/// Process-local rule store. Listing keeps insertion order.
#[derive(Debug)]
pub struct MemoryRuleStore {
    rules: RwLock<Vec<Rule>>,
    next_id: AtomicI64,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Number of stored rules across both lists.
    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

impl Default for MemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn create(&self, mut rule: Rule) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        rule.id = id;

        trace!(id, ip_net = %rule.ip_net, list = %rule.list_type, "Storing rule");
        self.rules.write().push(rule);
        Ok(id)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.rules.write().retain(|rule| rule.id != id);
        Ok(())
    }

    async fn get_for_type(&self, list_type: ListType) -> Result<Vec<Rule>> {
        Ok(self
            .rules
            .read()
            .iter()
            .filter(|rule| rule.list_type == list_type)
            .cloned()
            .collect())
    }

    async fn find(&self, ip_net: &str, list_type: ListType) -> Result<Vec<Rule>> {
        Ok(self
            .rules
            .read()
            .iter()
            .filter(|rule| rule.list_type == list_type && rule.ip_net == ip_net)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let store = MemoryRuleStore::new();

        let first = store.create(Rule::new("127.0.0.1", ListType::White)).await.unwrap();
        let second = store.create(Rule::new("127.0.0.1", ListType::White)).await.unwrap();

        assert!(second > first);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_get_for_type_filters_and_keeps_order() {
        let store = MemoryRuleStore::new();
        store.create(Rule::new("127.0.0.1", ListType::White)).await.unwrap();
        store.create(Rule::new("10.0.0.0/24", ListType::Black)).await.unwrap();
        store.create(Rule::new("10.0.0.0/24", ListType::White)).await.unwrap();

        let white = store.get_for_type(ListType::White).await.unwrap();
        assert_eq!(white.len(), 2);
        assert_eq!(white[0].ip_net, "127.0.0.1");
        assert_eq!(white[1].ip_net, "10.0.0.0/24");

        let black = store.get_for_type(ListType::Black).await.unwrap();
        assert_eq!(black.len(), 1);
    }

    #[tokio::test]
    async fn test_find_is_exact() {
        let store = MemoryRuleStore::new();
        let id = store.create(Rule::new("10.0.0.0/24", ListType::Black)).await.unwrap();

        let found = store.find("10.0.0.0/24", ListType::Black).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);

        assert!(store.find("10.0.0.1", ListType::Black).await.unwrap().is_empty());
        assert!(store.find("10.0.0.0/24", ListType::White).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryRuleStore::new();
        let id = store.create(Rule::new("127.0.0.1", ListType::White)).await.unwrap();

        store.delete(id).await.unwrap();
        assert!(store.is_empty());

        // Deleting again is harmless
        store.delete(id).await.unwrap();
    }
}
