//! White/black list membership and rule management.

use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;
use tracing::debug;

use super::{ListType, Rule, RuleStore};
use crate::error::{AuthGuardError, Result};

/// Answers list membership for IP addresses and manages list entries.
#[derive(Clone)]
pub struct RuleService {
    store: Arc<dyn RuleStore>,
}

impl RuleService {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self { store }
    }

    pub async fn in_white_list(&self, ip: &str) -> Result<bool> {
        self.in_list(ip, ListType::White).await
    }

    pub async fn in_black_list(&self, ip: &str) -> Result<bool> {
        self.in_list(ip, ListType::Black).await
    }

    pub async fn white_list_add(&self, ip_net: &str) -> Result<()> {
        self.list_add(ip_net, ListType::White).await
    }

    pub async fn white_list_delete(&self, ip_net: &str) -> Result<()> {
        self.list_delete(ip_net, ListType::White).await
    }

    pub async fn black_list_add(&self, ip_net: &str) -> Result<()> {
        self.list_add(ip_net, ListType::Black).await
    }

    pub async fn black_list_delete(&self, ip_net: &str) -> Result<()> {
        self.list_delete(ip_net, ListType::Black).await
    }

    /// Whether `ip` equals a listed address or falls inside a listed network.
    ///
    /// IPv4-mapped IPv6 addresses match their IPv4 form. Stored values that are neither an address nor a network are skipped.
    pub async fn in_list(&self, ip: &str, list_type: ListType) -> Result<bool> {
        let addr = parse_ip(ip)?;

        let rules = self.store.get_for_type(list_type).await?;
        let matched = rules.iter().any(|rule| rule_matches(&rule.ip_net, &addr));

        debug!(ip = %addr, list = %list_type, matched, "List membership checked");
        Ok(matched)
    }

    /// Add an address or network entry. Duplicates are stored as separate rules.
    pub async fn list_add(&self, ip_net: &str, list_type: ListType) -> Result<()> {
        if ip_net.parse::<IpAddr>().is_err() && ip_net.parse::<IpNet>().is_err() {
            return Err(AuthGuardError::InvalidInputIp(ip_net.to_string()));
        }

        let id = self.store.create(Rule::new(ip_net, list_type)).await?;
        debug!(id, ip_net, list = %list_type, "Rule added");
        Ok(())
    }

    /// Delete every rule whose value is exactly `ip_net`.
    pub async fn list_delete(&self, ip_net: &str, list_type: ListType) -> Result<()> {
        let rules = self.store.find(ip_net, list_type).await?;
        if rules.is_empty() {
            return Err(AuthGuardError::RuleNotFound);
        }

        for rule in &rules {
            self.store.delete(rule.id).await?;
        }

        debug!(ip_net, list = %list_type, deleted = rules.len(), "Rules deleted");
        Ok(())
    }
}

/// Parses `ip` into its canonical form, so `::ffff:10.0.0.1` becomes `10.0.0.1`.
fn parse_ip(ip: &str) -> Result<IpAddr> {
    ip.parse::<IpAddr>()
        .map(|addr| addr.to_canonical())
        .map_err(|_| AuthGuardError::InvalidInputIp(ip.to_string()))
}

/// `addr` must already be canonical.
fn rule_matches(ip_net: &str, addr: &IpAddr) -> bool {
    if let Ok(rule_addr) = ip_net.parse::<IpAddr>() {
        return rule_addr.to_canonical() == *addr;
    }

    match ip_net.parse::<IpNet>() {
        Ok(IpNet::V6(net)) => match addr {
            IpAddr::V4(v4) => net.contains(&v4.to_ipv6_mapped()),
            IpAddr::V6(v6) => net.contains(v6),
        },
        Ok(net) => net.contains(addr),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::MemoryRuleStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::assert_ok;

    /// Store that fails every call and counts them.
    #[derive(Default)]
    struct BrokenStore {
        calls: AtomicUsize,
    }

    impl BrokenStore {
        fn fail<T>(&self) -> Result<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AuthGuardError::Storage("db error".to_string()))
        }
    }

    #[async_trait]
    impl RuleStore for BrokenStore {
        async fn create(&self, _rule: Rule) -> Result<i64> {
            self.fail()
        }

        async fn delete(&self, _id: i64) -> Result<()> {
            self.fail()
        }

        async fn get_for_type(&self, _list_type: ListType) -> Result<Vec<Rule>> {
            self.fail()
        }

        async fn find(&self, _ip_net: &str, _list_type: ListType) -> Result<Vec<Rule>> {
            self.fail()
        }
    }

    async fn service_with(rules: &[(&str, ListType)]) -> (RuleService, Arc<MemoryRuleStore>) {
        let store = Arc::new(MemoryRuleStore::new());
        for (ip_net, list_type) in rules {
            store.create(Rule::new(*ip_net, *list_type)).await.unwrap();
        }
        (RuleService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_direct_ip_match() {
        let (service, _) = service_with(&[("192.168.1.10", ListType::White)]).await;

        assert!(service.in_white_list("192.168.1.10").await.unwrap());
        assert!(!service.in_white_list("192.168.1.99").await.unwrap());
        assert!(!service.in_black_list("192.168.1.10").await.unwrap());
    }

    #[tokio::test]
    async fn test_cidr_containment() {
        let (service, _) = service_with(&[("192.168.3.0/24", ListType::Black)]).await;

        assert!(service.in_black_list("192.168.3.25").await.unwrap());
        assert!(service.in_black_list("192.168.3.0").await.unwrap());
        assert!(!service.in_black_list("192.168.4.25").await.unwrap());
    }

    #[tokio::test]
    async fn test_ipv6_rules() {
        let (service, _) = service_with(&[("2001:db8::/32", ListType::White)]).await;

        assert!(service.in_white_list("2001:db8::1").await.unwrap());
        assert!(!service.in_white_list("2001:db9::1").await.unwrap());
    }

    #[tokio::test]
    async fn test_ipv4_mapped_addresses_match_ipv4_rules() {
        let (service, _) = service_with(&[
            ("192.168.3.0/24", ListType::Black),
            ("10.0.0.1", ListType::Black),
            ("172.16.0.5", ListType::White),
        ])
        .await;

        assert!(service.in_black_list("::ffff:192.168.3.25").await.unwrap());
        assert!(service.in_black_list("::ffff:10.0.0.1").await.unwrap());
        assert!(service.in_white_list("::ffff:172.16.0.5").await.unwrap());
        assert!(!service.in_black_list("::ffff:192.168.4.25").await.unwrap());
    }

    #[tokio::test]
    async fn test_mapped_rules_match_ipv4_input() {
        let (service, _) = service_with(&[
            ("::ffff:10.0.0.1", ListType::Black),
            ("::ffff:192.168.3.0/120", ListType::Black),
        ])
        .await;

        assert!(service.in_black_list("10.0.0.1").await.unwrap());
        assert!(service.in_black_list("192.168.3.200").await.unwrap());
        assert!(!service.in_black_list("192.168.4.1").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_rejects_malformed_entries() {
        let store = Arc::new(BrokenStore::default());
        let service = RuleService::new(store.clone());

        for ip_net in ["invalid-ip", "10.0.0.0/99", "300.1.1.1", ""] {
            let result = service.black_list_add(ip_net).await;
            assert!(matches!(result, Err(AuthGuardError::InvalidInputIp(_))), "accepted: {ip_net}");
            let result = service.white_list_add(ip_net).await;
            assert!(matches!(result, Err(AuthGuardError::InvalidInputIp(_))), "accepted: {ip_net}");
        }

        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_add_accepts_addresses_and_networks() {
        let (service, store) = service_with(&[]).await;

        for ip_net in ["10.0.0.1", "10.0.0.0/8", "2001:db8::1", "2001:db8::/32"] {
            assert_ok!(service.white_list_add(ip_net).await);
        }
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn test_malformed_rules_are_skipped() {
        let (service, _) = service_with(&[
            ("not-a-cidr", ListType::White),
            ("10.0.0.0/99", ListType::White),
            ("10.0.0.1", ListType::White),
        ])
        .await;

        assert!(!service.in_white_list("10.0.0.2").await.unwrap());
        assert!(service.in_white_list("10.0.0.1").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_input_ip_does_not_touch_storage() {
        let store = Arc::new(BrokenStore::default());
        let service = RuleService::new(store.clone());

        let result = service.in_white_list("invalid-ip").await;
        assert!(matches!(result, Err(AuthGuardError::InvalidInputIp(_))));

        let result = service.in_black_list("10.0.0.0/24").await;
        assert!(matches!(result, Err(AuthGuardError::InvalidInputIp(_))));

        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_storage_errors_propagate() {
        let service = RuleService::new(Arc::new(BrokenStore::default()));

        let result = service.in_black_list("127.0.0.1").await;
        assert!(matches!(result, Err(AuthGuardError::Storage(_))));

        let result = service.white_list_add("127.0.0.1").await;
        assert!(matches!(result, Err(AuthGuardError::Storage(_))));

        let result = service.black_list_delete("127.0.0.1").await;
        assert!(matches!(result, Err(AuthGuardError::Storage(_))));
    }

    #[tokio::test]
    async fn test_add_is_not_deduplicated() {
        let (service, store) = service_with(&[]).await;

        assert_ok!(service.white_list_add("127.0.0.1").await);
        assert_ok!(service.white_list_add("127.0.0.1").await);
        assert_ok!(service.black_list_add("127.0.0.1").await);

        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_removes_every_exact_match() {
        let (service, store) = service_with(&[
            ("10.0.0.0/24", ListType::White),
            ("10.0.0.0/24", ListType::White),
            ("10.0.0.0/24", ListType::Black),
        ])
        .await;

        assert_ok!(service.white_list_delete("10.0.0.0/24").await);

        assert_eq!(store.len(), 1);
        assert!(service.in_black_list("10.0.0.7").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_does_not_use_cidr_matching() {
        let (service, _) = service_with(&[("10.0.0.0/24", ListType::Black)]).await;

        let result = service.black_list_delete("10.0.0.1").await;
        assert!(matches!(result, Err(AuthGuardError::RuleNotFound)));
    }

    #[tokio::test]
    async fn test_delete_missing_rule() {
        let (service, _) = service_with(&[]).await;

        let result = service.white_list_delete("127.0.0.1").await;
        assert!(matches!(result, Err(AuthGuardError::RuleNotFound)));
    }
}
