//! Application wiring: stores, rule service, limiters and the sweeper.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{AuthGuardConfig, GcConfig, LimiterConfig};
use crate::error::Result;
use crate::limiter::{
    AuthLimiter, BucketLimiter, CompositeLimiter, Dimension, Identity, LimitStore, Limiter,
    MemoryLimitStore, Sweeper,
};
use crate::rule::{MemoryRuleStore, RuleService, RuleStore};

/// The administrative and checking operations exposed to the transport.
pub struct App {
    rules: RuleService,
    limiter: AuthLimiter,
    bucket_limiter: Arc<CompositeLimiter>,
    gc: GcConfig,
}

impl App {
    /// Build the application with in-memory stores seeded from `config`.
    pub async fn new(config: &AuthGuardConfig) -> Result<Self> {
        let limit_store = Arc::new(MemoryLimitStore::new(config.limits.clone()));
        let rule_store = Arc::new(MemoryRuleStore::new());

        let app = Self::with_stores(limit_store.clone(), rule_store, &config.limiter);

        for ip_net in &config.rules.white {
            app.white_list_add(ip_net).await?;
        }
        for ip_net in &config.rules.black {
            app.black_list_add(ip_net).await?;
        }

        for limit in limit_store.limits().await? {
            info!(dimension = %limit.dimension, capacity = limit.capacity, "Limit configured");
        }
        info!(
            white = config.rules.white.len(),
            black = config.rules.black.len(),
            "Rules seeded"
        );

        Ok(app)
    }

    /// Build the application on top of externally provided stores.
    pub fn with_stores(
        limit_store: Arc<dyn LimitStore>,
        rule_store: Arc<dyn RuleStore>,
        config: &LimiterConfig,
    ) -> Self {
        let rules = RuleService::new(rule_store);

        let bucket_limiter = Arc::new(CompositeLimiter::new(
            limit_store,
            config.refill_rate.refill_rate(),
        ));
        bucket_limiter.set_request_cost(config.request_cost);

        Self {
            limiter: AuthLimiter::new(rules.clone(), bucket_limiter.clone()),
            rules,
            bucket_limiter,
            gc: config.gc.clone(),
        }
    }

    /// Start the bucket sweeper if garbage collection is enabled.
    pub fn start_sweeper(&self, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        if !self.gc.enabled {
            info!("Bucket sweeper disabled");
            return None;
        }

        let sweeper = Sweeper::new(self.bucket_limiter.clone(), self.gc.ttl());
        Some(sweeper.spawn(self.gc.interval(), shutdown))
    }

    /// Whether a login attempt may proceed.
    pub async fn limit_check(&self, ip: &str, login: &str, password: &str) -> Result<bool> {
        let identity = Identity::new()
            .with(Dimension::Ip.as_str(), ip)
            .with(Dimension::Login.as_str(), login)
            .with(Dimension::Password.as_str(), password);

        self.limiter.satisfy_limit(&identity).await
    }

    /// Forget the attempts recorded for an ip and a login.
    pub async fn limit_reset(&self, ip: &str, login: &str) -> Result<()> {
        let identity = Identity::new()
            .with(Dimension::Ip.as_str(), ip)
            .with(Dimension::Login.as_str(), login);

        self.limiter.reset_limit(&identity).await
    }

    pub async fn white_list_add(&self, ip_net: &str) -> Result<()> {
        self.rules.white_list_add(ip_net).await
    }

    pub async fn white_list_delete(&self, ip_net: &str) -> Result<()> {
        self.rules.white_list_delete(ip_net).await
    }

    pub async fn black_list_add(&self, ip_net: &str) -> Result<()> {
        self.rules.black_list_add(ip_net).await
    }

    pub async fn black_list_delete(&self, ip_net: &str) -> Result<()> {
        self.rules.black_list_delete(ip_net).await
    }

    /// Number of live token buckets across all dimensions.
    pub fn bucket_count(&self) -> usize {
        self.bucket_limiter.bucket_count()
    }
}
