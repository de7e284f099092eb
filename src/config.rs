//! Configuration management for Authguard.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bucket::RefillRate;
use crate::error::{AuthGuardError, Result};
use crate::limiter::{Dimension, Limit};

/// Prefix of environment variables overriding file values,
/// e.g. `AUTHGUARD__LIMITER__GC__TTL_SECS=300`.
const ENV_PREFIX: &str = "AUTHGUARD";

/// Main configuration for the Authguard service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthGuardConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Token bucket behaviour shared by all dimensions
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Bucket capacity per identity dimension
    #[serde(default = "default_limits")]
    pub limits: Vec<Limit>,

    /// Rules inserted at startup
    #[serde(default)]
    pub rules: RulesConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,

    /// Upper bound on handling a single request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// HTTP address serving `GET /health`
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
            request_timeout_secs: default_request_timeout(),
            http_addr: default_http_addr(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_grpc_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 50051))
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_request_timeout() -> u64 {
    5
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Token bucket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    #[serde(default)]
    pub refill_rate: RefillRateConfig,

    /// Tokens consumed by one login attempt
    #[serde(default = "default_request_cost")]
    pub request_cost: u64,

    #[serde(default)]
    pub gc: GcConfig,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            refill_rate: RefillRateConfig::default(),
            request_cost: default_request_cost(),
            gc: GcConfig::default(),
        }
    }
}

fn default_request_cost() -> u64 {
    1
}

/// `count` tokens return to every bucket per `window_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefillRateConfig {
    #[serde(default = "default_refill_count")]
    pub count: u64,

    #[serde(default = "default_refill_window")]
    pub window_secs: u64,
}

impl Default for RefillRateConfig {
    fn default() -> Self {
        Self {
            count: default_refill_count(),
            window_secs: default_refill_window(),
        }
    }
}

impl RefillRateConfig {
    pub fn refill_rate(&self) -> RefillRate {
        RefillRate::new(self.count, Duration::from_secs(self.window_secs))
    }
}

fn default_refill_count() -> u64 {
    3
}

fn default_refill_window() -> u64 {
    30
}

/// Idle bucket eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcConfig {
    #[serde(default = "default_gc_enabled")]
    pub enabled: bool,

    /// Minimum idle time before a full bucket is evicted
    #[serde(default = "default_gc_ttl")]
    pub ttl_secs: u64,

    /// Time between sweeps
    #[serde(default = "default_gc_interval")]
    pub interval_secs: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            enabled: default_gc_enabled(),
            ttl_secs: default_gc_ttl(),
            interval_secs: default_gc_interval(),
        }
    }
}

impl GcConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_gc_enabled() -> bool {
    true
}

fn default_gc_ttl() -> u64 {
    600
}

fn default_gc_interval() -> u64 {
    60
}

fn default_limits() -> Vec<Limit> {
    vec![
        Limit::new(Dimension::Login.as_str(), 10),
        Limit::new(Dimension::Password.as_str(), 100),
        Limit::new(Dimension::Ip.as_str(), 1000),
    ]
}

/// Seed entries for the white and black lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub white: Vec<String>,

    #[serde(default)]
    pub black: Vec<String>,
}

impl Default for AuthGuardConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            limiter: LimiterConfig::default(),
            limits: default_limits(),
            rules: RulesConfig::default(),
        }
    }
}

impl AuthGuardConfig {
    /// Load configuration from a YAML file, applying `AUTHGUARD__*`
    /// environment overrides on top.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: AuthGuardConfig = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()).format(::config::FileFormat::Yaml))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AuthGuardConfig = serde_yaml::from_str(yaml)
            .map_err(|e| AuthGuardError::Config(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the limiters cannot work with.
    pub fn validate(&self) -> Result<()> {
        let refill = &self.limiter.refill_rate;
        if refill.window_secs == 0 {
            return Err(AuthGuardError::Config(
                "limiter.refill_rate.window_secs must be positive".to_string(),
            ));
        }

        if self.limiter.request_cost == 0 {
            return Err(AuthGuardError::Config(
                "limiter.request_cost must be at least 1".to_string(),
            ));
        }

        let gc = &self.limiter.gc;
        if gc.enabled && gc.interval_secs == 0 {
            return Err(AuthGuardError::Config(
                "limiter.gc.interval_secs must be positive when gc is enabled".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for limit in &self.limits {
            if !seen.insert(limit.dimension.as_str()) {
                return Err(AuthGuardError::Config(format!(
                    "duplicate limit for '{}'",
                    limit.dimension
                )));
            }
            if limit.capacity == 0 {
                return Err(AuthGuardError::Config(format!(
                    "limit for '{}' must have a positive capacity",
                    limit.dimension
                )));
            }
            if limit.dimension.is_empty() || limit.dimension.contains('_') {
                return Err(AuthGuardError::Config(format!(
                    "invalid dimension name '{}'",
                    limit.dimension
                )));
            }
        }

        Ok(())
    }
}
