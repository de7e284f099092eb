//! Limiter for login forms: ip, login and password.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{BucketLimiter, CompositeLimiter, Dimension, Identity, Limiter, ListLimiter};
use crate::error::{AuthGuardError, Result};
use crate::rule::RuleService;

/// Dimensions every login attempt must carry.
const REQUIRED_DIMENSIONS: [Dimension; 3] = [Dimension::Ip, Dimension::Login, Dimension::Password];

/// Decides login attempts.
///
/// A black-listed ip is always denied and a white-listed ip always allowed,
/// with the black list checked first. Everything else goes through the
/// composite bucket limiter.
pub struct AuthLimiter {
    black_list: ListLimiter,
    white_list: ListLimiter,
    bucket_limiter: Arc<CompositeLimiter>,
}

impl AuthLimiter {
    pub fn new(rule_service: RuleService, bucket_limiter: Arc<CompositeLimiter>) -> Self {
        Self {
            black_list: ListLimiter::black_list(rule_service.clone()),
            white_list: ListLimiter::white_list(rule_service),
            bucket_limiter,
        }
    }

    /// Tokens consumed by each future login attempt.
    pub fn set_request_cost(&self, cost: u64) {
        self.bucket_limiter.set_request_cost(cost);
    }

    fn validate_identity(identity: &Identity) -> Result<()> {
        let complete = REQUIRED_DIMENSIONS
            .iter()
            .all(|dimension| identity.get(dimension.as_str()).is_some_and(|v| !v.is_empty()));

        if complete {
            Ok(())
        } else {
            Err(AuthGuardError::IncorrectIdentity)
        }
    }
}

#[async_trait]
impl Limiter for AuthLimiter {
    async fn satisfy_limit(&self, identity: &Identity) -> Result<bool> {
        Self::validate_identity(identity)?;

        if !self.black_list.satisfy_limit(identity).await? {
            debug!("Login attempt from black-listed ip denied");
            return Ok(false);
        }

        if self.white_list.satisfy_limit(identity).await? {
            debug!("Login attempt from white-listed ip allowed");
            return Ok(true);
        }

        self.bucket_limiter.satisfy_limit(identity).await
    }

    async fn reset_limit(&self, identity: &Identity) -> Result<()> {
        self.bucket_limiter.reset_limit(identity).await
    }
}
