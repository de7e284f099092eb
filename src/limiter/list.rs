//! White and black list limiters.

use async_trait::async_trait;

use super::{Dimension, Identity, Limiter};
use crate::error::{AuthGuardError, Result};
use crate::rule::{ListType, RuleService};

/// Limiter answering from a single rule list, keyed by the ip dimension.
///
/// A white list satisfies identities whose ip is listed; a black list
/// satisfies identities whose ip is not. Lists hold no per-request state,
/// so resetting is not supported.
#[derive(Clone)]
pub struct ListLimiter {
    rule_service: RuleService,
    list_type: ListType,
}

impl ListLimiter {
    pub fn white_list(rule_service: RuleService) -> Self {
        Self {
            rule_service,
            list_type: ListType::White,
        }
    }

    pub fn black_list(rule_service: RuleService) -> Self {
        Self {
            rule_service,
            list_type: ListType::Black,
        }
    }
}

#[async_trait]
impl Limiter for ListLimiter {
    async fn satisfy_limit(&self, identity: &Identity) -> Result<bool> {
        let ip = identity
            .get(Dimension::Ip.as_str())
            .ok_or(AuthGuardError::IncorrectIdentity)?;

        let listed = self.rule_service.in_list(ip, self.list_type).await?;
        Ok(match self.list_type {
            ListType::White => listed,
            ListType::Black => !listed,
        })
    }

    async fn reset_limit(&self, _identity: &Identity) -> Result<()> {
        Err(AuthGuardError::NotSupported)
    }
}
