//! Allow/deny rules on IP addresses and networks.

mod service;
mod storage;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use service::RuleService;
pub use storage::{MemoryRuleStore, RuleStore};

/// The list a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    /// Always allowed, bypassing rate limits
    White,
    /// Always denied
    Black,
}

impl ListType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListType::White => "white",
            ListType::Black => "black",
        }
    }
}

impl fmt::Display for ListType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single IP or CIDR entry of a white or black list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Store-assigned identifier, zero until created
    pub id: i64,
    /// Plain address ("10.0.0.1") or network ("10.0.0.0/24"), kept as given
    pub ip_net: String,
    pub list_type: ListType,
}

impl Rule {
    /// Create a rule that has not been stored yet.
    pub fn new(ip_net: impl Into<String>, list_type: ListType) -> Self {
        Self {
            id: 0,
            ip_net: ip_net.into(),
            list_type,
        }
    }
}
