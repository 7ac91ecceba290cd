//! Common types used across the application

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source-assigned trade identifier. Unique per trade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeId(String);

impl TradeId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TradeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TradeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
