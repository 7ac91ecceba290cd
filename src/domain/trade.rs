//! Observed trades and the target filter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::shared::types::TradeId;

/// A swap observed on the feed, attributed to one actor. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub actor: String,
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount_in: u64,
    pub observed_at: DateTime<Utc>,
    /// Venue pool named by the feed, if any.
    pub pool: Option<Pubkey>,
}

impl Trade {
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.observed_at
    }
}

/// Selects trades made by the configured target.
#[derive(Debug, Clone)]
pub struct TradeFilter {
    target: String,
}

impl TradeFilter {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn accepts(&self, trade: &Trade) -> bool {
        matches(trade, &self.target)
    }
}

/// Store-level summary of where a trade stands. Attempt history lives in the
/// execution records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeDisposition {
    /// Waiting for a lane (or currently being executed).
    Queued,
    /// Planning failed; retried on a later poll cycle.
    Deferred,
    Confirmed,
    PermanentlyFailed,
    /// Rejected by backpressure or aged out while deferred.
    Dropped,
}

impl TradeDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDisposition::Queued => "queued",
            TradeDisposition::Deferred => "deferred",
            TradeDisposition::Confirmed => "confirmed",
            TradeDisposition::PermanentlyFailed => "permanently_failed",
            TradeDisposition::Dropped => "dropped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(TradeDisposition::Queued),
            "deferred" => Some(TradeDisposition::Deferred),
            "confirmed" => Some(TradeDisposition::Confirmed),
            "permanently_failed" => Some(TradeDisposition::PermanentlyFailed),
            "dropped" => Some(TradeDisposition::Dropped),
            _ => None,
        }
    }

    /// No further work will ever be done for the trade.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            TradeDisposition::Confirmed
                | TradeDisposition::PermanentlyFailed
                | TradeDisposition::Dropped
        )
    }
}

impl std::fmt::Display for TradeDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact identity match on the actor field.
pub fn matches(trade: &Trade, target: &str) -> bool {
    trade.actor == target
}
