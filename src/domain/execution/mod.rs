//! Execution domain - attempt records, the ledger seam and the engine

mod engine;
mod recovery;

pub use engine::{EngineConfig, ExecutionEngine, TradeOutcome};
pub use recovery::{recover, RecoveryReport};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::{hash::Hash, signature::Signature, transaction::Transaction};

use crate::shared::errors::LedgerError;
use crate::shared::types::TradeId;

/// Lifecycle of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Pending,
    Confirmed,
    Failed,
    Expired,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Confirmed => "confirmed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ExecutionStatus::Pending),
            "confirmed" => Some(ExecutionStatus::Confirmed),
            "failed" => Some(ExecutionStatus::Failed),
            "expired" => Some(ExecutionStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Pending)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the append-only audit log. A status change appends a new
/// record carrying the same `trade_id` and `attempt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub trade_id: TradeId,
    pub attempt: u32,
    pub instruction_hash: String,
    pub submitted_at: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub signature: Option<String>,
    pub last_valid_block_height: u64,
    pub retry_count: u32,
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn pending(
        trade_id: TradeId,
        attempt: u32,
        instruction_hash: String,
        signature: &Signature,
        last_valid_block_height: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            trade_id,
            attempt,
            instruction_hash,
            submitted_at: now,
            status: ExecutionStatus::Pending,
            signature: Some(signature.to_string()),
            last_valid_block_height,
            retry_count: 0,
            detail: None,
            recorded_at: now,
        }
    }

    /// Successor record for the same attempt.
    pub fn transition(
        &self,
        status: ExecutionStatus,
        retry_count: u32,
        detail: Option<String>,
    ) -> Self {
        Self {
            status,
            retry_count,
            detail,
            recorded_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// What the ledger currently says about a submitted signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptStatus {
    /// Landed without error at the required commitment.
    Confirmed,
    /// Landed with an error.
    Failed(String),
    /// Landed without error, below the required commitment so far.
    Processing,
    /// Unknown to the ledger, or not yet at the required commitment.
    Unknown,
}

/// Ledger RPC surface used by the engine.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Recent blockhash and the last block height at which it is valid.
    async fn latest_blockhash(&self) -> Result<(Hash, u64), LedgerError>;

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, LedgerError>;

    /// `Ok(Some(reason))` when the simulation reports an error.
    async fn simulate_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Option<String>, LedgerError>;

    /// With `search_history` the lookup also covers signatures that have
    /// aged out of the node's recent status cache.
    async fn signature_status(
        &self,
        signature: &Signature,
        search_history: bool,
    ) -> Result<ReceiptStatus, LedgerError>;

    async fn block_height(&self) -> Result<u64, LedgerError>;

    async fn slot(&self) -> Result<u64, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_is_not_terminal() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(ExecutionStatus::Confirmed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Expired.is_terminal());
        assert_eq!(ExecutionStatus::parse("expired"), Some(ExecutionStatus::Expired));
        assert_eq!(ExecutionStatus::parse("Expired"), None);
    }

    #[test]
    fn transition_keeps_attempt_identity() {
        let pending = ExecutionRecord::pending(
            TradeId::from("7"),
            2,
            "abcd".to_string(),
            &Signature::default(),
            1_000,
        );
        let failed = pending.transition(ExecutionStatus::Failed, 3, Some("custom error".to_string()));

        assert_eq!(failed.trade_id, pending.trade_id);
        assert_eq!(failed.attempt, 2);
        assert_eq!(failed.signature, pending.signature);
        assert_eq!(failed.submitted_at, pending.submitted_at);
        assert_eq!(failed.retry_count, 3);
        assert_eq!(failed.detail.as_deref(), Some("custom error"));
        assert_eq!(pending.status, ExecutionStatus::Pending);
    }
}
