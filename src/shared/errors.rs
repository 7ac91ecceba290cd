//! Error handling for the application

use thiserror::Error;

/// Trade feed errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Trade feed unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed trade record: {0}")]
    MalformedRecord(String),
}

/// Swap planning errors. None of these consume an execution attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    #[error("Pool state at slot {pool_slot} is stale (tip {tip_slot}, max age {max_age} slots)")]
    StalePool {
        pool_slot: u64,
        tip_slot: u64,
        max_age: u64,
    },

    #[error("Trade assets {input}/{output} do not match pool {pool}")]
    AssetMismatch {
        input: String,
        output: String,
        pool: String,
    },

    #[error("Pool unavailable: {0}")]
    PoolUnavailable(String),
}

/// Ledger RPC errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Network or decoding failure; the same request may be retried.
    #[error("Ledger transport error: {0}")]
    Transport(String),

    /// The ledger refused the transaction. Terminal for the attempt.
    #[error("Submission rejected: {0}")]
    Rejected(String),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Transport(_))
    }
}

/// Event store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt store row: {0}")]
    Corrupt(String),
}

/// Execution-related errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Confirmation timeout for {0}")]
    ConfirmationTimeout(String),

    #[error("Trade {trade_id} failed after {attempts} attempts")]
    AttemptsExhausted { trade_id: String, attempts: u32 },

    #[error("Failed to build transaction: {0}")]
    Build(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Startup configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
