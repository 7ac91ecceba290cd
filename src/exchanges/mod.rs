pub mod compute_budget;
pub mod raydium_v4;
pub mod transaction_builder;
pub mod types;

use async_trait::async_trait;
use solana_sdk::{account::Account, pubkey::Pubkey};

use crate::exchanges::types::PoolState;
use crate::shared::errors::{LedgerError, PlanError};

/// Raw account access, one request per call.
#[async_trait]
pub trait AccountReader: Send + Sync {
    /// Returns the context slot of the read with the accounts in request order.
    async fn get_accounts(&self, keys: &[Pubkey]) -> Result<(u64, Vec<Option<Account>>), LedgerError>;
}

/// Venue adapter that reads a pool's current state.
#[async_trait]
pub trait PoolSource: Send + Sync {
    /// Always reads reserves from the ledger; never answers from a cache.
    async fn pool_state(&self, pool: &Pubkey) -> Result<PoolState, PlanError>;
}
