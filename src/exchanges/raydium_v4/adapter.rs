use async_trait::async_trait;
use solana_sdk::{account::Account, pubkey::Pubkey};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::parser::{AmmInfo, RaydiumV4Parser};
use crate::exchanges::types::{PoolKeys, PoolState};
use crate::exchanges::{AccountReader, PoolSource};
use crate::shared::errors::PlanError;
use crate::shared::utils::short_pubkey;

const AMM_AUTHORITY_SEED: &[u8] = b"amm authority";

pub struct RaydiumV4Adapter {
    reader: Arc<dyn AccountReader>,
    program_id: Pubkey,
    keys_cache: RwLock<HashMap<Pubkey, PoolKeys>>,
}

impl RaydiumV4Adapter {
    pub fn new(reader: Arc<dyn AccountReader>, program_id: Pubkey) -> Self {
        Self {
            reader,
            program_id,
            keys_cache: RwLock::new(HashMap::new()),
        }
    }

    async fn pool_keys(&self, pool: &Pubkey) -> Result<PoolKeys, PlanError> {
        if let Some(keys) = self.keys_cache.read().await.get(pool) {
            return Ok(keys.clone());
        }

        let keys = self.resolve_keys(pool).await?;
        self.keys_cache.write().await.insert(*pool, keys.clone());
        Ok(keys)
    }

    async fn resolve_keys(&self, pool: &Pubkey) -> Result<PoolKeys, PlanError> {
        info!(pool = %short_pubkey(pool), "Resolving Raydium V4 pool accounts");

        let (_, accounts) = self.read(&[*pool]).await?;
        let amm_account = self.owned_account(pool, accounts.into_iter().next().flatten())?;
        let amm = parse_amm(&amm_account.data)?;

        let (_, accounts) = self.read(&[amm.market_id]).await?;
        let market_account = accounts
            .into_iter()
            .next()
            .flatten()
            .ok_or_else(|| PlanError::PoolUnavailable(format!("market {} not found", amm.market_id)))?;
        let market = RaydiumV4Parser::parse_market_state(&market_account.data)
            .map_err(|e| PlanError::PoolUnavailable(e.to_string()))?;

        let authority =
            Pubkey::create_program_address(&[AMM_AUTHORITY_SEED, &[amm.nonce as u8]], &self.program_id)
                .map_err(|e| PlanError::PoolUnavailable(format!("amm authority: {}", e)))?;
        let market_vault_signer = Pubkey::create_program_address(
            &[amm.market_id.as_ref(), &market.vault_signer_nonce.to_le_bytes()],
            &amm.market_program_id,
        )
        .map_err(|e| PlanError::PoolUnavailable(format!("market vault signer: {}", e)))?;

        Ok(PoolKeys {
            amm: *pool,
            program_id: self.program_id,
            authority,
            open_orders: amm.open_orders,
            target_orders: amm.target_orders,
            base_vault: amm.base_vault,
            quote_vault: amm.quote_vault,
            base_mint: amm.base_mint,
            quote_mint: amm.quote_mint,
            market_program: amm.market_program_id,
            market: amm.market_id,
            market_bids: market.bids,
            market_asks: market.asks,
            market_event_queue: market.event_queue,
            market_base_vault: market.base_vault,
            market_quote_vault: market.quote_vault,
            market_vault_signer,
        })
    }

    async fn read(&self, keys: &[Pubkey]) -> Result<(u64, Vec<Option<Account>>), PlanError> {
        self.reader
            .get_accounts(keys)
            .await
            .map_err(|e| PlanError::PoolUnavailable(e.to_string()))
    }

    fn owned_account(&self, pool: &Pubkey, account: Option<Account>) -> Result<Account, PlanError> {
        let account =
            account.ok_or_else(|| PlanError::PoolUnavailable(format!("pool {} not found", pool)))?;
        if account.owner != self.program_id {
            return Err(PlanError::PoolUnavailable(format!(
                "Invalid pool owner. Expected: {}, Got: {}",
                self.program_id, account.owner
            )));
        }
        Ok(account)
    }
}

fn parse_amm(data: &[u8]) -> Result<AmmInfo, PlanError> {
    let amm = RaydiumV4Parser::parse_amm_info(data).map_err(|e| PlanError::PoolUnavailable(e.to_string()))?;
    if !amm.is_initialized() {
        return Err(PlanError::PoolUnavailable("pool is not initialized".to_string()));
    }
    Ok(amm)
}

fn vault_amount(account: Option<Account>, vault: &Pubkey) -> Result<u64, PlanError> {
    let account =
        account.ok_or_else(|| PlanError::PoolUnavailable(format!("vault {} not found", vault)))?;
    RaydiumV4Parser::parse_token_amount(&account.data)
        .map_err(|e| PlanError::PoolUnavailable(format!("vault {}: {}", vault, e)))
}

#[async_trait]
impl PoolSource for RaydiumV4Adapter {
    async fn pool_state(&self, pool: &Pubkey) -> Result<PoolState, PlanError> {
        let keys = self.pool_keys(pool).await?;

        // One read so the AMM accounting and both vaults come from the same slot.
        let (slot, accounts) = self.read(&[keys.amm, keys.base_vault, keys.quote_vault]).await?;
        let mut accounts = accounts.into_iter();
        let amm_account = self.owned_account(pool, accounts.next().flatten())?;
        let amm = parse_amm(&amm_account.data)?;
        let base_amount = vault_amount(accounts.next().flatten(), &keys.base_vault)?;
        let quote_amount = vault_amount(accounts.next().flatten(), &keys.quote_vault)?;

        let state = PoolState {
            base_reserve: base_amount.saturating_sub(amm.base_need_take_pnl),
            quote_reserve: quote_amount.saturating_sub(amm.quote_need_take_pnl),
            fee_numerator: amm.swap_fee_numerator,
            fee_denominator: amm.swap_fee_denominator,
            slot,
            keys,
        };
        debug!(
            pool = %short_pubkey(pool),
            slot,
            base_reserve = state.base_reserve,
            quote_reserve = state.quote_reserve,
            fee_bps = state.fee_bps(),
            "Pool state read"
        );
        Ok(state)
    }
}
