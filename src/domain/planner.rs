//! Swap planning: trade + fresh pool state -> executable swap instruction

use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::domain::trade::Trade;
use crate::exchanges::raydium_v4::instruction::{swap_base_in_accounts, swap_base_in_data};
use crate::exchanges::types::{PoolState, SwapDirection, SwapInstruction};
use crate::math::{amount_out_with_fee, ideal_amount_out, price_impact_bps, scale_bps, slippage_bound};
use crate::shared::errors::PlanError;

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Wallet that signs and owns the token accounts.
    pub owner: Pubkey,
    pub slippage_bps: u32,
    pub max_price_impact_bps: Option<u32>,
    pub max_pool_age_slots: u64,
    /// Size of the copy relative to the observed trade; 10_000 copies 1:1.
    pub copy_ratio_bps: u32,
    pub max_amount_in: Option<u64>,
}

impl PlannerConfig {
    pub fn new(owner: Pubkey, slippage_bps: u32, max_pool_age_slots: u64) -> Self {
        Self {
            owner,
            slippage_bps,
            max_price_impact_bps: None,
            max_pool_age_slots,
            copy_ratio_bps: 10_000,
            max_amount_in: None,
        }
    }
}

/// Deterministic planner: identical inputs always give an identical instruction.
#[derive(Debug, Clone)]
pub struct SwapPlanner {
    config: PlannerConfig,
}

impl SwapPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Copy size for an observed input amount.
    pub fn size_for(&self, observed_amount_in: u64) -> u64 {
        let scaled = scale_bps(observed_amount_in, self.config.copy_ratio_bps);
        match self.config.max_amount_in {
            Some(cap) => scaled.min(cap),
            None => scaled,
        }
    }

    /// `tip_slot` is the most recent slot known to the caller; the pool read must
    /// be within `max_pool_age_slots` of it.
    pub fn plan(
        &self,
        trade: &Trade,
        pool: &PoolState,
        tip_slot: u64,
    ) -> Result<SwapInstruction, PlanError> {
        let age = tip_slot.saturating_sub(pool.slot);
        if age > self.config.max_pool_age_slots {
            return Err(PlanError::StalePool {
                pool_slot: pool.slot,
                tip_slot,
                max_age: self.config.max_pool_age_slots,
            });
        }

        let (direction, reserve_in, reserve_out) = direction(trade, pool)?;

        let amount_in = self.size_for(trade.amount_in);
        if amount_in == 0 {
            return Err(PlanError::InsufficientLiquidity(
                "copy amount rounds to zero".to_string(),
            ));
        }
        if reserve_in == 0 || reserve_out == 0 {
            return Err(PlanError::InsufficientLiquidity(format!(
                "pool {} has an empty reserve",
                pool.pool()
            )));
        }

        let ideal = ideal_amount_out(amount_in, reserve_in, reserve_out);
        let amount_out = amount_out_with_fee(
            amount_in,
            reserve_in,
            reserve_out,
            pool.fee_numerator,
            pool.fee_denominator,
        );
        let min_amount_out = slippage_bound(amount_in, reserve_in, reserve_out, self.config.slippage_bps);

        if amount_out == 0 {
            return Err(PlanError::InsufficientLiquidity(format!(
                "input {} yields no output",
                amount_in
            )));
        }
        if amount_out < min_amount_out {
            return Err(PlanError::InsufficientLiquidity(format!(
                "output {} below slippage bound {} (ideal {}, tolerance {} bps)",
                amount_out, min_amount_out, ideal, self.config.slippage_bps
            )));
        }
        if let Some(max_impact) = self.config.max_price_impact_bps {
            let impact = price_impact_bps(
                amount_in,
                reserve_in,
                pool.fee_numerator,
                pool.fee_denominator,
            );
            if impact > max_impact as u64 {
                return Err(PlanError::InsufficientLiquidity(format!(
                    "price impact {} bps exceeds {} bps",
                    impact, max_impact
                )));
            }
        }

        let accounts = swap_base_in_accounts(
            &pool.keys,
            &self.config.owner,
            &trade.input_mint,
            &trade.output_mint,
        );
        let payload = swap_base_in_data(amount_in, min_amount_out)
            .map_err(|e| PlanError::PoolUnavailable(format!("encode swap: {}", e)))?;

        debug!(
            trade_id = %trade.id,
            ?direction,
            amount_in,
            amount_out,
            min_amount_out,
            pool_slot = pool.slot,
            "Swap planned"
        );

        Ok(SwapInstruction::new(
            trade.id.clone(),
            pool.keys.program_id,
            trade.input_mint,
            trade.output_mint,
            amount_in,
            amount_out,
            min_amount_out,
            accounts,
            payload,
        ))
    }
}

fn direction(trade: &Trade, pool: &PoolState) -> Result<(SwapDirection, u64, u64), PlanError> {
    if trade.input_mint == pool.base_mint() && trade.output_mint == pool.quote_mint() {
        Ok((SwapDirection::BaseToQuote, pool.base_reserve, pool.quote_reserve))
    } else if trade.input_mint == pool.quote_mint() && trade.output_mint == pool.base_mint() {
        Ok((SwapDirection::QuoteToBase, pool.quote_reserve, pool.base_reserve))
    } else {
        Err(PlanError::AssetMismatch {
            input: trade.input_mint.to_string(),
            output: trade.output_mint.to_string(),
            pool: pool.pool().to_string(),
        })
    }
}
