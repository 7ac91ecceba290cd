use anyhow::{anyhow, Result};
use solana_sdk::{program_pack::Pack, pubkey::Pubkey};

/// Size of the `AmmInfo` account owned by the Raydium AMM v4 program.
pub const AMM_INFO_LEN: usize = 752;
/// Size of an OpenBook / Serum v3 market account, including both paddings.
pub const MARKET_STATE_LEN: usize = 388;

// AmmInfo: 32 u64 fields, then swap accounting, then the pubkeys.
const STATUS: usize = 0;
const NONCE: usize = 8;
const SWAP_FEE_NUMERATOR: usize = 176;
const SWAP_FEE_DENOMINATOR: usize = 184;
const BASE_NEED_TAKE_PNL: usize = 192;
const QUOTE_NEED_TAKE_PNL: usize = 200;
const BASE_VAULT: usize = 336;
const QUOTE_VAULT: usize = 368;
const BASE_MINT: usize = 400;
const QUOTE_MINT: usize = 432;
const OPEN_ORDERS: usize = 496;
const MARKET_ID: usize = 528;
const MARKET_PROGRAM_ID: usize = 560;
const TARGET_ORDERS: usize = 592;

// Market state v3, offsets include the 5-byte "serum" head padding.
const MARKET_VAULT_SIGNER_NONCE: usize = 45;
const MARKET_BASE_VAULT: usize = 117;
const MARKET_QUOTE_VAULT: usize = 165;
const MARKET_EVENT_QUEUE: usize = 253;
const MARKET_BIDS: usize = 285;
const MARKET_ASKS: usize = 317;

/// The parts of `AmmInfo` the planner needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmmInfo {
    pub status: u64,
    pub nonce: u64,
    pub swap_fee_numerator: u64,
    pub swap_fee_denominator: u64,
    pub base_need_take_pnl: u64,
    pub quote_need_take_pnl: u64,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub open_orders: Pubkey,
    pub market_id: Pubkey,
    pub market_program_id: Pubkey,
    pub target_orders: Pubkey,
}

impl AmmInfo {
    pub fn is_initialized(&self) -> bool {
        self.status != 0
    }
}

/// The parts of an OpenBook market the swap instruction references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketState {
    pub vault_signer_nonce: u64,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub event_queue: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
}

pub struct RaydiumV4Parser;

impl RaydiumV4Parser {
    pub fn parse_amm_info(data: &[u8]) -> Result<AmmInfo> {
        if data.len() < AMM_INFO_LEN {
            return Err(anyhow!(
                "AMM account too short: {} bytes, expected {}",
                data.len(),
                AMM_INFO_LEN
            ));
        }

        Ok(AmmInfo {
            status: read_u64(data, STATUS)?,
            nonce: read_u64(data, NONCE)?,
            swap_fee_numerator: read_u64(data, SWAP_FEE_NUMERATOR)?,
            swap_fee_denominator: read_u64(data, SWAP_FEE_DENOMINATOR)?,
            base_need_take_pnl: read_u64(data, BASE_NEED_TAKE_PNL)?,
            quote_need_take_pnl: read_u64(data, QUOTE_NEED_TAKE_PNL)?,
            base_vault: read_pubkey(data, BASE_VAULT)?,
            quote_vault: read_pubkey(data, QUOTE_VAULT)?,
            base_mint: read_pubkey(data, BASE_MINT)?,
            quote_mint: read_pubkey(data, QUOTE_MINT)?,
            open_orders: read_pubkey(data, OPEN_ORDERS)?,
            market_id: read_pubkey(data, MARKET_ID)?,
            market_program_id: read_pubkey(data, MARKET_PROGRAM_ID)?,
            target_orders: read_pubkey(data, TARGET_ORDERS)?,
        })
    }

    pub fn parse_market_state(data: &[u8]) -> Result<MarketState> {
        if data.len() < MARKET_STATE_LEN {
            return Err(anyhow!(
                "market account too short: {} bytes, expected {}",
                data.len(),
                MARKET_STATE_LEN
            ));
        }

        Ok(MarketState {
            vault_signer_nonce: read_u64(data, MARKET_VAULT_SIGNER_NONCE)?,
            base_vault: read_pubkey(data, MARKET_BASE_VAULT)?,
            quote_vault: read_pubkey(data, MARKET_QUOTE_VAULT)?,
            event_queue: read_pubkey(data, MARKET_EVENT_QUEUE)?,
            bids: read_pubkey(data, MARKET_BIDS)?,
            asks: read_pubkey(data, MARKET_ASKS)?,
        })
    }

    /// Balance of an SPL token account (a pool vault).
    pub fn parse_token_amount(data: &[u8]) -> Result<u64> {
        let account = spl_token::state::Account::unpack(data)
            .map_err(|e| anyhow!("invalid token account: {}", e))?;
        Ok(account.amount)
    }
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64> {
    let bytes: [u8; 8] = data
        .get(offset..offset + 8)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| anyhow!("u64 at offset {} out of bounds", offset))?;
    Ok(u64::from_le_bytes(bytes))
}

fn read_pubkey(data: &[u8], offset: usize) -> Result<Pubkey> {
    let bytes: [u8; 32] = data
        .get(offset..offset + 32)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| anyhow!("pubkey at offset {} out of bounds", offset))?;
    Ok(Pubkey::new_from_array(bytes))
}
