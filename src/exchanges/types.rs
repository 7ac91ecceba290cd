use serde::{Deserialize, Serialize};
use solana_sdk::{
    hash::{Hash, Hasher},
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use crate::shared::types::TradeId;

/// Static account layout of a Raydium AMM v4 pool and its OpenBook market.
/// These addresses never change for a pool, so they may be cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolKeys {
    pub amm: Pubkey,
    pub program_id: Pubkey,
    pub authority: Pubkey,
    pub open_orders: Pubkey,
    pub target_orders: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub market_program: Pubkey,
    pub market: Pubkey,
    pub market_bids: Pubkey,
    pub market_asks: Pubkey,
    pub market_event_queue: Pubkey,
    pub market_base_vault: Pubkey,
    pub market_quote_vault: Pubkey,
    pub market_vault_signer: Pubkey,
}

/// Reserves and fee of a pool as read at `slot`. Never reused across trades.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub keys: PoolKeys,
    pub base_reserve: u64,
    pub quote_reserve: u64,
    pub fee_numerator: u64,
    pub fee_denominator: u64,
    pub slot: u64,
}

impl PoolState {
    pub fn pool(&self) -> Pubkey {
        self.keys.amm
    }

    pub fn base_mint(&self) -> Pubkey {
        self.keys.base_mint
    }

    pub fn quote_mint(&self) -> Pubkey {
        self.keys.quote_mint
    }

    pub fn fee_bps(&self) -> u64 {
        if self.fee_denominator == 0 {
            return 0;
        }
        self.fee_numerator * 10_000 / self.fee_denominator
    }
}

/// Which side of the pool the trade sells into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapDirection {
    /// base (coin) in, quote (pc) out
    BaseToQuote,
    /// quote (pc) in, base (coin) out
    QuoteToBase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountRef {
    pub fn writable(pubkey: Pubkey) -> Self {
        Self {
            pubkey,
            is_signer: false,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: Pubkey) -> Self {
        Self {
            pubkey,
            is_signer: false,
            is_writable: false,
        }
    }

    pub fn signer(pubkey: Pubkey) -> Self {
        Self {
            pubkey,
            is_signer: true,
            is_writable: false,
        }
    }
}

impl From<AccountRef> for AccountMeta {
    fn from(account: AccountRef) -> Self {
        if account.is_writable {
            AccountMeta::new(account.pubkey, account.is_signer)
        } else {
            AccountMeta::new_readonly(account.pubkey, account.is_signer)
        }
    }
}

/// A fully specified swap for one execution attempt.
///
/// Built by the planner from a trade and a fresh [`PoolState`]; a failed
/// instruction is discarded and replanned, never patched, so fields are
/// only readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapInstruction {
    trade_id: TradeId,
    program_id: Pubkey,
    input_mint: Pubkey,
    output_mint: Pubkey,
    amount_in: u64,
    expected_out: u64,
    min_amount_out: u64,
    accounts: Vec<AccountRef>,
    payload: Vec<u8>,
}

impl SwapInstruction {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        trade_id: TradeId,
        program_id: Pubkey,
        input_mint: Pubkey,
        output_mint: Pubkey,
        amount_in: u64,
        expected_out: u64,
        min_amount_out: u64,
        accounts: Vec<AccountRef>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            trade_id,
            program_id,
            input_mint,
            output_mint,
            amount_in,
            expected_out,
            min_amount_out,
            accounts,
            payload,
        }
    }

    pub fn trade_id(&self) -> &TradeId {
        &self.trade_id
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    pub fn input_mint(&self) -> Pubkey {
        self.input_mint
    }

    pub fn output_mint(&self) -> Pubkey {
        self.output_mint
    }

    pub fn amount_in(&self) -> u64 {
        self.amount_in
    }

    pub fn expected_out(&self) -> u64 {
        self.expected_out
    }

    pub fn min_amount_out(&self) -> u64 {
        self.min_amount_out
    }

    pub fn accounts(&self) -> &[AccountRef] {
        &self.accounts
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Content hash over program, ordered accounts and payload.
    pub fn hash(&self) -> Hash {
        let mut hasher = Hasher::default();
        hasher.hash(self.program_id.as_ref());
        for account in &self.accounts {
            hasher.hash(account.pubkey.as_ref());
            hasher.hash(&[account.is_signer as u8, account.is_writable as u8]);
        }
        hasher.hash(&self.payload);
        hasher.result()
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash().to_bytes())
    }

    pub fn to_instruction(&self) -> Instruction {
        Instruction {
            program_id: self.program_id,
            accounts: self.accounts.iter().copied().map(AccountMeta::from).collect(),
            data: self.payload.clone(),
        }
    }
}
