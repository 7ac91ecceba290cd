use borsh::BorshSerialize;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;

use crate::exchanges::types::{AccountRef, PoolKeys};

/// Raydium AMM v4 instruction tag for `SwapBaseIn`.
pub const SWAP_BASE_IN_TAG: u8 = 9;

#[derive(BorshSerialize, Debug, Clone, Copy, PartialEq, Eq)]
struct SwapBaseIn {
    instruction: u8,
    amount_in: u64,
    minimum_amount_out: u64,
}

/// `[tag, amount_in: u64 le, minimum_amount_out: u64 le]`
pub fn swap_base_in_data(amount_in: u64, minimum_amount_out: u64) -> std::io::Result<Vec<u8>> {
    SwapBaseIn {
        instruction: SWAP_BASE_IN_TAG,
        amount_in,
        minimum_amount_out,
    }
    .try_to_vec()
}

/// Account list for `SwapBaseIn`, in the order the program reads them.
/// Direction is implied by which user token accounts are source and destination.
pub fn swap_base_in_accounts(
    keys: &PoolKeys,
    owner: &Pubkey,
    input_mint: &Pubkey,
    output_mint: &Pubkey,
) -> Vec<AccountRef> {
    let user_source = get_associated_token_address(owner, input_mint);
    let user_destination = get_associated_token_address(owner, output_mint);

    vec![
        AccountRef::readonly(spl_token::id()),
        AccountRef::writable(keys.amm),
        AccountRef::readonly(keys.authority),
        AccountRef::writable(keys.open_orders),
        AccountRef::writable(keys.target_orders),
        AccountRef::writable(keys.base_vault),
        AccountRef::writable(keys.quote_vault),
        AccountRef::readonly(keys.market_program),
        AccountRef::writable(keys.market),
        AccountRef::writable(keys.market_bids),
        AccountRef::writable(keys.market_asks),
        AccountRef::writable(keys.market_event_queue),
        AccountRef::writable(keys.market_base_vault),
        AccountRef::writable(keys.market_quote_vault),
        AccountRef::readonly(keys.market_vault_signer),
        AccountRef::writable(user_source),
        AccountRef::writable(user_destination),
        AccountRef::signer(*owner),
    ]
}
