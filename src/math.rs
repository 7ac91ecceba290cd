// src/math.rs
//! Constant-product pricing in integer base units.

pub const BPS_DENOMINATOR: u64 = 10_000;

/// Fee-free constant-product output: `reserve_out * amount_in / (reserve_in + amount_in)`.
pub fn ideal_amount_out(amount_in: u64, reserve_in: u64, reserve_out: u64) -> u64 {
    if reserve_in == 0 || reserve_out == 0 || amount_in == 0 {
        return 0;
    }
    let numerator = reserve_out as u128 * amount_in as u128;
    let denominator = reserve_in as u128 + amount_in as u128;
    (numerator / denominator) as u64
}

/// Fee charged on the input side, rounded up the way the AMM program does.
pub fn swap_fee(amount_in: u64, fee_numerator: u64, fee_denominator: u64) -> u64 {
    if fee_numerator == 0 || fee_denominator == 0 {
        return 0;
    }
    let product = amount_in as u128 * fee_numerator as u128;
    let fee = product.div_ceil(fee_denominator as u128);
    fee.min(amount_in as u128) as u64
}

/// Output after the pool fee has been taken from the input.
pub fn amount_out_with_fee(
    amount_in: u64,
    reserve_in: u64,
    reserve_out: u64,
    fee_numerator: u64,
    fee_denominator: u64,
) -> u64 {
    let fee = swap_fee(amount_in, fee_numerator, fee_denominator);
    ideal_amount_out(amount_in - fee, reserve_in, reserve_out)
}

/// Minimum acceptable output for a slippage tolerance in basis points.
pub fn calculate_min_out(amount_out: u64, slippage_bps: u32) -> u64 {
    let slippage_bps = (slippage_bps as u64).min(BPS_DENOMINATOR);
    let scaled = amount_out as u128 * (BPS_DENOMINATOR - slippage_bps) as u128;
    (scaled / BPS_DENOMINATOR as u128) as u64
}

/// Smallest integer output satisfying `out >= ideal * (1 - slippage)`, where `ideal`
/// is the exact (unrounded) fee-free constant-product output.
pub fn slippage_bound(amount_in: u64, reserve_in: u64, reserve_out: u64, slippage_bps: u32) -> u64 {
    if reserve_in == 0 || reserve_out == 0 || amount_in == 0 {
        return 0;
    }
    let keep = BPS_DENOMINATOR - (slippage_bps as u64).min(BPS_DENOMINATOR);
    let numerator = reserve_out as u128 * amount_in as u128;
    let denominator = reserve_in as u128 + amount_in as u128;
    match (
        numerator.checked_mul(keep as u128),
        denominator.checked_mul(BPS_DENOMINATOR as u128),
    ) {
        (Some(num), Some(den)) => num.div_ceil(den) as u64,
        // only reachable with reserves near u64::MAX
        _ => calculate_min_out((numerator / denominator) as u64, slippage_bps),
    }
}

/// Price impact in basis points: how far the executed price sits below the spot
/// price, fee included. Computed from the exact constant-product output, so
/// small trades into deep pools are not inflated by integer rounding.
///
/// With `x` in, `f` the fee and `x' = x - f`, the executed/spot ratio is
/// `x' * R_in / (x * (R_in + x'))`, and the impact is one minus that. The output
/// reserve cancels out.
pub fn price_impact_bps(
    amount_in: u64,
    reserve_in: u64,
    fee_numerator: u64,
    fee_denominator: u64,
) -> u64 {
    if amount_in == 0 || reserve_in == 0 {
        return 0;
    }
    let fee = swap_fee(amount_in, fee_numerator, fee_denominator) as u128;
    let x = amount_in as u128;
    let x_eff = x - fee;
    let r_in = reserve_in as u128;

    let exact = (|| {
        let numerator = x.checked_mul(x_eff)?.checked_add(fee.checked_mul(r_in)?)?;
        let denominator = x.checked_mul(r_in + x_eff)?;
        Some(numerator.checked_mul(BPS_DENOMINATOR as u128)? / denominator)
    })();
    match exact {
        Some(bps) => bps.min(BPS_DENOMINATOR as u128) as u64,
        // only reachable with amounts near u64::MAX
        None => {
            let ratio = (x_eff as f64 * r_in as f64) / (x as f64 * (r_in + x_eff) as f64);
            ((1.0 - ratio) * BPS_DENOMINATOR as f64).clamp(0.0, BPS_DENOMINATOR as f64) as u64
        }
    }
}

/// Scale an amount by a ratio expressed in basis points.
pub fn scale_bps(amount: u64, ratio_bps: u32) -> u64 {
    (amount as u128 * ratio_bps as u128 / BPS_DENOMINATOR as u128).min(u64::MAX as u128) as u64
}
