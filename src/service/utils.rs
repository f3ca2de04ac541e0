//! Utilities for precise decimal arithmetic with U256 values
//!
//! Conversions between human-readable token amounts (Decimal) and on-chain
//! base units (U256). Both directions take the token's resolved decimals;
//! nothing here guesses a precision.

use alloy::primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use super::ServiceResult;
use super::error::OperationError;

/// Convert a human amount to base units, truncating toward zero.
///
/// # Arguments
/// * `amount` - Human amount (e.g., 1.5 for 1.5 USDC), must not be negative
/// * `decimals` - Token decimals (e.g., 6 for USDC, 18 for ETH)
///
/// # Returns
/// `amount * 10^decimals` with any digits past `decimals` dropped, so the
/// result never exceeds what the caller asked to spend
pub fn to_base_units(amount: Decimal, decimals: u8) -> ServiceResult<U256> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(OperationError::InvalidAmount(format!("negative amount {amount}")));
    }

    let truncated = amount.round_dp_with_strategy(decimals as u32, RoundingStrategy::ToZero);

    // mantissa * 10^(decimals - scale) is exact in U256, no Decimal overflow
    let mantissa = U256::from(truncated.mantissa().unsigned_abs());
    let missing_scale = (decimals as u32).saturating_sub(truncated.scale());

    Ok(mantissa * U256::from(10u64).pow(U256::from(missing_scale)))
}

/// Convert base units to a human amount.
///
/// # Arguments
/// * `value` - Raw on-chain amount
/// * `decimals` - Token decimals
///
/// # Returns
/// `value / 10^decimals`, normalized (e.g., 1.5 instead of 1.500000)
pub fn to_human_units(value: U256, decimals: u8) -> ServiceResult<Decimal> {
    let mut decimal = Decimal::from_str(&value.to_string()).map_err(|e| {
        OperationError::InvalidAmount(format!("{value} does not fit a decimal: {e}"))
    })?;

    decimal.set_scale(decimals as u32).map_err(|e| {
        OperationError::InvalidAmount(format!("unsupported token precision {decimals}: {e}"))
    })?;

    Ok(decimal.normalize())
}

/// Slippage is applied in millionths of the quote.
const SLIPPAGE_SCALE: u64 = 1_000_000;

/// Calculate minimum output amount with slippage tolerance
///
/// # Arguments
/// * `amount_out` - Expected output amount
/// * `slippage` - Slippage tolerance as a percentage (e.g., 0.5 for 0.5%),
///   clamped to 0..=100 and truncated to four decimal places
///
/// # Returns
/// Minimum acceptable output amount, rounded down
pub fn calculate_minimum_output(amount_out: U256, slippage: Decimal) -> U256 {
    let slippage = slippage.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
    // percent * 10^4 is millionths; always within 0..=SLIPPAGE_SCALE after the clamp
    let slippage_units = (slippage * Decimal::from(10_000)).trunc().to_u64().unwrap_or(0);
    let kept = U256::from(SLIPPAGE_SCALE - slippage_units.min(SLIPPAGE_SCALE));
    let scale = U256::from(SLIPPAGE_SCALE);

    match amount_out.checked_mul(kept) {
        Some(product) => product / scale,
        None => amount_out / scale * kept,
    }
}

/// Format balance from smallest unit to human-readable format
///
/// # Returns
/// Formatted balance as string with trailing zeros removed
pub fn format_balance(balance: U256, decimals: u8) -> String {
    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = balance / divisor;
    let remainder = balance % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let decimal_part = remainder.to_string();
        let padded = format!("{:0>width$}", decimal_part, width = decimals as usize);
        let trimmed = padded.trim_end_matches('0');
        if trimmed.is_empty() {
            whole.to_string()
        } else {
            format!("{whole}.{trimmed}")
        }
    }
}
