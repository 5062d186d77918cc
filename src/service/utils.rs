//! Utilities for precise decimal arithmetic with U256 values
//!
//! This module provides conversion between U256 (blockchain integers) and Decimal
//! for accurate financial calculations without floating-point precision loss.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use std::str::FromStr;

use super::ServiceResult;
use super::error::EngineError;

/// Basis points in 100%.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Largest scale a `Decimal` can carry, and so the most token decimals the engine handles.
pub const MAX_TOKEN_DECIMALS: u8 = 28;

/// Decimal places between wei and gwei.
const GWEI_SCALE: u32 = 9;

/// Convert U256 to Decimal with proper decimal scaling
///
/// The division by `10^decimals` is done by moving the decimal point, so it is
/// exact for every value that fits in a `Decimal` mantissa.
///
/// # Arguments
/// * `value` - The U256 value to convert
/// * `decimals` - Number of decimal places (e.g., 18 for ETH, 6 for USDC)
pub fn u256_to_decimal(value: U256, decimals: u8) -> ServiceResult<Decimal> {
    let mut decimal = Decimal::from_str(&value.to_string()).map_err(|e| {
        EngineError::InvalidAmount(format!("Failed to parse U256 to Decimal: {e}"))
    })?;

    decimal
        .set_scale(u32::from(decimals))
        .map_err(|e| EngineError::InvalidAmount(format!("Unsupported decimals {decimals}: {e}")))?;

    // Normalize to remove trailing zeros
    Ok(decimal.normalize())
}

/// Convert Decimal to U256 with proper decimal scaling
///
/// Digits beyond the token's precision are truncated, matching how wallets
/// round user input down to the smallest unit.
///
/// # Arguments
/// * `value` - The Decimal value to convert
/// * `decimals` - Number of decimal places to scale to
pub fn decimal_to_u256(value: Decimal, decimals: u8) -> ServiceResult<U256> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(EngineError::InvalidAmount(format!("Negative amount: {value}")));
    }

    let mantissa = U256::from(value.mantissa().unsigned_abs());
    let scale = value.scale();
    let decimals = u32::from(decimals);
    let ten = U256::from(10u64);

    let overflow = || EngineError::InvalidAmount(format!("Amount overflows U256: {value}"));

    let raw = if decimals >= scale {
        ten.checked_pow(U256::from(decimals - scale))
            .and_then(|factor| mantissa.checked_mul(factor))
            .ok_or_else(overflow)?
    } else {
        mantissa / ten.pow(U256::from(scale - decimals))
    };

    Ok(raw)
}

/// Format balance from smallest unit to human-readable format
///
/// # Arguments
/// * `balance` - Balance in smallest unit (e.g., wei for ETH)
/// * `decimals` - Number of decimal places for the token
///
/// # Returns
/// Formatted balance as string with trailing zeros removed
pub fn format_balance(balance: U256, decimals: u8) -> String {
    let Some(divisor) = U256::from(10u64).checked_pow(U256::from(decimals)) else {
        // Any U256 is below 10^decimals here.
        let padded = format!("{:0>width$}", balance.to_string(), width = decimals as usize);
        let trimmed = padded.trim_end_matches('0');
        return if trimmed.is_empty() {
            "0".to_string()
        } else {
            format!("0.{trimmed}")
        };
    };
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

/// Convert wei to gwei exactly. Saturates at `Decimal::MAX` for values no fee can reach.
pub fn wei_to_gwei(wei: u128) -> Decimal {
    i128::try_from(wei)
        .ok()
        .and_then(|wei| Decimal::try_from_i128_with_scale(wei, GWEI_SCALE).ok())
        .map(|gwei| gwei.normalize())
        .unwrap_or(Decimal::MAX)
}

/// Convert gwei to wei, rejecting fractions of a wei and negative values.
pub fn gwei_to_wei(gwei: Decimal) -> ServiceResult<u128> {
    let wei = decimal_to_u256(gwei, GWEI_SCALE as u8)?;
    if u256_to_decimal(wei, GWEI_SCALE as u8)? != gwei.normalize() {
        return Err(EngineError::InvalidAmount(format!(
            "{gwei} gwei is not a whole number of wei"
        )));
    }

    u128::try_from(wei).map_err(|e| EngineError::InvalidAmount(format!("{gwei} gwei: {e}")))
}

/// `amount * (10000 - slippage_bps) / 10000` in exact decimal arithmetic.
pub fn apply_slippage(amount: Decimal, slippage_bps: u32) -> ServiceResult<Decimal> {
    let keep = BPS_DENOMINATOR
        .checked_sub(slippage_bps)
        .ok_or(EngineError::InvalidSlippage(slippage_bps))?;

    amount
        .checked_mul(Decimal::from(keep))
        .and_then(|scaled| scaled.checked_div(Decimal::from(BPS_DENOMINATOR)))
        .map(|minimum| minimum.normalize())
        .ok_or_else(|| EngineError::InvalidAmount(format!("Amount overflows Decimal: {amount}")))
}

/// Raw counterpart of [`apply_slippage`], rounded down to the smallest unit.
pub fn apply_slippage_raw(amount: U256, slippage_bps: u32) -> U256 {
    let keep = U256::from(BPS_DENOMINATOR.saturating_sub(slippage_bps));
    let denominator = U256::from(BPS_DENOMINATOR);

    match amount.checked_mul(keep) {
        Some(scaled) => scaled / denominator,
        None => amount / denominator * keep,
    }
}

/// Output received per unit of input. `None` when the input is zero.
pub fn unit_price(amount_in: Decimal, amount_out: Decimal) -> Option<Decimal> {
    if amount_in.is_zero() {
        return None;
    }
    amount_out.checked_div(amount_in)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_to_decimal_eth_should_work() {
        // 1.5 ETH = 1500000000000000000 wei
        let wei = U256::from_str("1500000000000000000").unwrap();
        let eth = u256_to_decimal(wei, 18).unwrap();
        assert_eq!(eth.to_string(), "1.5"); // Decimal removes trailing zeros
    }

    #[test]
    fn test_u256_to_decimal_usdc_should_work() {
        // 1000.5 USDC = 1000500000 (6 decimals)
        let raw = U256::from(1000500000u64);
        let usdc = u256_to_decimal(raw, 6).unwrap();
        assert_eq!(usdc.to_string(), "1000.5");
    }

    #[test]
    fn test_u256_to_decimal_smallest_unit_is_exact() {
        let one_wei = u256_to_decimal(U256::from(1u64), 18).unwrap();
        assert_eq!(one_wei, Decimal::from_str("0.000000000000000001").unwrap());
    }

    #[test]
    fn test_decimal_to_u256_eth_should_work() {
        let eth = Decimal::from_str("1.5").unwrap();
        let wei = decimal_to_u256(eth, 18).unwrap();
        assert_eq!(wei, U256::from_str("1500000000000000000").unwrap());
    }

    #[test]
    fn test_decimal_to_u256_truncates_extra_precision() {
        let usdc = Decimal::from_str("100.1234567").unwrap();
        let raw = decimal_to_u256(usdc, 6).unwrap();
        assert_eq!(raw, U256::from(100123456u64));
    }

    #[test]
    fn test_decimal_to_u256_negative_should_fail() {
        let result = decimal_to_u256(Decimal::from(-1), 18);
        assert!(matches!(result, Err(EngineError::InvalidAmount(_))));
    }

    #[test]
    fn test_oversized_decimals_do_not_panic() {
        assert!(matches!(
            decimal_to_u256(Decimal::ONE, 80),
            Err(EngineError::InvalidAmount(_))
        ));
        assert!(matches!(
            u256_to_decimal(U256::from(1u64), MAX_TOKEN_DECIMALS + 1),
            Err(EngineError::InvalidAmount(_))
        ));
        assert_eq!(format_balance(U256::from(5u64), 80), format!("0.{}5", "0".repeat(79)));
    }

    #[test]
    fn test_format_balance_eth_should_work() {
        let wei = U256::from_str("1500000000000000000").unwrap();
        let formatted = format_balance(wei, 18);
        assert_eq!(formatted, "1.5");
    }

    #[test]
    fn test_format_balance_usdc_should_work() {
        let amount = U256::from(100500000u64);
        let formatted = format_balance(amount, 6);
        assert_eq!(formatted, "100.5");
    }

    #[test]
    fn test_format_balance_whole_number_should_work() {
        let wei = U256::from_str("1000000000000000000").unwrap();
        let formatted = format_balance(wei, 18);
        assert_eq!(formatted, "1");
    }

    #[test]
    fn test_wei_gwei_conversion_should_work() {
        assert_eq!(wei_to_gwei(30_500_000_000).to_string(), "30.5");
        assert_eq!(wei_to_gwei(1).to_string(), "0.000000001");
        assert_eq!(gwei_to_wei(Decimal::from_str("1.5").unwrap()).unwrap(), 1_500_000_000);
    }

    #[test]
    fn test_gwei_to_wei_rejects_sub_wei_fraction() {
        let result = gwei_to_wei(Decimal::from_str("0.0000000001").unwrap());
        assert!(matches!(result, Err(EngineError::InvalidAmount(_))));
    }

    #[test]
    fn test_apply_slippage_is_exact() {
        let output = Decimal::from_str("99.5").unwrap();
        let minimum = apply_slippage(output, 300).unwrap();

        assert_eq!(minimum, Decimal::from_str("96.515").unwrap());
        assert!(minimum <= output);
    }

    #[test]
    fn test_apply_slippage_bounds() {
        let output = Decimal::from_str("1234.5678").unwrap();

        assert_eq!(apply_slippage(output, 0).unwrap(), output);
        assert_eq!(apply_slippage(output, 10_000).unwrap(), Decimal::ZERO);
        assert!(matches!(
            apply_slippage(output, 10_001),
            Err(EngineError::InvalidSlippage(10_001))
        ));
    }

    #[test]
    fn test_apply_slippage_raw_rounds_down() {
        // 999 * 9950 / 10000 = 994.005
        assert_eq!(apply_slippage_raw(U256::from(999u64), 50), U256::from(994u64));
        let bps = U256::from(10_000u64);
        assert_eq!(apply_slippage_raw(U256::MAX, 0), U256::MAX / bps * bps);
    }

    #[test]
    fn test_unit_price_should_work() {
        let price = unit_price(Decimal::from(2), Decimal::from(4000)).unwrap();
        assert_eq!(price, Decimal::from(2000));
        assert_eq!(unit_price(Decimal::ZERO, Decimal::ONE), None);
    }
}
