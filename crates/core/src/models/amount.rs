//! Exact decimal conversions for on-chain amounts.

use rust_decimal::Decimal;

use crate::error::{DomainError, DomainResult};

/// Decimals of NU and ETH amounts.
pub const ETHER_DECIMALS: u32 = 18;

/// Convert a wei-denominated amount to a token-denominated decimal.
///
/// Fails instead of truncating when the amount does not fit the 96-bit
/// mantissa of [`Decimal`].
pub fn convert_to_decimal(wei: u128) -> DomainResult<Decimal> {
    scaled(wei, ETHER_DECIMALS)
}

/// Convert a raw integer amount (e.g. a fee rate in wei) to an unscaled decimal.
pub fn wei_to_decimal(wei: u128) -> DomainResult<Decimal> {
    scaled(wei, 0)
}

fn scaled(raw: u128, scale: u32) -> DomainResult<Decimal> {
    let signed = i128::try_from(raw)
        .map_err(|_| DomainError::ArithmeticOverflow(format!("amount {} exceeds i128", raw)))?;
    Decimal::try_from_i128_with_scale(signed, scale)
        .map(|d| d.normalize())
        .map_err(|e| {
            DomainError::ArithmeticOverflow(format!("amount {} (scale {}): {}", raw, scale, e))
        })
}

/// Checked decimal addition, naming the accumulator on overflow.
pub fn checked_add(current: Decimal, delta: Decimal, field: &str) -> DomainResult<Decimal> {
    current
        .checked_add(delta)
        .ok_or_else(|| DomainError::ArithmeticOverflow(format!("{} + {}", field, delta)))
}
