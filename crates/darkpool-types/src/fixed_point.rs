//! Fixed-point price and volume encoding.
//!
//! Prices and volumes travel as `u64` integers scaled by
//! 10^[`PRICE_DECIMALS`] / 10^[`VOLUME_DECIMALS`] so that every node
//! computes identical settlement amounts. These helpers convert from and to
//! [`Decimal`] for human-readable entry and display.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::constants::{PRICE_DECIMALS, VOLUME_DECIMALS};

/// Encode a decimal with `decimals` places as a scaled `u64`.
///
/// Returns `None` for negative values, values with more precision than
/// `decimals`, or values that do not fit.
#[must_use]
pub fn decimal_to_fixed(value: Decimal, decimals: u32) -> Option<u64> {
    if value.is_sign_negative() {
        return None;
    }
    let scaled = value.checked_mul(Decimal::from(10u64.checked_pow(decimals)?))?;
    if scaled.fract() != Decimal::ZERO {
        return None;
    }
    scaled.to_u64()
}

/// Decode a scaled `u64` with `decimals` places.
#[must_use]
pub fn fixed_to_decimal(value: u64, decimals: u32) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(value), decimals)
}

/// Encode a human-readable price.
#[must_use]
pub fn price_from_decimal(price: Decimal) -> Option<u64> {
    decimal_to_fixed(price, PRICE_DECIMALS)
}

/// Encode a human-readable volume.
#[must_use]
pub fn volume_from_decimal(volume: Decimal) -> Option<u64> {
    decimal_to_fixed(volume, VOLUME_DECIMALS)
}
