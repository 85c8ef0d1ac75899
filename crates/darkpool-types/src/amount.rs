//! Token amounts and checked arithmetic.
//!
//! Amounts are unsigned 256-bit integers in token base units, matching the
//! ERC20 balance model. Every operation is checked; overflow and underflow
//! surface as errors rather than wrapping.

use crate::{DarkpoolError, Result, constants};

pub use primitive_types::U256;

/// A token amount in base units.
pub type Amount = U256;

/// `a + b`, failing on overflow.
pub fn checked_add(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_add(b).ok_or(DarkpoolError::ArithmeticOverflow)
}

/// `a - b`, failing with [`DarkpoolError::InsufficientBalance`] on underflow.
pub fn checked_sub(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_sub(b).ok_or(DarkpoolError::InsufficientBalance {
        needed: b,
        available: a,
    })
}

/// `floor(a * numerator / denominator)`, failing on overflow or a zero denominator.
pub fn mul_div(a: Amount, numerator: Amount, denominator: Amount) -> Result<Amount> {
    if denominator.is_zero() {
        return Err(DarkpoolError::ArithmeticOverflow);
    }
    a.checked_mul(numerator)
        .ok_or(DarkpoolError::ArithmeticOverflow)
        .map(|product| product / denominator)
}

/// `10^exp` as an amount.
pub fn pow10(exp: u32) -> Result<Amount> {
    Amount::from(10u64)
        .checked_pow(Amount::from(exp))
        .ok_or(DarkpoolError::ArithmeticOverflow)
}

/// Split a leg volume into `(net, fee)` at the darknode fee rate.
///
/// `fee = floor(volume * N / D)` and `net = volume - fee`, so
/// `net + fee == volume` exactly.
pub fn darknode_fee_split(volume: Amount) -> Result<(Amount, Amount)> {
    let fee = mul_div(
        volume,
        Amount::from(constants::DARKNODE_FEES_NUMERATOR),
        Amount::from(constants::DARKNODE_FEES_DENOMINATOR),
    )?;
    Ok((volume - fee, fee))
}
