//! # Amount Arithmetic
//!
//! Token quantities are carried as 256-bit integers. Default acquisition
//! amounts for high-precision tokens (`10^12 * 10^18`) multiplied by a pool's
//! total supply routinely exceed 128 bits, so every multiplication here is
//! checked and reports [`BootstrapError::AmountOverflow`] instead of wrapping.

use crate::error::{BootstrapError, Result};
use serde::{Deserialize, Serialize};

mod u256 {
    uint::construct_uint! {
        pub struct U256(4);
    }
}

pub use u256::U256;

/// A token quantity in the token's base unit.
pub type Amount = U256;

/// Default acquisition is `10^12` whole tokens.
pub const DEFAULT_SCALE_EXPONENT: u32 = 12;

/// Computes `10^exponent`, failing if it does not fit in 256 bits.
pub fn pow10(exponent: u32) -> Result<Amount> {
    let ten = U256::from(10u8);
    (0..exponent)
        .try_fold(U256::one(), |acc, _| acc.checked_mul(ten))
        .ok_or_else(|| BootstrapError::AmountOverflow(format!("10^{exponent} exceeds 256 bits")))
}

/// Returns `10^scale_exponent * 10^decimals`.
///
/// # Example
///
/// ```
/// use funded_accounts::amount::{default_acquisition_amount, U256};
///
/// let amount = default_acquisition_amount(6, 12).unwrap();
/// assert_eq!(amount, U256::from(10u128.pow(18)));
/// ```
pub fn default_acquisition_amount(decimals: u8, scale_exponent: u32) -> Result<Amount> {
    let exponent = scale_exponent
        .checked_add(u32::from(decimals))
        .ok_or_else(|| {
            BootstrapError::AmountOverflow(format!(
                "10^{scale_exponent} * 10^{decimals} exceeds 256 bits"
            ))
        })?;
    pow10(exponent)
}

/// Picks the caller's amount, falling back to the default when it is absent or zero.
pub fn resolve_amount(
    requested: Option<Amount>,
    decimals: u8,
    scale_exponent: u32,
) -> Result<Amount> {
    match requested {
        Some(amount) if !amount.is_zero() => Ok(amount),
        _ => default_acquisition_amount(decimals, scale_exponent),
    }
}

/// Multiplies two amounts, naming the operands in the overflow error.
pub fn checked_product(lhs: Amount, rhs: Amount) -> Result<Amount> {
    lhs.checked_mul(rhs)
        .ok_or_else(|| BootstrapError::AmountOverflow(format!("{lhs} * {rhs} exceeds 256 bits")))
}

/// Narrows an amount for ledgers that store 128-bit balances.
pub fn to_u128(amount: Amount) -> Result<u128> {
    if amount > U256::from(u128::MAX) {
        return Err(BootstrapError::AmountOverflow(format!(
            "{amount} does not fit in 128 bits"
        )));
    }
    Ok(amount.low_u128())
}

/// A deliberate under-request, expressed as a fraction of the computed ideal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margin {
    pub numerator: u32,
    pub denominator: u32,
}

impl Default for Margin {
    /// Ninety percent of the ideal amount.
    fn default() -> Self {
        Self {
            numerator: 9,
            denominator: 10,
        }
    }
}

impl Margin {
    pub fn validate(&self) -> Result<()> {
        if self.denominator == 0 {
            return Err(BootstrapError::Config(
                "slippage denominator must be nonzero".to_string(),
            ));
        }
        if self.numerator > self.denominator {
            return Err(BootstrapError::Config(format!(
                "slippage {}/{} would request more than the computed amount",
                self.numerator, self.denominator
            )));
        }
        Ok(())
    }

    /// Returns `amount * numerator / denominator`, rounded down.
    pub fn apply(&self, amount: Amount) -> Result<Amount> {
        self.validate()?;
        let scaled = checked_product(amount, U256::from(self.numerator))?;
        Ok(scaled / U256::from(self.denominator))
    }
}
