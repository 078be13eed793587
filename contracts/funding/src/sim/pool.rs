//! Weighted pool mocks: deployment parameters and the join-in quote.

use crate::amount::{Amount, U256};
use crate::config::DEFAULT_POOL_SHARE_SYMBOL;
use near_sdk::AccountId;

/// Deployment parameters for a weighted pool whose share token the chain also hosts.
#[derive(Clone, Debug)]
pub struct PoolSpec {
    pub symbol: String,
    pub decimals: u8,
    /// Ordered constituents and the reserve the pool starts with for each.
    pub reserves: Vec<(AccountId, Amount)>,
    pub initial_supply: Amount,
    /// Receives the initial shares. Defaults to the deployer.
    pub controller: Option<AccountId>,
}

impl PoolSpec {
    pub fn new(initial_supply: Amount) -> Self {
        Self {
            symbol: DEFAULT_POOL_SHARE_SYMBOL.to_string(),
            decimals: 18,
            reserves: Vec::new(),
            initial_supply,
            controller: None,
        }
    }

    pub fn reserve(mut self, token: AccountId, amount: Amount) -> Self {
        self.reserves.push((token, amount));
        self
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    pub fn controller(mut self, controller: AccountId) -> Self {
        self.controller = Some(controller);
        self
    }
}

/// Tokens a joiner must deposit for `pool_amount_out` shares:
/// `ceil(pool_amount_out * reserve / total_supply)`.
pub(crate) fn join_amount_in(
    pool_amount_out: Amount,
    reserve: Amount,
    total_supply: Amount,
) -> Result<Amount, String> {
    if total_supply.is_zero() {
        return Err("ERR_NOT_FINALIZED".to_string());
    }
    let numerator = pool_amount_out
        .checked_mul(reserve)
        .ok_or("ERR_MUL_OVERFLOW")?;
    let quotient = numerator / total_supply;
    let amount_in = if (numerator % total_supply).is_zero() {
        quotient
    } else {
        quotient + U256::one()
    };
    if amount_in.is_zero() {
        return Err("ERR_MATH_APPROX".to_string());
    }
    Ok(amount_in)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_in_is_proportional_and_rounds_up() {
        let supply = U256::from(100u8);
        assert_eq!(
            join_amount_in(U256::from(10u8), U256::from(1_000u32), supply).unwrap(),
            U256::from(100u8)
        );
        assert_eq!(
            join_amount_in(U256::from(1u8), U256::from(150u8), supply).unwrap(),
            U256::from(2u8)
        );
    }

    #[test]
    fn degenerate_joins_are_rejected() {
        assert_eq!(
            join_amount_in(U256::one(), U256::one(), U256::zero()).unwrap_err(),
            "ERR_NOT_FINALIZED"
        );
        assert_eq!(
            join_amount_in(U256::one(), U256::zero(), U256::one()).unwrap_err(),
            "ERR_MATH_APPROX"
        );
        assert_eq!(
            join_amount_in(U256::MAX, U256::from(2u8), U256::one()).unwrap_err(),
            "ERR_MUL_OVERFLOW"
        );
    }
}
