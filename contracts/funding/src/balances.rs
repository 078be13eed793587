//! Before/after balance snapshots for fixture assertions.

use crate::amount::{Amount, U256};
use crate::chain::Chain;
use crate::error::Result;
use near_sdk::AccountId;
use std::collections::BTreeMap;

/// Default tolerance of [`almost_equal`]: 1%.
pub const DEFAULT_TOLERANCE_BPS: u32 = 100;
const BPS_SCALE: u32 = 10_000;

/// Token balances of a fixed set of holders at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BalanceSheet {
    balances: BTreeMap<(AccountId, AccountId), Amount>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BalanceDelta {
    pub before: Amount,
    pub after: Amount,
}

impl BalanceDelta {
    pub fn gained(&self) -> Amount {
        self.after.saturating_sub(self.before)
    }

    pub fn lost(&self) -> Amount {
        self.before.saturating_sub(self.after)
    }
}

impl BalanceSheet {
    /// Reads the balance of every `(token, holder)` pair.
    pub async fn capture<C: Chain + ?Sized>(
        chain: &C,
        pairs: &[(AccountId, AccountId)],
    ) -> Result<Self> {
        let mut balances = BTreeMap::new();
        for (token, holder) in pairs {
            let balance = chain.balance_of(token, holder).await?;
            balances.insert((token.clone(), holder.clone()), balance);
        }
        Ok(Self { balances })
    }

    pub fn get(&self, token: &AccountId, holder: &AccountId) -> Option<Amount> {
        self.balances
            .get(&(token.clone(), holder.clone()))
            .copied()
    }

    /// Compares this sheet with a later one. Pairs missing from either side read as zero.
    pub fn delta(&self, later: &BalanceSheet, token: &AccountId, holder: &AccountId) -> BalanceDelta {
        BalanceDelta {
            before: self.get(token, holder).unwrap_or_else(U256::zero),
            after: later.get(token, holder).unwrap_or_else(U256::zero),
        }
    }
}

/// `true` when `actual` is within 1% of `expected`.
pub fn almost_equal(actual: Amount, expected: Amount) -> bool {
    almost_equal_within(actual, expected, DEFAULT_TOLERANCE_BPS)
}

/// `true` when `actual` is within `tolerance_bps` basis points of `expected`.
pub fn almost_equal_within(actual: Amount, expected: Amount, tolerance_bps: u32) -> bool {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    match (
        diff.checked_mul(U256::from(BPS_SCALE)),
        expected.checked_mul(U256::from(tolerance_bps)),
    ) {
        (Some(scaled_diff), Some(allowed)) => scaled_diff <= allowed,
        _ => diff <= (expected / U256::from(BPS_SCALE)).saturating_mul(U256::from(tolerance_bps)),
    }
}
