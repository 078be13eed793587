//! Mock token ledgers held by the simulated chain.
//!
//! A pool-share token is an ordinary ledger flagged as a pool, with a
//! constituent list; the pool's reserves live in the constituents' ledgers
//! under the pool's own address.

use crate::amount::{Amount, U256};
use crate::registry::ContractName;
use near_sdk::AccountId;
use std::collections::BTreeMap;

/// Which mint entry points a mock token exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MintEntries {
    pub to_owner: bool,
    pub to_recipient: bool,
}

impl MintEntries {
    pub const BOTH: Self = Self {
        to_owner: true,
        to_recipient: true,
    };
    pub const TO_OWNER: Self = Self {
        to_owner: true,
        to_recipient: false,
    };
    pub const TO_RECIPIENT: Self = Self {
        to_owner: false,
        to_recipient: true,
    };
    pub const NONE: Self = Self {
        to_owner: false,
        to_recipient: false,
    };
}

/// Deployment parameters for a mock fungible token.
///
/// # Example
///
/// ```
/// use funded_accounts::sim::{MintEntries, MockTokenSpec};
///
/// let spec = MockTokenSpec::new("Alpha Finance", "ALPHA", 18)
///     .mint_entries(MintEntries::TO_OWNER)
///     .strict_approve();
/// assert_eq!(spec.symbol, "ALPHA");
/// ```
#[derive(Clone, Debug)]
pub struct MockTokenSpec {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Defaults to the deployer.
    pub owner: Option<AccountId>,
    pub entries: MintEntries,
    /// Reject allowance changes from one nonzero value to another.
    pub strict_approve: bool,
    pub holders: Vec<(AccountId, Amount)>,
    pub contract: ContractName,
}

impl MockTokenSpec {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            decimals,
            owner: None,
            entries: MintEntries::BOTH,
            strict_approve: false,
            holders: Vec::new(),
            contract: ContractName::MockErc20,
        }
    }

    pub fn owner(mut self, owner: AccountId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn mint_entries(mut self, entries: MintEntries) -> Self {
        self.entries = entries;
        self
    }

    pub fn strict_approve(mut self) -> Self {
        self.strict_approve = true;
        self
    }

    pub fn holder(mut self, account: AccountId, amount: Amount) -> Self {
        self.holders.push((account, amount));
        self
    }

    pub fn contract(mut self, contract: ContractName) -> Self {
        self.contract = contract;
        self
    }
}

#[derive(Clone, Debug)]
pub(crate) struct MockToken {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub owner: AccountId,
    pub entries: MintEntries,
    pub strict_approve: bool,
    pub total_supply: Amount,
    /// Set for pool-share tokens, which may still report no constituents.
    pub pool: bool,
    pub constituents: Vec<AccountId>,
    balances: BTreeMap<AccountId, Amount>,
    allowances: BTreeMap<(AccountId, AccountId), Amount>,
}

impl MockToken {
    pub fn from_spec(spec: &MockTokenSpec, owner: AccountId) -> Self {
        Self {
            name: spec.name.clone(),
            symbol: spec.symbol.clone(),
            decimals: spec.decimals,
            owner,
            entries: spec.entries,
            strict_approve: spec.strict_approve,
            total_supply: U256::zero(),
            pool: false,
            constituents: Vec::new(),
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
        }
    }

    pub fn is_pool(&self) -> bool {
        self.pool
    }

    pub fn balance(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or_else(U256::zero)
    }

    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or_else(U256::zero)
    }

    pub fn mint(&mut self, account: &AccountId, amount: Amount) -> Result<(), String> {
        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or("total supply overflow")?;
        let balance = self.balance(account);
        // Cannot overflow: every balance is bounded by the total supply.
        self.balances.insert(account.clone(), balance + amount);
        Ok(())
    }

    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), String> {
        let from_balance = self.balance(from);
        let remaining = from_balance
            .checked_sub(amount)
            .ok_or_else(|| format!("transfer amount exceeds balance ({from_balance} < {amount})"))?;
        self.balances.insert(from.clone(), remaining);
        let to_balance = self.balance(to);
        self.balances.insert(to.clone(), to_balance + amount);
        Ok(())
    }

    pub fn approve(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<(), String> {
        if self.strict_approve && !amount.is_zero() && !self.allowance(owner, spender).is_zero() {
            return Err("approve from non-zero to non-zero allowance".to_string());
        }
        self.allowances
            .insert((owner.clone(), spender.clone()), amount);
        Ok(())
    }

    /// An allowance of `U256::MAX` is never decreased.
    pub fn spend_allowance(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<(), String> {
        let current = self.allowance(owner, spender);
        if current == U256::MAX {
            return Ok(());
        }
        let remaining = current
            .checked_sub(amount)
            .ok_or_else(|| format!("insufficient allowance ({current} < {amount})"))?;
        self.allowances
            .insert((owner.clone(), spender.clone()), remaining);
        Ok(())
    }
}
