//! # Chain Collaborators
//!
//! The bootstrapper only ever talks to deployed contracts through this
//! interface. Implementations decide what "signing as" an account means:
//! the in-memory [`crate::sim::SimChain`] tracks local and impersonated
//! accounts, the sandbox backend holds a keyring.
//!
//! Every mutating call names its sender explicitly. A call from an account
//! the environment cannot sign for fails like any other revert.

use crate::amount::Amount;
use crate::error::Result;
use async_trait::async_trait;
use near_sdk::{AccountId, NearToken};

/// Temporary authority to sign as `account`.
///
/// Returned by [`Chain::impersonate`] and handed back through
/// [`Chain::stop_impersonating`]; it is never stored past the calls it covers.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "impersonation must be released with `stop_impersonating`"]
pub struct Impersonation {
    account: AccountId,
}

impl Impersonation {
    /// Only chain implementations construct grants.
    pub fn granted(account: AccountId) -> Self {
        Self { account }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }
}

#[async_trait]
pub trait Chain: Send + Sync {
    // ==================== Token views ====================

    async fn decimals(&self, token: &AccountId) -> Result<u8>;

    async fn symbol(&self, token: &AccountId) -> Result<String>;

    async fn owner(&self, token: &AccountId) -> Result<AccountId>;

    async fn balance_of(&self, token: &AccountId, account: &AccountId) -> Result<Amount>;

    async fn total_supply(&self, token: &AccountId) -> Result<Amount>;

    /// Ordered constituent tokens of a pool-share token.
    async fn final_tokens(&self, pool: &AccountId) -> Result<Vec<AccountId>>;

    // ==================== Token calls ====================

    /// Single-argument mint: credits `from`, which must be the token owner.
    async fn mint(&self, from: &AccountId, token: &AccountId, amount: Amount) -> Result<()>;

    /// Two-argument mint: credits `recipient` directly.
    async fn mint_to(
        &self,
        from: &AccountId,
        token: &AccountId,
        recipient: &AccountId,
        amount: Amount,
    ) -> Result<()>;

    async fn transfer(
        &self,
        from: &AccountId,
        token: &AccountId,
        recipient: &AccountId,
        amount: Amount,
    ) -> Result<()>;

    async fn approve(
        &self,
        from: &AccountId,
        token: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<()>;

    /// Deposits constituents into `pool` in exchange for `pool_amount_out` shares.
    async fn join_pool(
        &self,
        from: &AccountId,
        pool: &AccountId,
        pool_amount_out: Amount,
        max_amounts_in: &[Amount],
    ) -> Result<()>;

    // ==================== Environment ====================

    async fn native_balance(&self, account: &AccountId) -> Result<NearToken>;

    async fn send_native(&self, from: &AccountId, to: &AccountId, amount: NearToken) -> Result<()>;

    async fn impersonate(&self, account: &AccountId) -> Result<Impersonation>;

    async fn stop_impersonating(&self, grant: Impersonation) -> Result<()>;

    // ==================== Composite ====================

    /// Impersonates the token owner for one two-argument mint.
    ///
    /// The grant is released whether or not the mint succeeds. When both
    /// fail, the mint error is returned.
    async fn mint_to_as_owner(
        &self,
        token: &AccountId,
        recipient: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        let owner = self.owner(token).await?;
        let grant = self.impersonate(&owner).await?;
        let minted = self.mint_to(&owner, token, recipient, amount).await;
        let released = self.stop_impersonating(grant).await;
        minted?;
        released
    }
}

/// A token resolved once from chain state and read-only afterward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenHandle {
    pub address: AccountId,
    pub decimals: u8,
    pub symbol: String,
    /// Underlying tokens, empty unless this is a pool-share token.
    pub constituents: Vec<AccountId>,
}

impl TokenHandle {
    /// Queries decimals and symbol, plus the constituent list when the symbol
    /// marks a pool-share token.
    pub async fn resolve<C: Chain + ?Sized>(
        chain: &C,
        address: &AccountId,
        pool_share_symbol: &str,
    ) -> Result<Self> {
        let decimals = chain.decimals(address).await?;
        let symbol = chain.symbol(address).await?;
        let constituents = if symbol == pool_share_symbol {
            chain.final_tokens(address).await?
        } else {
            Vec::new()
        };

        Ok(Self {
            address: address.clone(),
            decimals,
            symbol,
            constituents,
        })
    }

    pub fn is_pool_share(&self, pool_share_symbol: &str) -> bool {
        self.symbol == pool_share_symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::U256;
    use crate::error::BootstrapError;
    use crate::sim::{MintEntries, MockTokenSpec};
    use crate::test_utils::helpers::sim_with_account;

    #[tokio::test]
    async fn owner_mint_releases_grant() {
        let (sim, alice) = sim_with_account("alice");
        let owner = sim.external_account("owner").unwrap();
        let token = sim
            .deploy_token(
                &alice,
                MockTokenSpec::new("Dai", "DAI", 6)
                    .owner(owner.clone())
                    .mint_entries(MintEntries::TO_RECIPIENT),
            )
            .unwrap();

        sim.mint_to_as_owner(&token, &alice, U256::from(9u8)).await.unwrap();

        assert_eq!(sim.balance_of(&token, &alice).await.unwrap(), U256::from(9u8));
        assert!(!sim.is_impersonating(&owner));
    }

    #[tokio::test]
    async fn failed_owner_mint_still_releases_grant() {
        let (sim, alice) = sim_with_account("alice");
        let owner = sim.external_account("owner").unwrap();
        let token = sim
            .deploy_token(
                &alice,
                MockTokenSpec::new("Alpha", "ALPHA", 18)
                    .owner(owner.clone())
                    .mint_entries(MintEntries::TO_OWNER),
            )
            .unwrap();

        let err = sim
            .mint_to_as_owner(&token, &alice, U256::one())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BootstrapError::CallReverted { method: "mint_to", .. }
        ));
        assert!(!sim.is_impersonating(&owner));
    }
}
