//! # Funded-Account Bootstrapper
//!
//! Ensures a recipient holds a usable balance of a token before a test runs.
//! The strategy comes from [`FundingStrategy::select`]:
//!
//! 1. **Owner mint**: impersonate the token owner, give it a gas stipend
//!    paid by the recipient, then either `mint(amount)` + `transfer` or
//!    `mint(recipient, amount)`.
//! 2. **Wrapped native**: nothing is minted. The recipient must already hold
//!    native currency it can wrap itself.
//! 3. **Pool join**: acquire every constituent recursively, approve the
//!    pool, and join with a slippage margin below the scarcest constituent.
//! 4. **Unsupported**: no calls, a warning, and [`Funding::Unsupported`].
//!
//! Calls run strictly in sequence. Later steps read balances produced by
//! earlier ones, so constituents are never acquired concurrently.

use crate::amount::{checked_product, default_acquisition_amount, resolve_amount, Amount, U256};
use crate::chain::{Chain, Impersonation, TokenHandle};
use crate::config::FundingConfig;
use crate::error::{BootstrapError, Result};
use crate::policy::{FundingStrategy, MintEntry};
use near_sdk::AccountId;
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info, warn};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a single acquisition did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Funding {
    /// The owner minted `amount` for the recipient.
    Minted { amount: Amount },
    /// Wrapped native currency; the recipient already holds what it needs.
    AlreadyFunded,
    /// Pool shares were requested with the given per-constituent caps.
    Joined {
        pool_amount_out: Amount,
        max_amounts_in: Vec<Amount>,
    },
    /// No strategy applies. The caller must fund the recipient some other way.
    Unsupported,
}

impl Funding {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Funding::Unsupported)
    }
}

pub struct Bootstrapper<'a, C: ?Sized> {
    chain: &'a C,
    config: &'a FundingConfig,
}

impl<'a, C: Chain + ?Sized> Bootstrapper<'a, C> {
    /// Binds a chain to a policy table.
    ///
    /// # Arguments
    ///
    /// * `chain` - Where every read, mint, approve and join is sent.
    /// * `config` - The network's rules. It is not re-validated here; configs
    ///   loaded from JSON were checked by [`FundingConfig::validate`] already.
    pub fn new(chain: &'a C, config: &'a FundingConfig) -> Self {
        Self { chain, config }
    }

    pub fn config(&self) -> &FundingConfig {
        self.config
    }

    /// Resolves a token handle using this network's pool-share symbol.
    pub async fn resolve(&self, address: &AccountId) -> Result<TokenHandle> {
        TokenHandle::resolve(self.chain, address, &self.config.pool_share_symbol).await
    }

    /// Funds `recipient` with `amount` of `token`, or the default amount when
    /// `amount` is `None` or zero.
    ///
    /// # Errors
    ///
    /// Any failed call aborts the acquisition; see [`BootstrapError`].
    pub async fn acquire(
        &self,
        token: &TokenHandle,
        recipient: &AccountId,
        amount: Option<Amount>,
    ) -> Result<Funding> {
        let mut path = BTreeSet::new();
        self.acquire_on_path(token, recipient, amount, &mut path)
            .await
    }

    /// Resolves `address` and funds `recipient` in one step.
    pub async fn acquire_address(
        &self,
        address: &AccountId,
        recipient: &AccountId,
        amount: Option<Amount>,
    ) -> Result<Funding> {
        let token = self.resolve(address).await?;
        self.acquire(&token, recipient, amount).await
    }

    // `path` holds the pools currently being expanded.
    fn acquire_on_path<'s>(
        &'s self,
        token: &'s TokenHandle,
        recipient: &'s AccountId,
        amount: Option<Amount>,
        path: &'s mut BTreeSet<AccountId>,
    ) -> BoxFuture<'s, Result<Funding>> {
        Box::pin(async move {
            let strategy = FundingStrategy::select(self.config, token);
            debug!(
                token = %token.address,
                symbol = %token.symbol,
                %recipient,
                %strategy,
                "selected funding strategy"
            );

            match strategy {
                FundingStrategy::OwnerMint(entry) => {
                    let amount =
                        resolve_amount(amount, token.decimals, self.config.scale_exponent)?;
                    self.mint_as_owner(token, recipient, amount, entry).await?;
                    Ok(Funding::Minted { amount })
                }
                FundingStrategy::WrappedNative => {
                    self.require_wrappable(token, recipient).await?;
                    Ok(Funding::AlreadyFunded)
                }
                FundingStrategy::PoolJoin => self.join_pool(token, recipient, path).await,
                FundingStrategy::Unsupported => {
                    warn!(
                        token = %token.address,
                        symbol = %token.symbol,
                        %recipient,
                        "no funding strategy for token; recipient left as is"
                    );
                    Ok(Funding::Unsupported)
                }
            }
        })
    }

    async fn mint_as_owner(
        &self,
        token: &TokenHandle,
        recipient: &AccountId,
        amount: Amount,
        entry: MintEntry,
    ) -> Result<()> {
        let owner = self.chain.owner(&token.address).await?;
        let grant = self.chain.impersonate(&owner).await?;

        let minted = self.mint_with_grant(&grant, token, recipient, amount, entry).await;
        let released = self.chain.stop_impersonating(grant).await;
        minted?;
        released?;

        info!(
            token = %token.address,
            %owner,
            %recipient,
            %amount,
            "minted tokens through owner"
        );
        Ok(())
    }

    async fn mint_with_grant(
        &self,
        grant: &Impersonation,
        token: &TokenHandle,
        recipient: &AccountId,
        amount: Amount,
        entry: MintEntry,
    ) -> Result<()> {
        let owner = grant.account();
        let stipend = self.config.gas_stipend();
        if stipend.as_yoctonear() > 0 {
            self.chain.send_native(recipient, owner, stipend).await?;
        }

        match entry {
            MintEntry::ToOwner => {
                self.chain.mint(owner, &token.address, amount).await?;
                self.chain
                    .transfer(owner, &token.address, recipient, amount)
                    .await
            }
            MintEntry::ToRecipient => {
                self.chain
                    .mint_to(owner, &token.address, recipient, amount)
                    .await
            }
        }
    }

    async fn require_wrappable(&self, token: &TokenHandle, recipient: &AccountId) -> Result<()> {
        let native = self.chain.native_balance(recipient).await?;
        if native.as_yoctonear() == 0 {
            return Err(BootstrapError::WrappedNativeUnfunded {
                token: token.address.clone(),
                recipient: recipient.clone(),
            });
        }
        debug!(token = %token.address, %recipient, %native, "recipient wraps its own native balance");
        Ok(())
    }

    async fn join_pool(
        &self,
        pool: &TokenHandle,
        recipient: &AccountId,
        path: &mut BTreeSet<AccountId>,
    ) -> Result<Funding> {
        if pool.constituents.is_empty() {
            return Err(BootstrapError::EmptyPool(pool.address.clone()));
        }
        if !path.insert(pool.address.clone()) {
            return Err(BootstrapError::CyclicComposition(pool.address.clone()));
        }

        let joined = self.join_on_path(pool, recipient, path).await;
        path.remove(&pool.address);
        joined
    }

    async fn join_on_path(
        &self,
        pool: &TokenHandle,
        recipient: &AccountId,
        path: &mut BTreeSet<AccountId>,
    ) -> Result<Funding> {
        let mut max_amounts_in = Vec::with_capacity(pool.constituents.len());
        let mut desired: Option<Amount> = None;

        for constituent in &pool.constituents {
            if path.contains(constituent) {
                return Err(BootstrapError::CyclicComposition(constituent.clone()));
            }

            let handle = self.resolve(constituent).await?;
            let amount = default_acquisition_amount(handle.decimals, self.config.scale_exponent)?;
            let funding = self
                .acquire_on_path(&handle, recipient, Some(amount), path)
                .await?;
            if funding.is_unsupported() {
                warn!(pool = %pool.address, %constituent, "constituent was not funded; join may fail");
            }

            // Reset first: some tokens reject a nonzero-to-nonzero allowance change.
            self.chain
                .approve(recipient, constituent, &pool.address, U256::zero())
                .await?;
            self.chain
                .approve(recipient, constituent, &pool.address, U256::MAX)
                .await?;
            max_amounts_in.push(amount);

            let supply = self.chain.total_supply(&pool.address).await?;
            let bound = checked_product(amount, supply)?;
            desired = Some(desired.map_or(bound, |current| current.min(bound)));
        }

        let desired = desired.ok_or_else(|| BootstrapError::EmptyPool(pool.address.clone()))?;
        let pool_amount_out = self.config.slippage.apply(desired)?;
        self.chain
            .join_pool(recipient, &pool.address, pool_amount_out, &max_amounts_in)
            .await?;

        info!(
            pool = %pool.address,
            %recipient,
            %pool_amount_out,
            constituents = max_amounts_in.len(),
            "joined pool"
        );
        Ok(Funding::Joined {
            pool_amount_out,
            max_amounts_in,
        })
    }
}
