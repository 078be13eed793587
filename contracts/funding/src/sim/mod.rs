//! # Simulated Chain
//!
//! An ephemeral, in-memory chain for fixture tests. It hosts mock tokens and
//! weighted pools, tracks native balances, and models signing authority:
//!
//! - **Local** accounts (from [`SimChain::create_account`]) can always sign.
//! - **External** accounts (from [`SimChain::external_account`]) hold no key
//!   and can only sign while impersonated.
//!
//! Every mutating call runs against a draft of the state that is committed
//! only when the call succeeds, so a revert leaves no partial effects.
//! Committed calls are appended to a call log for assertions.

mod pool;
mod token;

pub use pool::PoolSpec;
use pool::join_amount_in;
pub use token::{MintEntries, MockTokenSpec};

use crate::amount::Amount;
use crate::chain::{Chain, Impersonation};
use crate::error::{BootstrapError, Result};
use crate::registry::ContractName;
use async_trait::async_trait;
use near_sdk::{AccountId, NearToken};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use token::MockToken;
use tracing::debug;

/// Native balance given to every local account: 10,000 units of an 18-decimal currency.
pub const DEFAULT_ACCOUNT_BALANCE: NearToken =
    NearToken::from_yoctonear(10_000 * 1_000_000_000_000_000_000);

/// A state-changing call that was committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRecord {
    pub from: AccountId,
    /// The called contract, or the receiver of a native transfer.
    pub contract: AccountId,
    pub call: Call,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Mint {
        amount: Amount,
    },
    MintTo {
        recipient: AccountId,
        amount: Amount,
    },
    Transfer {
        recipient: AccountId,
        amount: Amount,
    },
    Approve {
        spender: AccountId,
        amount: Amount,
    },
    JoinPool {
        pool_amount_out: Amount,
        max_amounts_in: Vec<Amount>,
    },
    SendNative {
        amount: NearToken,
    },
}

/// Identifies a state captured by [`SimChain::snapshot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotId(usize);

#[derive(Clone, Debug, Default)]
struct SimState {
    native: BTreeMap<AccountId, u128>,
    local: BTreeSet<AccountId>,
    external: BTreeSet<AccountId>,
    impersonated: BTreeSet<AccountId>,
    impersonation_disabled: bool,
    tokens: BTreeMap<AccountId, MockToken>,
    code: BTreeMap<AccountId, ContractName>,
    calls: Vec<CallRecord>,
    nonce: u64,
}

#[derive(Default)]
pub struct SimChain {
    state: Mutex<SimState>,
    snapshots: Mutex<Vec<SimState>>,
}

fn derive_address(seed: &[u8]) -> Result<AccountId> {
    let digest = Sha256::digest(seed);
    format!("0x{}", hex::encode(&digest[..20]))
        .parse()
        .map_err(|e| BootstrapError::Config(format!("derived address: {e}")))
}

impl SimState {
    fn token(&self, address: &AccountId, method: &'static str) -> Result<&MockToken> {
        self.tokens
            .get(address)
            .ok_or_else(|| BootstrapError::reverted(address, method, "no contract code at address"))
    }

    fn token_mut(&mut self, address: &AccountId, method: &'static str) -> Result<&mut MockToken> {
        self.tokens
            .get_mut(address)
            .ok_or_else(|| BootstrapError::reverted(address, method, "no contract code at address"))
    }

    fn can_sign(&self, account: &AccountId) -> bool {
        self.local.contains(account) || self.impersonated.contains(account)
    }

    fn ensure_signer(
        &self,
        from: &AccountId,
        contract: &AccountId,
        method: &'static str,
    ) -> Result<()> {
        if self.can_sign(from) {
            Ok(())
        } else {
            Err(BootstrapError::reverted(
                contract,
                method,
                format!("sender `{from}` has no signing key"),
            ))
        }
    }

    fn record(&mut self, from: &AccountId, contract: &AccountId, call: Call) {
        self.calls.push(CallRecord {
            from: from.clone(),
            contract: contract.clone(),
            call,
        });
    }

    fn next_contract_address(&mut self, deployer: &AccountId) -> Result<AccountId> {
        let mut seed = deployer.as_bytes().to_vec();
        seed.extend_from_slice(&self.nonce.to_be_bytes());
        self.nonce += 1;
        derive_address(&seed)
    }

    fn join_pool(
        &mut self,
        from: &AccountId,
        pool: &AccountId,
        pool_amount_out: Amount,
        max_amounts_in: &[Amount],
    ) -> Result<()> {
        let revert = |reason: String| BootstrapError::reverted(pool, "join_pool", reason);

        let (constituents, supply) = {
            let share = self.token(pool, "join_pool")?;
            if !share.is_pool() {
                return Err(revert("not a pool".to_string()));
            }
            (share.constituents.clone(), share.total_supply)
        };
        if constituents.len() != max_amounts_in.len() {
            return Err(revert("ERR_LENGTH_MISMATCH".to_string()));
        }

        for (constituent, max_in) in constituents.iter().zip(max_amounts_in) {
            let token = self.token_mut(constituent, "join_pool")?;
            let amount_in = join_amount_in(pool_amount_out, token.balance(pool), supply)
                .map_err(&revert)?;
            if amount_in > *max_in {
                return Err(revert(format!("ERR_LIMIT_IN ({amount_in} > {max_in})")));
            }
            token
                .spend_allowance(from, pool, amount_in)
                .map_err(|e| revert(format!("ERR_BTOKEN_BAD_CALLER: {e}")))?;
            token
                .transfer(from, pool, amount_in)
                .map_err(|e| revert(format!("ERR_INSUFFICIENT_BAL: {e}")))?;
        }

        self.token_mut(pool, "join_pool")?
            .mint(from, pool_amount_out)
            .map_err(revert)
    }
}

impl SimChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `apply` on a draft and commits it only on success.
    fn transact<T>(&self, apply: impl FnOnce(&mut SimState) -> Result<T>) -> Result<T> {
        let mut state = self.lock();
        let mut draft = state.clone();
        let out = apply(&mut draft)?;
        *state = draft;
        Ok(out)
    }

    /// Creates a local account funded with [`DEFAULT_ACCOUNT_BALANCE`].
    pub fn create_account(&self, name: &str) -> Result<AccountId> {
        let account = derive_address(format!("account:{name}").as_bytes())?;
        let mut state = self.lock();
        state.local.insert(account.clone());
        state
            .native
            .insert(account.clone(), DEFAULT_ACCOUNT_BALANCE.as_yoctonear());
        debug!(%account, name, "created local account");
        Ok(account)
    }

    /// Registers a keyless account that can only act while impersonated.
    pub fn external_account(&self, name: &str) -> Result<AccountId> {
        let account = derive_address(format!("external:{name}").as_bytes())?;
        self.lock().external.insert(account.clone());
        Ok(account)
    }

    pub fn deploy_token(&self, deployer: &AccountId, spec: MockTokenSpec) -> Result<AccountId> {
        self.transact(|state| {
            let address = state.next_contract_address(deployer)?;
            state.ensure_signer(deployer, &address, "deploy")?;

            let owner = spec.owner.clone().unwrap_or_else(|| deployer.clone());
            let mut token = MockToken::from_spec(&spec, owner);
            for (holder, amount) in &spec.holders {
                token
                    .mint(holder, *amount)
                    .map_err(|e| BootstrapError::reverted(&address, "deploy", e))?;
            }
            state.tokens.insert(address.clone(), token);
            state.code.insert(address.clone(), spec.contract);
            debug!(%address, symbol = %spec.symbol, decimals = spec.decimals, "deployed mock token");
            Ok(address)
        })
    }

    /// Deploys a pool, seeding each reserve into the pool's constituent balances.
    pub fn deploy_pool(&self, deployer: &AccountId, spec: PoolSpec) -> Result<AccountId> {
        self.transact(|state| {
            let address = state.next_contract_address(deployer)?;
            state.ensure_signer(deployer, &address, "deploy")?;

            let mut constituents = Vec::with_capacity(spec.reserves.len());
            for (constituent, reserve) in &spec.reserves {
                state
                    .token_mut(constituent, "bind")?
                    .mint(&address, *reserve)
                    .map_err(|e| BootstrapError::reverted(constituent, "bind", e))?;
                constituents.push(constituent.clone());
            }

            let share_spec = MockTokenSpec::new("Balancer Pool Token", spec.symbol.clone(), spec.decimals)
                .mint_entries(MintEntries::NONE)
                .contract(ContractName::IBalancerPool);
            let mut share = MockToken::from_spec(&share_spec, deployer.clone());
            share.pool = true;
            share.constituents = constituents;
            let controller = spec.controller.clone().unwrap_or_else(|| deployer.clone());
            share
                .mint(&controller, spec.initial_supply)
                .map_err(|e| BootstrapError::reverted(&address, "deploy", e))?;

            state.tokens.insert(address.clone(), share);
            state.code.insert(address.clone(), ContractName::IBalancerPool);
            debug!(%address, reserves = spec.reserves.len(), "deployed weighted pool");
            Ok(address)
        })
    }

    /// Replaces a pool's reported constituents, e.g. to model a malformed pool.
    pub fn override_final_tokens(&self, pool: &AccountId, tokens: Vec<AccountId>) -> Result<()> {
        self.transact(|state| {
            state.token_mut(pool, "get_final_tokens")?.constituents = tokens;
            Ok(())
        })
    }

    pub fn set_native_balance(&self, account: &AccountId, balance: NearToken) {
        self.lock()
            .native
            .insert(account.clone(), balance.as_yoctonear());
    }

    /// With impersonation disabled, [`Chain::impersonate`] fails with
    /// [`BootstrapError::ImpersonationDenied`].
    pub fn set_impersonation_enabled(&self, enabled: bool) {
        self.lock().impersonation_disabled = !enabled;
    }

    pub fn is_impersonating(&self, account: &AccountId) -> bool {
        self.lock().impersonated.contains(account)
    }

    pub fn code_at(&self, address: &AccountId) -> Option<ContractName> {
        self.lock().code.get(address).copied()
    }

    pub fn allowance(
        &self,
        token: &AccountId,
        owner: &AccountId,
        spender: &AccountId,
    ) -> Result<Amount> {
        Ok(self.lock().token(token, "allowance")?.allowance(owner, spender))
    }

    /// The `name` a deployed token reports; errors for accounts without token code.
    pub fn token_name(&self, token: &AccountId) -> Result<String> {
        Ok(self.lock().token(token, "name")?.name.clone())
    }

    /// Committed state-changing calls, oldest first.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.lock().calls.clone()
    }

    pub fn snapshot(&self) -> SnapshotId {
        let state = self.lock().clone();
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.push(state);
        SnapshotId(snapshots.len() - 1)
    }

    /// Restores a snapshot, discarding it and every later one.
    pub fn revert(&self, id: SnapshotId) -> Result<()> {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        if id.0 >= snapshots.len() {
            return Err(BootstrapError::Config(format!("unknown snapshot {}", id.0)));
        }
        let restored = snapshots.swap_remove(id.0);
        snapshots.truncate(id.0);
        *self.lock() = restored;
        Ok(())
    }
}

#[async_trait]
impl Chain for SimChain {
    async fn decimals(&self, token: &AccountId) -> Result<u8> {
        Ok(self.lock().token(token, "decimals")?.decimals)
    }

    async fn symbol(&self, token: &AccountId) -> Result<String> {
        Ok(self.lock().token(token, "symbol")?.symbol.clone())
    }

    async fn owner(&self, token: &AccountId) -> Result<AccountId> {
        Ok(self.lock().token(token, "owner")?.owner.clone())
    }

    async fn balance_of(&self, token: &AccountId, account: &AccountId) -> Result<Amount> {
        Ok(self.lock().token(token, "balance_of")?.balance(account))
    }

    async fn total_supply(&self, token: &AccountId) -> Result<Amount> {
        Ok(self.lock().token(token, "total_supply")?.total_supply)
    }

    async fn final_tokens(&self, pool: &AccountId) -> Result<Vec<AccountId>> {
        let state = self.lock();
        let share = state.token(pool, "get_final_tokens")?;
        if !share.is_pool() {
            return Err(BootstrapError::reverted(pool, "get_final_tokens", "not a pool"));
        }
        Ok(share.constituents.clone())
    }

    async fn mint(&self, from: &AccountId, token: &AccountId, amount: Amount) -> Result<()> {
        self.transact(|state| {
            state.ensure_signer(from, token, "mint")?;
            let ledger = state.token_mut(token, "mint")?;
            if !ledger.entries.to_owner {
                return Err(BootstrapError::reverted(token, "mint", "mint(amount) not implemented"));
            }
            if ledger.owner != *from {
                return Err(BootstrapError::reverted(token, "mint", "caller is not the owner"));
            }
            ledger
                .mint(from, amount)
                .map_err(|e| BootstrapError::reverted(token, "mint", e))?;
            state.record(from, token, Call::Mint { amount });
            Ok(())
        })
    }

    async fn mint_to(
        &self,
        from: &AccountId,
        token: &AccountId,
        recipient: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.transact(|state| {
            state.ensure_signer(from, token, "mint_to")?;
            let ledger = state.token_mut(token, "mint_to")?;
            if !ledger.entries.to_recipient {
                return Err(BootstrapError::reverted(
                    token,
                    "mint_to",
                    "mint(recipient, amount) not implemented",
                ));
            }
            if ledger.owner != *from {
                return Err(BootstrapError::reverted(token, "mint_to", "caller is not the owner"));
            }
            ledger
                .mint(recipient, amount)
                .map_err(|e| BootstrapError::reverted(token, "mint_to", e))?;
            state.record(
                from,
                token,
                Call::MintTo {
                    recipient: recipient.clone(),
                    amount,
                },
            );
            Ok(())
        })
    }

    async fn transfer(
        &self,
        from: &AccountId,
        token: &AccountId,
        recipient: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.transact(|state| {
            state.ensure_signer(from, token, "transfer")?;
            state
                .token_mut(token, "transfer")?
                .transfer(from, recipient, amount)
                .map_err(|e| BootstrapError::reverted(token, "transfer", e))?;
            state.record(
                from,
                token,
                Call::Transfer {
                    recipient: recipient.clone(),
                    amount,
                },
            );
            Ok(())
        })
    }

    async fn approve(
        &self,
        from: &AccountId,
        token: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.transact(|state| {
            state.ensure_signer(from, token, "approve")?;
            state
                .token_mut(token, "approve")?
                .approve(from, spender, amount)
                .map_err(|e| BootstrapError::reverted(token, "approve", e))?;
            state.record(
                from,
                token,
                Call::Approve {
                    spender: spender.clone(),
                    amount,
                },
            );
            Ok(())
        })
    }

    async fn join_pool(
        &self,
        from: &AccountId,
        pool: &AccountId,
        pool_amount_out: Amount,
        max_amounts_in: &[Amount],
    ) -> Result<()> {
        self.transact(|state| {
            state.ensure_signer(from, pool, "join_pool")?;
            state.join_pool(from, pool, pool_amount_out, max_amounts_in)?;
            state.record(
                from,
                pool,
                Call::JoinPool {
                    pool_amount_out,
                    max_amounts_in: max_amounts_in.to_vec(),
                },
            );
            Ok(())
        })
    }

    async fn native_balance(&self, account: &AccountId) -> Result<NearToken> {
        let yocto = self.lock().native.get(account).copied().unwrap_or(0);
        Ok(NearToken::from_yoctonear(yocto))
    }

    async fn send_native(&self, from: &AccountId, to: &AccountId, amount: NearToken) -> Result<()> {
        self.transact(|state| {
            state.ensure_signer(from, to, "send_native")?;
            let value = amount.as_yoctonear();
            let available = state.native.get(from).copied().unwrap_or(0);
            let remaining = available.checked_sub(value).ok_or_else(|| {
                BootstrapError::reverted(
                    to,
                    "send_native",
                    format!("sender `{from}` doesn't have enough funds to send tx"),
                )
            })?;
            state.native.insert(from.clone(), remaining);
            let credited = state.native.get(to).copied().unwrap_or(0).saturating_add(value);
            state.native.insert(to.clone(), credited);
            state.record(from, to, Call::SendNative { amount });
            Ok(())
        })
    }

    async fn impersonate(&self, account: &AccountId) -> Result<Impersonation> {
        let mut state = self.lock();
        if state.impersonation_disabled {
            return Err(BootstrapError::ImpersonationDenied(account.clone()));
        }
        state.impersonated.insert(account.clone());
        debug!(%account, "impersonating");
        Ok(Impersonation::granted(account.clone()))
    }

    async fn stop_impersonating(&self, grant: Impersonation) -> Result<()> {
        self.lock().impersonated.remove(grant.account());
        debug!(account = %grant.account(), "stopped impersonating");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::U256;
    use crate::test_utils::helpers::{sim_with_account, units};

    #[tokio::test]
    async fn reverted_calls_leave_no_trace() {
        let (sim, alice) = sim_with_account("alice");
        let bob = sim.create_account("bob").unwrap();
        let token = sim
            .deploy_token(
                &alice,
                MockTokenSpec::new("Dai", "DAI", 18).holder(alice.clone(), units(5, 18)),
            )
            .unwrap();

        let before = sim.calls().len();
        let err = sim
            .transfer(&alice, &token, &bob, units(6, 18))
            .await
            .unwrap_err();
        assert!(err.revert_reason().unwrap().contains("exceeds balance"));
        assert_eq!(sim.calls().len(), before);
        assert_eq!(sim.balance_of(&token, &alice).await.unwrap(), units(5, 18));
    }

    #[tokio::test]
    async fn external_accounts_sign_only_while_impersonated() {
        let (sim, alice) = sim_with_account("alice");
        let treasury = sim.external_account("treasury").unwrap();
        let token = sim
            .deploy_token(
                &alice,
                MockTokenSpec::new("Alpha", "ALPHA", 18).holder(treasury.clone(), units(1, 18)),
            )
            .unwrap();

        assert!(sim
            .transfer(&treasury, &token, &alice, units(1, 18))
            .await
            .is_err());

        let grant = sim.impersonate(&treasury).await.unwrap();
        assert!(sim.is_impersonating(&treasury));
        sim.transfer(&treasury, &token, &alice, units(1, 18))
            .await
            .unwrap();
        sim.stop_impersonating(grant).await.unwrap();
        assert!(!sim.is_impersonating(&treasury));
    }

    #[tokio::test]
    async fn disabled_impersonation_is_denied() {
        let (sim, _alice) = sim_with_account("alice");
        let owner = sim.external_account("owner").unwrap();
        sim.set_impersonation_enabled(false);
        let err = sim.impersonate(&owner).await.unwrap_err();
        assert!(matches!(err, BootstrapError::ImpersonationDenied(account) if account == owner));
    }

    #[tokio::test]
    async fn mint_requires_owner_and_entry_point() {
        let (sim, alice) = sim_with_account("alice");
        let bob = sim.create_account("bob").unwrap();
        let token = sim
            .deploy_token(
                &alice,
                MockTokenSpec::new("Dai", "DAI", 6).mint_entries(MintEntries::TO_RECIPIENT),
            )
            .unwrap();

        let err = sim.mint(&alice, &token, U256::one()).await.unwrap_err();
        assert!(err.revert_reason().unwrap().contains("not implemented"));

        let err = sim
            .mint_to(&bob, &token, &bob, U256::one())
            .await
            .unwrap_err();
        assert!(err.revert_reason().unwrap().contains("not the owner"));

        sim.mint_to(&alice, &token, &bob, U256::from(7u8))
            .await
            .unwrap();
        assert_eq!(sim.balance_of(&token, &bob).await.unwrap(), U256::from(7u8));
        assert_eq!(sim.total_supply(&token).await.unwrap(), U256::from(7u8));
    }

    #[tokio::test]
    async fn native_transfers_need_funds() {
        let (sim, alice) = sim_with_account("alice");
        let bob = sim.create_account("bob").unwrap();
        sim.set_native_balance(&alice, NearToken::from_yoctonear(10));

        sim.send_native(&alice, &bob, NearToken::from_yoctonear(4))
            .await
            .unwrap();
        assert_eq!(
            sim.native_balance(&alice).await.unwrap(),
            NearToken::from_yoctonear(6)
        );
        assert!(sim
            .send_native(&alice, &bob, NearToken::from_yoctonear(7))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn join_pulls_proportional_reserves() {
        let (sim, alice) = sim_with_account("alice");
        let weth = sim
            .deploy_token(
                &alice,
                MockTokenSpec::new("Wrapped Ether", "WETH", 18).holder(alice.clone(), U256::from(1_000u32)),
            )
            .unwrap();
        let pool = sim
            .deploy_pool(
                &alice,
                PoolSpec::new(U256::from(100u8)).reserve(weth.clone(), U256::from(500u32)),
            )
            .unwrap();
        assert_eq!(sim.code_at(&pool), Some(ContractName::IBalancerPool));
        assert_eq!(sim.token_name(&weth).unwrap(), "Wrapped Ether");
        assert_eq!(sim.token_name(&pool).unwrap(), "Balancer Pool Token");
        assert!(sim.token_name(&alice).is_err());

        sim.approve(&alice, &weth, &pool, U256::MAX).await.unwrap();
        sim.join_pool(&alice, &pool, U256::from(10u8), &[U256::from(50u8)])
            .await
            .unwrap();
        assert_eq!(sim.balance_of(&weth, &pool).await.unwrap(), U256::from(550u32));
        assert_eq!(sim.balance_of(&pool, &alice).await.unwrap(), U256::from(110u8));

        let err = sim
            .join_pool(&alice, &pool, U256::from(10u8), &[U256::from(49u8)])
            .await
            .unwrap_err();
        assert!(err.revert_reason().unwrap().starts_with("ERR_LIMIT_IN"));
    }

    #[tokio::test]
    async fn snapshots_restore_state() {
        let (sim, alice) = sim_with_account("alice");
        let token = sim
            .deploy_token(&alice, MockTokenSpec::new("Dai", "DAI", 18))
            .unwrap();
        let snapshot = sim.snapshot();

        sim.mint(&alice, &token, U256::from(3u8)).await.unwrap();
        assert_eq!(sim.total_supply(&token).await.unwrap(), U256::from(3u8));

        sim.revert(snapshot).unwrap();
        assert_eq!(sim.total_supply(&token).await.unwrap(), U256::zero());
        assert!(sim.revert(snapshot).is_err());
    }
}
