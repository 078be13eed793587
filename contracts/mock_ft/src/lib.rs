//! # Mock Fungible Token
//!
//! A NEP-141 token for sandbox fixtures. Beyond the standard views it exposes
//! owner-only minting through two entry points, ERC-20 style allowances, and,
//! when initialized with [`Contract::new_pool`], a weighted-pool join that pulls
//! constituents through `transfer_from` and mints pool shares.

use near_contract_standards::fungible_token::{
    core::FungibleTokenCore, core_impl::FungibleToken, events::FtMint,
    metadata::FungibleTokenMetadata,
};
use near_sdk::{
    assert_one_yocto,
    borsh::{self, BorshDeserialize, BorshSerialize},
    env, ext_contract,
    json_types::U128,
    near, require,
    store::LookupMap,
    AccountId, BorshStorageKey, Gas, PanicOnDefault, Promise, PromiseResult,
};

const GAS_FOR_TRANSFER_FROM: Gas = Gas::from_tgas(10);
const GAS_FOR_JOIN_CALLBACK: Gas = Gas::from_tgas(15);

#[ext_contract(ext_token)]
trait MockToken {
    fn transfer_from(&mut self, owner_id: AccountId, receiver_id: AccountId, amount: U128);
}

#[ext_contract(ext_self)]
trait PoolCallbacks {
    fn on_join_pool(&mut self, joiner_id: AccountId, pool_amount_out: U128, amounts_in: Vec<U128>);
}

#[derive(BorshSerialize, BorshDeserialize, BorshStorageKey)]
#[borsh(crate = "near_sdk::borsh")]
pub enum StorageKey {
    FungibleToken,
    Allowances,
}

/// Constituents of a pool-share token and the reserves it has recorded for them.
#[near(serializers = [borsh])]
pub struct PoolState {
    constituents: Vec<AccountId>,
    reserves: Vec<u128>,
}

#[near(contract_state)]
#[derive(PanicOnDefault)]
pub struct Contract {
    pub owner_id: AccountId,
    pub token: FungibleToken,
    pub metadata: FungibleTokenMetadata,
    /// Reject allowance changes from one nonzero value to another.
    pub strict_approve: bool,
    allowances: LookupMap<(AccountId, AccountId), u128>,
    pool: Option<PoolState>,
}

#[near]
impl Contract {
    #[init]
    pub fn new(
        owner_id: AccountId,
        metadata: FungibleTokenMetadata,
        strict_approve: Option<bool>,
    ) -> Self {
        metadata.assert_valid();
        Self {
            owner_id,
            token: FungibleToken::new(StorageKey::FungibleToken),
            metadata,
            strict_approve: strict_approve.unwrap_or(false),
            allowances: LookupMap::new(StorageKey::Allowances),
            pool: None,
        }
    }

    /// Initializes a pool-share token. `reserves` must already be held by this
    /// account in each constituent; `initial_supply` shares go to the owner.
    #[init]
    pub fn new_pool(
        owner_id: AccountId,
        metadata: FungibleTokenMetadata,
        constituents: Vec<AccountId>,
        reserves: Vec<U128>,
        initial_supply: U128,
    ) -> Self {
        require!(constituents.len() == reserves.len(), "ERR_LENGTH_MISMATCH");
        let mut this = Self::new(owner_id.clone(), metadata, None);
        this.pool = Some(PoolState {
            constituents,
            reserves: reserves.into_iter().map(|r| r.0).collect(),
        });
        this.deposit(&owner_id, initial_supply.0, "Initial supply");
        this
    }

    pub fn owner(&self) -> AccountId {
        self.owner_id.clone()
    }

    pub fn ft_metadata(&self) -> FungibleTokenMetadata {
        self.metadata.clone()
    }

    pub fn ft_balance_of(&self, account_id: AccountId) -> U128 {
        self.token.ft_balance_of(account_id)
    }

    pub fn ft_total_supply(&self) -> U128 {
        self.token.ft_total_supply()
    }

    /// Mints `amount` to the owner.
    pub fn mint(&mut self, amount: U128) {
        self.require_owner();
        let owner_id = self.owner_id.clone();
        self.deposit(&owner_id, amount.0, "Owner mint");
    }

    pub fn mint_to(&mut self, account_id: AccountId, amount: U128) {
        self.require_owner();
        self.deposit(&account_id, amount.0, "Owner mint");
    }

    /// Transfers to `receiver_id`, registering it on first receipt.
    #[payable]
    pub fn ft_transfer(&mut self, receiver_id: AccountId, amount: U128, memo: Option<String>) {
        assert_one_yocto();
        let sender_id = env::predecessor_account_id();
        self.register_if_needed(&receiver_id);
        self.token
            .internal_transfer(&sender_id, &receiver_id, amount.0, memo);
    }

    pub fn approve(&mut self, spender_id: AccountId, amount: U128) {
        let owner_id = env::predecessor_account_id();
        let key = (owner_id, spender_id);
        if self.strict_approve && amount.0 != 0 {
            let current = self.allowances.get(&key).copied().unwrap_or(0);
            require!(current == 0, "approve from non-zero to non-zero allowance");
        }
        self.allowances.insert(key, amount.0);
    }

    pub fn allowance(&self, owner_id: AccountId, spender_id: AccountId) -> U128 {
        U128(
            self.allowances
                .get(&(owner_id, spender_id))
                .copied()
                .unwrap_or(0),
        )
    }

    /// Moves `amount` from `owner_id` using the caller's allowance.
    /// An allowance of `u128::MAX` is never decreased.
    pub fn transfer_from(&mut self, owner_id: AccountId, receiver_id: AccountId, amount: U128) {
        let spender_id = env::predecessor_account_id();
        let key = (owner_id.clone(), spender_id);
        let current = self.allowances.get(&key).copied().unwrap_or(0);
        if current != u128::MAX {
            let remaining = current
                .checked_sub(amount.0)
                .unwrap_or_else(|| env::panic_str("insufficient allowance"));
            self.allowances.insert(key, remaining);
        }
        self.register_if_needed(&receiver_id);
        self.token
            .internal_transfer(&owner_id, &receiver_id, amount.0, None);
    }

    pub fn get_final_tokens(&self) -> Vec<AccountId> {
        self.pool_state().constituents.clone()
    }

    /// Pulls `ceil(pool_amount_out * reserve / supply)` of every constituent from
    /// the caller, then mints `pool_amount_out` shares to it.
    pub fn join_pool(&mut self, pool_amount_out: U128, max_amounts_in: Vec<U128>) -> Promise {
        let joiner_id = env::predecessor_account_id();
        let supply = self.token.ft_total_supply().0;
        require!(supply > 0, "ERR_NOT_FINALIZED");

        let pool = self.pool_state();
        require!(
            pool.constituents.len() == max_amounts_in.len(),
            "ERR_LENGTH_MISMATCH"
        );
        require!(!pool.constituents.is_empty(), "ERR_EMPTY_POOL");

        let mut amounts_in = Vec::with_capacity(pool.reserves.len());
        let mut transfers: Option<Promise> = None;
        for ((constituent, reserve), max_in) in pool
            .constituents
            .iter()
            .zip(&pool.reserves)
            .zip(&max_amounts_in)
        {
            let amount_in = join_amount_in(pool_amount_out.0, *reserve, supply);
            require!(amount_in <= max_in.0, "ERR_LIMIT_IN");
            amounts_in.push(U128(amount_in));

            let transfer = ext_token::ext(constituent.clone())
                .with_static_gas(GAS_FOR_TRANSFER_FROM)
                .transfer_from(
                    joiner_id.clone(),
                    env::current_account_id(),
                    U128(amount_in),
                );
            transfers = Some(match transfers {
                Some(all) => all.and(transfer),
                None => transfer,
            });
        }

        let callback = ext_self::ext(env::current_account_id())
            .with_static_gas(GAS_FOR_JOIN_CALLBACK)
            .on_join_pool(joiner_id, pool_amount_out, amounts_in);
        match transfers {
            Some(all) => all.then(callback),
            None => env::panic_str("ERR_EMPTY_POOL"),
        }
    }

    /// Mints pool shares once every constituent transfer has succeeded.
    #[private]
    pub fn on_join_pool(
        &mut self,
        joiner_id: AccountId,
        pool_amount_out: U128,
        amounts_in: Vec<U128>,
    ) {
        let all_succeeded = (0..env::promise_results_count())
            .all(|i| matches!(env::promise_result(i), PromiseResult::Successful(_)));
        require!(all_succeeded, "ERR_TRANSFER_FAILED");

        if let Some(pool) = self.pool.as_mut() {
            for (reserve, amount_in) in pool.reserves.iter_mut().zip(&amounts_in) {
                *reserve = reserve
                    .checked_add(amount_in.0)
                    .expect("reserve overflow");
            }
        }
        self.deposit(&joiner_id, pool_amount_out.0, "Join pool");
    }
}

impl Contract {
    fn require_owner(&self) {
        require!(
            env::predecessor_account_id() == self.owner_id,
            "Ownable: caller is not the owner"
        );
    }

    fn pool_state(&self) -> &PoolState {
        self.pool
            .as_ref()
            .unwrap_or_else(|| env::panic_str("not a pool"))
    }

    fn register_if_needed(&mut self, account_id: &AccountId) {
        if !self.token.accounts.contains_key(account_id) {
            self.token.internal_register_account(account_id);
        }
    }

    fn deposit(&mut self, account_id: &AccountId, amount: u128, memo: &str) {
        self.register_if_needed(account_id);
        self.token.internal_deposit(account_id, amount);
        FtMint {
            owner_id: account_id,
            amount: U128(amount),
            memo: Some(memo),
        }
        .emit();
    }
}

fn join_amount_in(pool_amount_out: u128, reserve: u128, supply: u128) -> u128 {
    let numerator = pool_amount_out
        .checked_mul(reserve)
        .unwrap_or_else(|| env::panic_str("ERR_MUL_OVERFLOW"));
    let amount_in = numerator.div_ceil(supply);
    require!(amount_in > 0, "ERR_MATH_APPROX");
    amount_in
}

#[cfg(test)]
mod tests {
    use super::*;
    use near_sdk::test_utils::VMContextBuilder;
    use near_sdk::{testing_env, NearToken};

    fn init_ctx(predecessor: &str, deposit_yocto: u128) {
        let mut builder = VMContextBuilder::new();
        builder
            .current_account_id("token.test".parse().unwrap())
            .predecessor_account_id(predecessor.parse().unwrap())
            .attached_deposit(NearToken::from_yoctonear(deposit_yocto));
        testing_env!(builder.build());
    }

    fn metadata(symbol: &str, decimals: u8) -> FungibleTokenMetadata {
        FungibleTokenMetadata {
            spec: "ft-1.0.0".to_string(),
            name: format!("Mock {symbol}"),
            symbol: symbol.to_string(),
            icon: None,
            reference: None,
            reference_hash: None,
            decimals,
        }
    }

    fn token(strict: bool) -> Contract {
        init_ctx("owner.test", 0);
        Contract::new("owner.test".parse().unwrap(), metadata("DAI", 18), Some(strict))
    }

    fn id(s: &str) -> AccountId {
        s.parse().unwrap()
    }

    #[test]
    fn owner_mints_to_self_and_recipient() {
        let mut contract = token(false);
        contract.mint(U128(100));
        contract.mint_to(id("alice.test"), U128(7));

        assert_eq!(contract.ft_balance_of(id("owner.test")).0, 100);
        assert_eq!(contract.ft_balance_of(id("alice.test")).0, 7);
        assert_eq!(contract.ft_total_supply().0, 107);
    }

    #[test]
    #[should_panic(expected = "caller is not the owner")]
    fn mint_rejects_non_owner() {
        let mut contract = token(false);
        init_ctx("alice.test", 0);
        contract.mint_to(id("alice.test"), U128(1));
    }

    #[test]
    fn transfer_registers_receiver() {
        let mut contract = token(false);
        contract.mint(U128(50));
        init_ctx("owner.test", 1);
        contract.ft_transfer(id("bob.test"), U128(20), None);

        assert_eq!(contract.ft_balance_of(id("owner.test")).0, 30);
        assert_eq!(contract.ft_balance_of(id("bob.test")).0, 20);
    }

    #[test]
    #[should_panic(expected = "non-zero to non-zero")]
    fn strict_approve_requires_reset() {
        let mut contract = token(true);
        init_ctx("alice.test", 0);
        contract.approve(id("pool.test"), U128(5));
        contract.approve(id("pool.test"), U128(6));
    }

    #[test]
    fn transfer_from_spends_finite_allowance_only() {
        let mut contract = token(false);
        contract.mint_to(id("alice.test"), U128(100));

        init_ctx("alice.test", 0);
        contract.approve(id("pool.test"), U128(30));
        init_ctx("pool.test", 0);
        contract.transfer_from(id("alice.test"), id("pool.test"), U128(10));
        assert_eq!(contract.allowance(id("alice.test"), id("pool.test")).0, 20);

        init_ctx("alice.test", 0);
        contract.approve(id("pool.test"), U128(u128::MAX));
        init_ctx("pool.test", 0);
        contract.transfer_from(id("alice.test"), id("pool.test"), U128(10));
        assert_eq!(
            contract.allowance(id("alice.test"), id("pool.test")).0,
            u128::MAX
        );
        assert_eq!(contract.ft_balance_of(id("pool.test")).0, 20);
    }

    #[test]
    fn pool_reports_constituents() {
        init_ctx("owner.test", 0);
        let contract = Contract::new_pool(
            id("owner.test"),
            metadata("BPT", 18),
            vec![id("weth.test"), id("dai.test")],
            vec![U128(1), U128(1)],
            U128(100),
        );
        assert_eq!(
            contract.get_final_tokens(),
            vec![id("weth.test"), id("dai.test")]
        );
        assert_eq!(contract.ft_balance_of(id("owner.test")).0, 100);
    }

    #[test]
    #[should_panic(expected = "ERR_LIMIT_IN")]
    fn join_enforces_max_amounts() {
        init_ctx("owner.test", 0);
        let mut contract = Contract::new_pool(
            id("owner.test"),
            metadata("BPT", 18),
            vec![id("weth.test")],
            vec![U128(500)],
            U128(100),
        );
        init_ctx("alice.test", 0);
        contract.join_pool(U128(10), vec![U128(49)]);
    }

    #[test]
    fn join_amount_rounds_up() {
        assert_eq!(join_amount_in(10, 500, 100), 50);
        assert_eq!(join_amount_in(1, 1, 3), 1);
    }
}
