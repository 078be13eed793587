//! # Sandbox Chain
//!
//! [`Chain`] backed by a local NEAR sandbox node and the `mock_ft` contract.
//!
//! The harness holds a key for every account it creates. Keys are kept in a
//! keyring tagged with a [`Custody`]: `Local` keys sign freely, while
//! `Impersonation` keys sign only between [`Chain::impersonate`] and
//! [`Chain::stop_impersonating`]. Token owners are typically created with
//! `Impersonation` custody so that only the bootstrapper can act for them.

use crate::amount::{to_u128, Amount, U256};
use crate::chain::{Chain, Impersonation};
use crate::error::{BootstrapError, Result};
use async_trait::async_trait;
use near_api::near_primitives::views::FinalExecutionStatus;
use near_api::{signer, Account, Contract, Data, NetworkConfig, RPCEndpoint, Signer, Tokens};
use near_contract_standards::fungible_token::metadata::FungibleTokenMetadata;
use near_sandbox::{GenesisAccount, Sandbox};
use near_sdk::json_types::U128;
use near_sdk::{AccountId, NearToken};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Overrides the location of the compiled `mock_ft` contract.
pub const MOCK_FT_WASM_ENV_VAR: &str = "MOCK_FT_WASM";

const DEFAULT_MOCK_FT_WASM_PATH: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/../mock_ft/target/near/mock_ft.wasm");

const ACCOUNT_FUNDING_NEAR: u128 = 5;
const CONTRACT_FUNDING_NEAR: u128 = 10;

/// Who may sign with a key held by the harness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Custody {
    Local,
    Impersonation,
}

struct Key {
    signer: Arc<Signer>,
    custody: Custody,
}

/// Parameters of a `mock_ft` deployment.
#[derive(Clone, Debug)]
pub struct MockFtParams {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub owner: AccountId,
    pub strict_approve: bool,
}

pub struct SandboxChain {
    network: NetworkConfig,
    genesis: AccountId,
    keys: Mutex<BTreeMap<AccountId, Key>>,
    impersonating: Mutex<BTreeSet<AccountId>>,
    // Dropping the handle stops the node.
    _sandbox: Sandbox,
}

fn transport(context: &str, err: impl std::fmt::Display) -> BootstrapError {
    BootstrapError::Transport(format!("{context}: {err}"))
}

fn api_id(id: &AccountId) -> Result<near_api::AccountId> {
    id.as_str()
        .parse()
        .map_err(|e| transport(&format!("account id `{id}`"), e))
}

fn sdk_id(id: &near_api::AccountId) -> Result<AccountId> {
    id.as_str()
        .parse()
        .map_err(|e| transport(&format!("account id `{id}`"), e))
}

fn api_near(amount: NearToken) -> near_api::NearToken {
    near_api::NearToken::from_yoctonear(amount.as_yoctonear())
}

/// NEP-141 amounts are `u128`; an unlimited approval maps to `u128::MAX`.
fn wire_amount(amount: Amount) -> Result<U128> {
    if amount == U256::MAX {
        return Ok(U128(u128::MAX));
    }
    Ok(U128(to_u128(amount)?))
}

fn ensure_success(
    status: &FinalExecutionStatus,
    contract: &AccountId,
    method: &'static str,
) -> Result<()> {
    match status {
        FinalExecutionStatus::SuccessValue(_) => Ok(()),
        FinalExecutionStatus::Failure(err) => {
            Err(BootstrapError::reverted(contract, method, format!("{err:?}")))
        }
        other => Err(BootstrapError::reverted(
            contract,
            method,
            format!("unexpected status: {other:?}"),
        )),
    }
}

pub fn mock_ft_wasm_path() -> String {
    std::env::var(MOCK_FT_WASM_ENV_VAR).unwrap_or_else(|_| DEFAULT_MOCK_FT_WASM_PATH.to_string())
}

impl SandboxChain {
    /// Starts a sandbox node and takes custody of its genesis account.
    pub async fn start() -> Result<Self> {
        let sandbox = Sandbox::start_sandbox()
            .await
            .map_err(|e| transport("starting sandbox", e))?;
        let rpc = sandbox
            .rpc_addr
            .parse()
            .map_err(|e| transport("sandbox rpc address", e))?;
        let network = NetworkConfig {
            network_name: "sandbox".to_string(),
            rpc_endpoints: vec![RPCEndpoint::new(rpc)],
            ..NetworkConfig::testnet()
        };

        let genesis_account = GenesisAccount::default();
        let genesis = sdk_id(&genesis_account.account_id)?;
        let secret_key = genesis_account
            .private_key
            .parse()
            .map_err(|e| transport("genesis key", e))?;
        let signer = Signer::new(Signer::from_secret_key(secret_key))
            .map_err(|e| transport("genesis signer", e))?;

        let mut keys = BTreeMap::new();
        keys.insert(
            genesis.clone(),
            Key {
                signer,
                custody: Custody::Local,
            },
        );
        info!(%genesis, rpc = %sandbox.rpc_addr, "sandbox started");

        Ok(Self {
            network,
            genesis,
            keys: Mutex::new(keys),
            impersonating: Mutex::new(BTreeSet::new()),
            _sandbox: sandbox,
        })
    }

    /// The sandbox root account.
    ///
    /// # Returns
    ///
    /// The account that funds every created account and deploys the mock
    /// contracts. Its key is always in the keyring, so it never needs
    /// impersonation.
    pub fn genesis(&self) -> &AccountId {
        &self.genesis
    }

    /// RPC settings for issuing calls outside the [`Chain`] trait.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    fn keys(&self) -> MutexGuard<'_, BTreeMap<AccountId, Key>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn impersonating(&self) -> MutexGuard<'_, BTreeSet<AccountId>> {
        self.impersonating
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn signer_for(
        &self,
        account: &AccountId,
        contract: &AccountId,
        method: &'static str,
    ) -> Result<Arc<Signer>> {
        let keys = self.keys();
        let key = keys.get(account).ok_or_else(|| {
            BootstrapError::reverted(contract, method, format!("no key held for `{account}`"))
        })?;
        match key.custody {
            Custody::Local => Ok(key.signer.clone()),
            Custody::Impersonation if self.impersonating().contains(account) => {
                Ok(key.signer.clone())
            }
            Custody::Impersonation => Err(BootstrapError::reverted(
                contract,
                method,
                format!("`{account}` is not being impersonated"),
            )),
        }
    }

    /// Creates `name.<genesis>` funded by the genesis account.
    pub async fn create_account(&self, name: &str, custody: Custody) -> Result<AccountId> {
        self.create_funded(name, custody, ACCOUNT_FUNDING_NEAR).await
    }

    async fn create_funded(&self, name: &str, custody: Custody, near: u128) -> Result<AccountId> {
        let account: AccountId = format!("{name}.{}", self.genesis)
            .parse()
            .map_err(|e| transport("account name", e))?;
        let secret_key = signer::generate_secret_key().map_err(|e| transport("keygen", e))?;
        let public_key = secret_key.public_key();
        let genesis_signer = self.signer_for(&self.genesis, &account, "create_account")?;

        let outcome = Account::create_account(api_id(&account)?)
            .fund_myself(api_id(&self.genesis)?, near_api::NearToken::from_near(near))
            .public_key(public_key)
            .map_err(|e| transport("create_account", e))?
            .with_signer(genesis_signer)
            .send_to(&self.network)
            .await
            .map_err(|e| transport("create_account", e))?;
        ensure_success(&outcome.status, &account, "create_account")?;

        let signer = Signer::new(Signer::from_secret_key(secret_key))
            .map_err(|e| transport("account signer", e))?;
        self.keys().insert(account.clone(), Key { signer, custody });
        debug!(%account, ?custody, "created sandbox account");
        Ok(account)
    }

    /// Deploys `mock_ft` on a fresh `name.<genesis>` account.
    pub async fn deploy_mock_ft(&self, account_name: &str, params: MockFtParams) -> Result<AccountId> {
        let metadata = json!({
            "spec": "ft-1.0.0",
            "name": params.name,
            "symbol": params.symbol,
            "icon": null,
            "reference": null,
            "reference_hash": null,
            "decimals": params.decimals,
        });
        self.deploy(
            account_name,
            "new",
            json!({
                "owner_id": params.owner,
                "metadata": metadata,
                "strict_approve": params.strict_approve,
            }),
        )
        .await
    }

    /// Deploys a pool-share `mock_ft` and seeds its reserves by minting each
    /// constituent to the pool through the constituent's owner.
    pub async fn deploy_mock_pool(
        &self,
        account_name: &str,
        controller: &AccountId,
        reserves: &[(AccountId, Amount)],
        initial_supply: Amount,
    ) -> Result<AccountId> {
        let mut constituents = Vec::with_capacity(reserves.len());
        let mut amounts = Vec::with_capacity(reserves.len());
        for (token, reserve) in reserves {
            constituents.push(token.clone());
            amounts.push(wire_amount(*reserve)?);
        }

        let metadata = json!({
            "spec": "ft-1.0.0",
            "name": "Balancer Pool Token",
            "symbol": "BPT",
            "icon": null,
            "reference": null,
            "reference_hash": null,
            "decimals": 18,
        });
        let pool = self
            .deploy(
                account_name,
                "new_pool",
                json!({
                    "owner_id": controller,
                    "metadata": metadata,
                    "constituents": constituents,
                    "reserves": amounts,
                    "initial_supply": wire_amount(initial_supply)?,
                }),
            )
            .await?;

        for (token, reserve) in reserves {
            self.mint_to_as_owner(token, &pool, *reserve).await?;
        }
        Ok(pool)
    }

    async fn deploy(&self, account_name: &str, init: &str, args: Value) -> Result<AccountId> {
        let account = self
            .create_funded(account_name, Custody::Local, CONTRACT_FUNDING_NEAR)
            .await?;
        let path = mock_ft_wasm_path();
        let wasm = std::fs::read(&path).map_err(|e| transport(&format!("reading {path}"), e))?;
        let signer = self.signer_for(&account, &account, "deploy")?;

        let outcome = Contract::deploy(api_id(&account)?)
            .use_code(wasm)
            .with_init_call(init, args)
            .map_err(|e| transport("init args", e))?
            .with_signer(signer)
            .send_to(&self.network)
            .await
            .map_err(|e| transport("deploy", e))?;
        ensure_success(&outcome.status, &account, "deploy")?;
        info!(%account, init, "deployed mock_ft");
        Ok(account)
    }

    async fn view<T>(&self, contract: &AccountId, method: &'static str, args: Value) -> Result<T>
    where
        T: DeserializeOwned + Send + Sync,
    {
        let data: Data<T> = Contract(api_id(contract)?)
            .call_function(method, args)
            .map_err(|e| transport(method, e))?
            .read_only()
            .fetch_from(&self.network)
            .await
            .map_err(|e| BootstrapError::reverted(contract, method, e.to_string()))?;
        Ok(data.data)
    }

    async fn call(
        &self,
        from: &AccountId,
        contract: &AccountId,
        method: &'static str,
        args: Value,
        deposit: NearToken,
    ) -> Result<()> {
        let signer = self.signer_for(from, contract, method)?;
        let outcome = Contract(api_id(contract)?)
            .call_function(method, args)
            .map_err(|e| transport(method, e))?
            .transaction()
            .deposit(api_near(deposit))
            .with_signer(api_id(from)?, signer)
            .send_to(&self.network)
            .await
            .map_err(|e| BootstrapError::reverted(contract, method, e.to_string()))?;
        ensure_success(&outcome.status, contract, method)?;
        debug!(%from, %contract, method, "call succeeded");
        Ok(())
    }

    async fn metadata(&self, token: &AccountId) -> Result<FungibleTokenMetadata> {
        self.view(token, "ft_metadata", json!({})).await
    }
}

#[async_trait]
impl Chain for SandboxChain {
    async fn decimals(&self, token: &AccountId) -> Result<u8> {
        Ok(self.metadata(token).await?.decimals)
    }

    async fn symbol(&self, token: &AccountId) -> Result<String> {
        Ok(self.metadata(token).await?.symbol)
    }

    async fn owner(&self, token: &AccountId) -> Result<AccountId> {
        self.view(token, "owner", json!({})).await
    }

    async fn balance_of(&self, token: &AccountId, account: &AccountId) -> Result<Amount> {
        let balance: U128 = self
            .view(token, "ft_balance_of", json!({ "account_id": account }))
            .await?;
        Ok(U256::from(balance.0))
    }

    async fn total_supply(&self, token: &AccountId) -> Result<Amount> {
        let supply: U128 = self.view(token, "ft_total_supply", json!({})).await?;
        Ok(U256::from(supply.0))
    }

    async fn final_tokens(&self, pool: &AccountId) -> Result<Vec<AccountId>> {
        self.view(pool, "get_final_tokens", json!({})).await
    }

    async fn mint(&self, from: &AccountId, token: &AccountId, amount: Amount) -> Result<()> {
        let args = json!({ "amount": wire_amount(amount)? });
        self.call(from, token, "mint", args, NearToken::from_yoctonear(0))
            .await
    }

    async fn mint_to(
        &self,
        from: &AccountId,
        token: &AccountId,
        recipient: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        let args = json!({ "account_id": recipient, "amount": wire_amount(amount)? });
        self.call(from, token, "mint_to", args, NearToken::from_yoctonear(0))
            .await
    }

    async fn transfer(
        &self,
        from: &AccountId,
        token: &AccountId,
        recipient: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        let args = json!({ "receiver_id": recipient, "amount": wire_amount(amount)? });
        self.call(from, token, "ft_transfer", args, NearToken::from_yoctonear(1))
            .await
    }

    async fn approve(
        &self,
        from: &AccountId,
        token: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        let args = json!({ "spender_id": spender, "amount": wire_amount(amount)? });
        self.call(from, token, "approve", args, NearToken::from_yoctonear(0))
            .await
    }

    async fn join_pool(
        &self,
        from: &AccountId,
        pool: &AccountId,
        pool_amount_out: Amount,
        max_amounts_in: &[Amount],
    ) -> Result<()> {
        let max_amounts_in = max_amounts_in
            .iter()
            .map(|amount| wire_amount(*amount))
            .collect::<Result<Vec<_>>>()?;
        let args = json!({
            "pool_amount_out": wire_amount(pool_amount_out)?,
            "max_amounts_in": max_amounts_in,
        });
        self.call(from, pool, "join_pool", args, NearToken::from_yoctonear(0))
            .await
    }

    async fn native_balance(&self, account: &AccountId) -> Result<NearToken> {
        let balance = Tokens::account(api_id(account)?)
            .near_balance()
            .fetch_from(&self.network)
            .await
            .map_err(|e| transport("near_balance", e))?;
        Ok(NearToken::from_yoctonear(balance.total.as_yoctonear()))
    }

    async fn send_native(&self, from: &AccountId, to: &AccountId, amount: NearToken) -> Result<()> {
        let signer = self.signer_for(from, to, "send_native")?;
        let outcome = Tokens::account(api_id(from)?)
            .send_to(api_id(to)?)
            .near(api_near(amount))
            .with_signer(signer)
            .send_to(&self.network)
            .await
            .map_err(|e| BootstrapError::reverted(to, "send_native", e.to_string()))?;
        ensure_success(&outcome.status, to, "send_native")
    }

    async fn impersonate(&self, account: &AccountId) -> Result<Impersonation> {
        let custody = self.keys().get(account).map(|key| key.custody);
        match custody {
            Some(Custody::Impersonation) => {
                self.impersonating().insert(account.clone());
                debug!(%account, "impersonating");
            }
            Some(Custody::Local) => {}
            None => return Err(BootstrapError::ImpersonationDenied(account.clone())),
        }
        Ok(Impersonation::granted(account.clone()))
    }

    async fn stop_impersonating(&self, grant: Impersonation) -> Result<()> {
        self.impersonating().remove(grant.account());
        Ok(())
    }
}
