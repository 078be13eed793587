// Test builder for funding scenarios on the simulated chain.
// Tokens are owned by a keyless account so they can only be minted through impersonation.

#![allow(dead_code)]

use funded_accounts::sim::{MintEntries, MockTokenSpec, PoolSpec, SimChain};
use funded_accounts::{Amount, Bootstrapper, FundingConfig, TokenRule};
use near_sdk::AccountId;

use super::*;

pub struct TestScenarioBuilder {
    sim: SimChain,
    deployer: AccountId,
    token_owner: AccountId,
    config: FundingConfig,
    accounts: Vec<(AccountId, String)>,
    tokens: Vec<(AccountId, String)>,
}

impl TestScenarioBuilder {
    pub fn new() -> TestResult<Self> {
        init_tracing();
        let sim = SimChain::new();
        let deployer = sim.create_account("deployer")?;
        let token_owner = sim.external_account("token-owner")?;

        Ok(Self {
            sim,
            deployer,
            token_owner,
            config: FundingConfig::new("sim"),
            accounts: Vec::new(),
            tokens: Vec::new(),
        })
    }

    pub fn create_account(mut self, name: &str) -> TestResult<Self> {
        let account_id = self.sim.create_account(name)?;
        self.accounts.push((account_id, name.to_string()));
        Ok(self)
    }

    /// Deploys a token exposing only the entry point that `rule` uses, and
    /// records the rule in the scenario config.
    pub fn ruled_token(mut self, label: &str, decimals: u8, rule: TokenRule) -> TestResult<Self> {
        let entries = match rule {
            TokenRule::OwnerMint => MintEntries::TO_OWNER,
            TokenRule::OwnerMintTo => MintEntries::TO_RECIPIENT,
            TokenRule::WrappedNative => MintEntries::NONE,
        };
        let spec = MockTokenSpec::new(label, label, decimals)
            .owner(self.token_owner.clone())
            .mint_entries(entries);
        let address = self.sim.deploy_token(&self.deployer, spec)?;
        self.config = self.config.with_rule(address.clone(), rule);
        self.tokens.push((address, label.to_string()));
        Ok(self)
    }

    /// An owner-minted token that rejects nonzero-to-nonzero approvals.
    pub fn strict_token(mut self, label: &str, decimals: u8) -> TestResult<Self> {
        let spec = MockTokenSpec::new(label, label, decimals)
            .owner(self.token_owner.clone())
            .mint_entries(MintEntries::TO_OWNER)
            .strict_approve();
        let address = self.sim.deploy_token(&self.deployer, spec)?;
        self.config = self.config.with_rule(address.clone(), TokenRule::OwnerMint);
        self.tokens.push((address, label.to_string()));
        Ok(self)
    }

    /// A token without a funding rule.
    pub fn plain_token(mut self, label: &str, decimals: u8) -> TestResult<Self> {
        let spec = MockTokenSpec::new(label, label, decimals).owner(self.token_owner.clone());
        let address = self.sim.deploy_token(&self.deployer, spec)?;
        self.tokens.push((address, label.to_string()));
        Ok(self)
    }

    /// Deploys a weighted pool over previously added tokens, by label.
    pub fn pool(mut self, label: &str, supply: Amount, reserves: &[(&str, Amount)]) -> TestResult<Self> {
        let mut spec = PoolSpec::new(supply);
        for (token_label, reserve) in reserves {
            spec = spec.reserve(self.token(token_label)?, *reserve);
        }
        let address = self.sim.deploy_pool(&self.deployer, spec)?;
        self.tokens.push((address, label.to_string()));
        Ok(self)
    }

    pub fn with_config(mut self, update: impl FnOnce(FundingConfig) -> FundingConfig) -> Self {
        self.config = update(self.config);
        self
    }

    pub fn account(&self, name: &str) -> TestResult<AccountId> {
        self.accounts
            .iter()
            .find(|(_, n)| n == name)
            .map(|(id, _)| id.clone())
            .ok_or_else(|| format!("{name} account not found").into())
    }

    pub fn token(&self, label: &str) -> TestResult<AccountId> {
        self.tokens
            .iter()
            .find(|(_, l)| l == label)
            .map(|(id, _)| id.clone())
            .ok_or_else(|| format!("{label} token not found").into())
    }

    pub fn sim(&self) -> &SimChain {
        &self.sim
    }

    pub fn config(&self) -> &FundingConfig {
        &self.config
    }

    pub fn deployer(&self) -> &AccountId {
        &self.deployer
    }

    pub fn token_owner(&self) -> &AccountId {
        &self.token_owner
    }

    pub fn bootstrapper(&self) -> Bootstrapper<'_, SimChain> {
        Bootstrapper::new(&self.sim, &self.config)
    }
}

/// Reads `token` balance of `account` by label and name.
pub async fn get_balance(builder: &TestScenarioBuilder, token: &str, account: &str) -> TestResult<Amount> {
    use funded_accounts::Chain;

    let token_id = builder.token(token)?;
    let account_id = builder.account(account)?;
    Ok(builder.sim().balance_of(&token_id, &account_id).await?)
}
