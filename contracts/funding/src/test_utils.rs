//! # Test Utilities
//!
//! Shared setup for unit tests: a simulated chain with a funded account,
//! amount shorthands, and a builder for the common token fixtures.

#[cfg(test)]
pub mod helpers {
    use crate::amount::{pow10, Amount, U256};
    use crate::sim::SimChain;
    use near_sdk::AccountId;

    /// Installs a test-writer subscriber once; later calls are no-ops.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// `whole * 10^decimals`.
    pub fn units(whole: u64, decimals: u8) -> Amount {
        U256::from(whole) * pow10(u32::from(decimals)).unwrap()
    }

    /// A fresh chain with one local account named `name`.
    pub fn sim_with_account(name: &str) -> (SimChain, AccountId) {
        init_tracing();
        let sim = SimChain::new();
        let account = sim.create_account(name).unwrap();
        (sim, account)
    }
}

#[cfg(test)]
pub mod builders {
    use crate::amount::Amount;
    use crate::config::{FundingConfig, TokenRule};
    use crate::sim::{MintEntries, MockTokenSpec, PoolSpec, SimChain};
    use near_sdk::AccountId;

    /// Deploys tokens owned by a keyless account and records their rules.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut fixture = FixtureBuilder::new(&sim, &alice);
    /// let alpha = fixture.owner_minted("ALPHA", 18);
    /// let config = fixture.config();
    /// ```
    pub struct FixtureBuilder<'a> {
        sim: &'a SimChain,
        deployer: AccountId,
        owner: AccountId,
        config: FundingConfig,
    }

    impl<'a> FixtureBuilder<'a> {
        pub fn new(sim: &'a SimChain, deployer: &AccountId) -> Self {
            let owner = sim.external_account("token-owner").unwrap();
            Self {
                sim,
                deployer: deployer.clone(),
                owner,
                config: FundingConfig::new("sim"),
            }
        }

        pub fn owner(&self) -> &AccountId {
            &self.owner
        }

        /// A token with only `mint(amount)`, funded through the owner.
        pub fn owner_minted(&mut self, symbol: &str, decimals: u8) -> AccountId {
            self.token(symbol, decimals, MintEntries::TO_OWNER, TokenRule::OwnerMint)
        }

        /// A token with only `mint(recipient, amount)`.
        pub fn minted_to(&mut self, symbol: &str, decimals: u8) -> AccountId {
            self.token(symbol, decimals, MintEntries::TO_RECIPIENT, TokenRule::OwnerMintTo)
        }

        /// A token without a funding rule.
        pub fn unruled(&mut self, symbol: &str, decimals: u8) -> AccountId {
            let spec = MockTokenSpec::new(symbol, symbol, decimals).owner(self.owner.clone());
            self.sim.deploy_token(&self.deployer, spec).unwrap()
        }

        pub fn pool(&mut self, supply: Amount, reserves: &[(AccountId, Amount)]) -> AccountId {
            let spec = reserves
                .iter()
                .fold(PoolSpec::new(supply), |spec, (token, reserve)| {
                    spec.reserve(token.clone(), *reserve)
                });
            self.sim.deploy_pool(&self.deployer, spec).unwrap()
        }

        pub fn config(&self) -> FundingConfig {
            self.config.clone()
        }

        fn token(
            &mut self,
            symbol: &str,
            decimals: u8,
            entries: MintEntries,
            rule: TokenRule,
        ) -> AccountId {
            let spec = MockTokenSpec::new(symbol, symbol, decimals)
                .owner(self.owner.clone())
                .mint_entries(entries);
            let address = self.sim.deploy_token(&self.deployer, spec).unwrap();
            self.config = self.config.clone().with_rule(address.clone(), rule);
            address
        }
    }
}
