//! # Funded Accounts
//!
//! Test-fixture support for lending protocol integration tests. Before a
//! scenario runs, the [`Bootstrapper`] puts a usable balance of each token it
//! touches into a test account, using whatever route the token allows:
//!
//! - **Owner mint**: impersonate the token owner and mint.
//! - **Wrapped native**: rely on the account wrapping its own native balance.
//! - **Pool join**: fund every constituent, then join the weighted pool.
//!
//! ## Architecture
//!
//! - [`chain`]: the [`Chain`] trait every backend implements
//! - [`bootstrap`]: strategy dispatch and the acquisition flows
//! - [`policy`]: maps a token to its [`FundingStrategy`]
//! - [`config`]: per-network rules, loaded from JSON or built in code
//! - [`sim`]: an in-memory chain with mock tokens and pools
//! - `sandbox` (feature `sandbox`): a live NEAR sandbox backend
//! - [`balances`]: before/after snapshots and approximate equality
//! - [`registry`]: contract names and the mainnet address table

pub mod amount;
pub mod balances;
pub mod bootstrap;
pub mod chain;
pub mod config;
pub mod error;
pub mod policy;
pub mod registry;
#[cfg(feature = "sandbox")]
pub mod sandbox;
pub mod sim;

#[cfg(test)]
pub mod test_utils;

pub use amount::{Amount, Margin, U256};
pub use balances::{almost_equal, almost_equal_within, BalanceDelta, BalanceSheet};
pub use bootstrap::{Bootstrapper, Funding};
pub use chain::{Chain, Impersonation, TokenHandle};
pub use config::{FundingConfig, TokenRule};
pub use error::{BootstrapError, Result};
pub use policy::{FundingStrategy, MintEntry};
pub use registry::{AddressBook, ContractName};
