//! # Funding Configuration
//!
//! The per-network policy table consulted by the bootstrapper. A config is
//! built once per fixture (from a preset, JSON, or the `FUNDING_CONFIG`
//! environment variable) and handed to [`crate::Bootstrapper`], which keeps
//! the bootstrapper itself network-agnostic.
//!
//! ## JSON Format
//!
//! ```json
//! {
//!   "network": "mainnet",
//!   "rules": {
//!     "0xa1faa113cbe53436df28ff0aee54275c13b40975": "owner_mint",
//!     "0x6b175474e89094c44da98b954eedeac495271d0f": "owner_mint_to",
//!     "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2": "wrapped_native"
//!   },
//!   "pool_share_symbol": "BPT",
//!   "scale_exponent": 12,
//!   "gas_stipend": "1000000000000000000",
//!   "slippage": { "numerator": 9, "denominator": 10 }
//! }
//! ```
//!
//! Every field except `network` may be omitted and takes the default shown.
//! Rule keys starting with `0x` are read as addresses in any letter case and
//! stored lowercase, so checksum-cased keys match [`AddressBook`] entries.

use crate::amount::{Margin, DEFAULT_SCALE_EXPONENT};
use crate::error::{BootstrapError, Result};
use crate::registry::{parse_address, AddressBook};
use near_sdk::json_types::U128;
use near_sdk::{AccountId, NearToken};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV_VAR: &str = "FUNDING_CONFIG";

/// Symbol reported by weighted-pool share tokens.
pub const DEFAULT_POOL_SHARE_SYMBOL: &str = "BPT";

/// `10^77` is the largest power of ten below `2^256`.
pub const MAX_SCALE_EXPONENT: u32 = 77;

/// One unit of an 18-decimal native currency.
const DEFAULT_GAS_STIPEND: u128 = 1_000_000_000_000_000_000;

/// How a specific token address is funded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRule {
    /// Impersonate the owner, `mint(amount)` to the owner, then transfer to the recipient.
    OwnerMint,
    /// Impersonate the owner and `mint(recipient, amount)` directly.
    OwnerMintTo,
    /// The network's wrapped native currency; the recipient wraps its own balance.
    WrappedNative,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingConfig {
    pub network: String,
    #[serde(default, deserialize_with = "deserialize_rules")]
    pub rules: BTreeMap<AccountId, TokenRule>,
    #[serde(default = "default_pool_share_symbol")]
    pub pool_share_symbol: String,
    #[serde(default = "default_scale_exponent")]
    pub scale_exponent: u32,
    /// Native base units sent to an impersonated owner so it can pay for gas.
    #[serde(default = "default_gas_stipend")]
    pub gas_stipend: U128,
    #[serde(default)]
    pub slippage: Margin,
}

fn default_pool_share_symbol() -> String {
    DEFAULT_POOL_SHARE_SYMBOL.to_string()
}

fn default_scale_exponent() -> u32 {
    DEFAULT_SCALE_EXPONENT
}

fn default_gas_stipend() -> U128 {
    U128(DEFAULT_GAS_STIPEND)
}

fn deserialize_rules<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<AccountId, TokenRule>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, TokenRule>::deserialize(deserializer)?;
    let mut rules = BTreeMap::new();
    for (key, rule) in raw {
        let token: AccountId = if key.starts_with("0x") || key.starts_with("0X") {
            parse_address(&key).map_err(D::Error::custom)?
        } else {
            key.parse().map_err(D::Error::custom)?
        };
        if rules.insert(token.clone(), rule).is_some() {
            return Err(D::Error::custom(format!("token `{token}` has more than one rule")));
        }
    }
    Ok(rules)
}

impl FundingConfig {
    /// An empty policy table: every token is unsupported unless it is a pool share.
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            rules: BTreeMap::new(),
            pool_share_symbol: default_pool_share_symbol(),
            scale_exponent: DEFAULT_SCALE_EXPONENT,
            gas_stipend: default_gas_stipend(),
            slippage: Margin::default(),
        }
    }

    /// The Ethereum mainnet fork: ALPHA and DAI are minted by their owners,
    /// WETH is wrapped by the recipient.
    pub fn mainnet() -> Result<Self> {
        let book = AddressBook::mainnet()?;
        Ok(Self::new("mainnet")
            .with_rule(book.require("ALPHA")?.clone(), TokenRule::OwnerMint)
            .with_rule(book.require("DAI")?.clone(), TokenRule::OwnerMintTo)
            .with_rule(book.require("WETH")?.clone(), TokenRule::WrappedNative))
    }

    /// Parses and validates a JSON policy table.
    ///
    /// # Arguments
    ///
    /// * `json` - A document in the format shown in the module docs.
    ///
    /// # Returns
    ///
    /// The validated config, or [`BootstrapError::Config`] when the JSON is
    /// malformed, a rule key is not a valid address or account, or
    /// [`FundingConfig::validate`] rejects the values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON policy table from disk. See [`FundingConfig::from_json_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            BootstrapError::Config(format!("reading {}: {e}", path.as_ref().display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Loads the file named by `FUNDING_CONFIG`, or the mainnet preset when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::from_path(path.trim()),
            _ => Self::mainnet(),
        }
    }

    /// Checks the values serde cannot: slippage fraction, pool-share symbol,
    /// scale exponent and at most one wrapped native token.
    pub fn validate(&self) -> Result<()> {
        self.slippage.validate()?;
        if self.scale_exponent > MAX_SCALE_EXPONENT {
            return Err(BootstrapError::Config(format!(
                "scale exponent {} exceeds {MAX_SCALE_EXPONENT}",
                self.scale_exponent
            )));
        }
        if self.pool_share_symbol.is_empty() {
            return Err(BootstrapError::Config(
                "pool share symbol must not be empty".to_string(),
            ));
        }
        let wrapped = self
            .rules
            .values()
            .filter(|rule| **rule == TokenRule::WrappedNative)
            .count();
        if wrapped > 1 {
            return Err(BootstrapError::Config(format!(
                "{} tokens marked wrapped_native on {}",
                wrapped, self.network
            )));
        }
        Ok(())
    }

    /// Adds or replaces the rule for one token.
    ///
    /// # Arguments
    ///
    /// * `token` - The token contract, as stored on chain. Addresses are compared
    ///   verbatim here, so pass them lowercase (as [`parse_address`] returns them).
    /// * `rule` - How that token is funded.
    ///
    /// # Returns
    ///
    /// The updated config, for chaining.
    pub fn with_rule(mut self, token: AccountId, rule: TokenRule) -> Self {
        self.rules.insert(token, rule);
        self
    }

    pub fn with_pool_share_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.pool_share_symbol = symbol.into();
        self
    }

    /// Sets the default amount to `10^exponent` whole tokens. Values above
    /// [`MAX_SCALE_EXPONENT`] are only caught by [`FundingConfig::validate`].
    pub fn with_scale_exponent(mut self, exponent: u32) -> Self {
        self.scale_exponent = exponent;
        self
    }

    /// Native amount forwarded to an impersonated owner before it mints.
    pub fn with_gas_stipend(mut self, stipend: NearToken) -> Self {
        self.gas_stipend = U128(stipend.as_yoctonear());
        self
    }

    pub fn with_slippage(mut self, slippage: Margin) -> Self {
        self.slippage = slippage;
        self
    }

    /// Looks up the explicit rule for a token.
    ///
    /// # Returns
    ///
    /// `None` when the token has no rule; the caller then falls back to the
    /// pool-share symbol check.
    pub fn rule_for(&self, token: &AccountId) -> Option<TokenRule> {
        self.rules.get(token).copied()
    }

    /// The token marked `wrapped_native`, if any.
    pub fn wrapped_native(&self) -> Option<&AccountId> {
        self.rules
            .iter()
            .find(|(_, rule)| **rule == TokenRule::WrappedNative)
            .map(|(token, _)| token)
    }

    pub fn gas_stipend(&self) -> NearToken {
        NearToken::from_yoctonear(self.gas_stipend.0)
    }
}
