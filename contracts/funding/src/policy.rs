//! # Funding Policy
//!
//! Maps a resolved token onto the strategy used to fund it. Address rules
//! from the [`FundingConfig`] take precedence; a token without a rule is
//! synthesized through its pool when its symbol marks it as a pool share,
//! and left alone otherwise.

use crate::chain::TokenHandle;
use crate::config::{FundingConfig, TokenRule};
use std::fmt;

/// Which mint entry point an owner-minted token exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MintEntry {
    /// `mint(amount)` credits the owner, followed by a transfer.
    ToOwner,
    /// `mint(recipient, amount)`.
    ToRecipient,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FundingStrategy {
    OwnerMint(MintEntry),
    WrappedNative,
    PoolJoin,
    Unsupported,
}

impl FundingStrategy {
    /// First match wins: address rule, then pool-share symbol.
    pub fn select(config: &FundingConfig, token: &TokenHandle) -> Self {
        if let Some(rule) = config.rule_for(&token.address) {
            return rule.into();
        }
        if token.is_pool_share(&config.pool_share_symbol) {
            FundingStrategy::PoolJoin
        } else {
            FundingStrategy::Unsupported
        }
    }
}

impl From<TokenRule> for FundingStrategy {
    fn from(rule: TokenRule) -> Self {
        match rule {
            TokenRule::OwnerMint => FundingStrategy::OwnerMint(MintEntry::ToOwner),
            TokenRule::OwnerMintTo => FundingStrategy::OwnerMint(MintEntry::ToRecipient),
            TokenRule::WrappedNative => FundingStrategy::WrappedNative,
        }
    }
}

impl fmt::Display for FundingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FundingStrategy::OwnerMint(MintEntry::ToOwner) => "owner_mint",
            FundingStrategy::OwnerMint(MintEntry::ToRecipient) => "owner_mint_to",
            FundingStrategy::WrappedNative => "wrapped_native",
            FundingStrategy::PoolJoin => "pool_join",
            FundingStrategy::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}
