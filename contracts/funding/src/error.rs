//! # Errors
//!
//! Every failure during token acquisition propagates to the calling test.
//! Nothing here is retried; the variants only classify what went wrong.

use near_sdk::AccountId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BootstrapError>;

#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The environment refused to sign on behalf of the account.
    #[error("impersonation of `{0}` denied by the environment")]
    ImpersonationDenied(AccountId),

    /// A mint, transfer, approve, join or native transfer failed on chain.
    #[error("`{method}` on `{contract}` reverted: {reason}")]
    CallReverted {
        contract: AccountId,
        method: &'static str,
        reason: String,
    },

    #[error("amount overflow: {0}")]
    AmountOverflow(String),

    /// A pool lists itself among its constituents, directly or through another pool.
    #[error("pool `{0}` is its own constituent")]
    CyclicComposition(AccountId),

    #[error("pool `{0}` reports no constituent tokens")]
    EmptyPool(AccountId),

    /// Wrapped native tokens are never minted here; the recipient wraps its own balance.
    #[error("recipient `{recipient}` holds no native balance to wrap into `{token}`")]
    WrappedNativeUnfunded { token: AccountId, recipient: AccountId },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unknown contract name `{0}`")]
    UnknownContract(String),
}

impl BootstrapError {
    pub fn reverted(contract: &AccountId, method: &'static str, reason: impl Into<String>) -> Self {
        Self::CallReverted {
            contract: contract.clone(),
            method,
            reason: reason.into(),
        }
    }

    /// Returns the revert reason when the error came from a failed call.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::CallReverted { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BootstrapError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for BootstrapError {
    fn from(err: std::io::Error) -> Self {
        Self::Config(err.to_string())
    }
}
