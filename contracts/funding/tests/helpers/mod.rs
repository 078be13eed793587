//! # Test Helpers Module
//!
//! Shared setup for the simulated-chain integration tests.
//!
//! ## Modules
//!
//! - [`test_builder`]: Builder pattern for funding scenarios
//!
//! ## Key Functions
//!
//! - [`init_tracing`]: Routes `tracing` output through the test harness
//! - [`units`]: Whole-token amounts for a given number of decimals

use funded_accounts::amount::pow10;
use funded_accounts::{Amount, U256};

pub mod test_builder;

/// Error type shared by every integration test.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Path to the committed mainnet policy table.
#[allow(dead_code)]
pub const MAINNET_CONFIG_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/config/mainnet.json");

/// Installs a subscriber once per test binary. `RUST_LOG` controls the filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `whole * 10^decimals`.
#[allow(dead_code)]
pub fn units(whole: u64, decimals: u8) -> TestResult<Amount> {
    Ok(U256::from(whole) * pow10(u32::from(decimals))?)
}
