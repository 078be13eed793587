//! # Contract Registry
//!
//! Names of the contract artifacts the lending-protocol fixtures deploy or
//! bind to, and the static address book of the mainnet fork the integration
//! tests run against.
//!
//! Addresses are stored as lowercase `0x`-prefixed account ids, which NEAR
//! also accepts as Ethereum-implicit accounts, so one [`AccountId`] type
//! covers both the fork table and sandbox-created accounts.

use crate::error::{BootstrapError, Result};
use near_sdk::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

macro_rules! contract_names {
    ($($variant:ident => $name:literal,)+) => {
        /// Artifact names, as the deployment tooling spells them.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "&'static str")]
        pub enum ContractName {
            $($variant,)+
        }

        impl ContractName {
            pub const ALL: &'static [ContractName] = &[$(ContractName::$variant,)+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ContractName::$variant => $name,)+
                }
            }
        }

        impl FromStr for ContractName {
            type Err = BootstrapError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($name => Ok(ContractName::$variant),)+
                    other => Err(BootstrapError::UnknownContract(other.to_string())),
                }
            }
        }
    };
}

contract_names! {
    // Token
    Erc20 => "ERC20",
    IErc20 => "IERC20",
    MockWeth => "MockWETH",
    MockErc20 => "MockERC20",
    MockCErc20 => "MockCErc20",
    MockCErc20V2 => "MockCErc20_2",

    // Wrapper
    WErc20 => "WERC20",
    WMasterChef => "WMasterChef",
    WLiquidityGauge => "WLiquidityGauge",
    WStakingRewards => "WStakingRewards",

    // Oracles
    SimpleOracle => "SimpleOracle",
    CoreOracle => "CoreOracle",
    ProxyOracle => "ProxyOracle",
    UniswapV2Oracle => "UniswapV2Oracle",
    BalancerPairOracle => "BalancerPairOracle",
    Erc20Kp3rOracle => "ERC20KP3ROracle",
    CurveOracle => "CurveOracle",

    // Uniswap
    MockUniswapV2Factory => "MockUniswapV2Factory",
    MockUniswapV2Router02 => "MockUniswapV2Router02",

    // Protocol
    BlueBerryBank => "BlueBerryBank",
    SafeBox => "SafeBox",
    SafeBoxEth => "SafeBoxETH",

    // Spell
    UniswapV2SpellV1 => "UniswapV2SpellV1",
    SushiswapSpellV1 => "SushiswapSpellV1",
    BalancerSpellV1 => "BalancerSpellV1",
    CurveSpellV1 => "CurveSpellV1",

    // Interface
    IBalancerPool => "IBalancerPool",
    ICErc20 => "ICErc20",
    IErc20Ex => "IERC20Ex",
    ICEtherEx => "ICEtherEx",
    ICurvePool => "ICurvePool",
    IComptroller => "IComptroller",
    ICurveRegistry => "ICurveRegistry",
    IbEthRouterV2 => "IbETHRouterV2",
    IUniswapV2Pair => "IUniswapV2Pair",
    IUniswapV2Router02 => "IUniswapV2Router02",
}

impl fmt::Display for ContractName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ContractName {
    type Error = BootstrapError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ContractName> for &'static str {
    fn from(name: ContractName) -> Self {
        name.as_str()
    }
}

/// Validates a `0x` + 40 hex digit address and returns it as a lowercase account id.
pub fn parse_address(raw: &str) -> Result<AccountId> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| BootstrapError::Config(format!("address `{raw}` lacks the 0x prefix")))?;
    let bytes = hex::decode(digits)
        .map_err(|e| BootstrapError::Config(format!("address `{raw}` is not hex: {e}")))?;
    if bytes.len() != 20 {
        return Err(BootstrapError::Config(format!(
            "address `{raw}` is {} bytes, expected 20",
            bytes.len()
        )));
    }
    format!("0x{}", hex::encode(bytes))
        .parse()
        .map_err(|e| BootstrapError::Config(format!("address `{raw}`: {e}")))
}

const MAINNET: &[(&str, &str)] = &[
    // Tokens
    ("DAI", "0x6B175474E89094C44Da98b954EedeAC495271d0F"),
    ("DPI", "0x1494ca1f11d487c2bbe4543e90080aeba4ba3c2b"),
    ("ETH", "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE"),
    ("INDEX", "0x0954906da0Bf32d5479e25f46056d22f08464cab"),
    ("PERP", "0xbC396689893D065F41bc2C6EcbeE5e0085233447"),
    ("SNX", "0xc011a73ee8576fb46f5e1c5751ca3b9fe0af2a6f"),
    ("USDT", "0xdac17f958d2ee523a2206206994597c13d831ec7"),
    ("USDC", "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
    ("WBTC", "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599"),
    ("WETH", "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
    ("crETH", "0xD06527D5e56A3495252A528C4987003b712860eE"),
    ("crDAI", "0x92b767185fb3b04f881e3ac8e5b0662a027a1d9f"),
    ("crUSDC", "0x44fbebd2f576670a6c33f6fc0b00aa8c5753b322"),
    ("crUSDT", "0x797AAB1ce7c01eB727ab980762bA88e7133d2157"),
    // LP
    ("UNI_V2_USDT_USDC", "0x3041cbd36888becc7bbcbc0045e3b1f144466f5f"),
    ("UNI_V2_DPI_WETH", "0x4d5ef58aAc27d99935E5b6B4A6778ff292059991"),
    ("UNI_V2_DAI_WETH", "0xa478c2975ab1ea89e8196811f51a7b7ade33eb11"),
    ("UNI_V2_USDT_WETH", "0x0d4a11d5eeaac28ec3f61d100daf4d40471f1852"),
    ("UNI_V2_USDC_WETH", "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc"),
    ("UNI_V2_WBTC_WETH", "0xbb2b8038a1640196fbe3e38816f3e67cba72d940"),
    ("SUSHI_WETH_USDT", "0x06da0fd433c1a5d7a4faa01111c044910a184553"),
    ("BAL_WETH_DAI_8020", "0x8b6e6e7b5b3801fed2cafd4b22b8a16c2f2db21a"),
    ("BAL_PERP_USDC_8020", "0xF54025aF2dc86809Be1153c1F20D77ADB7e8ecF4"),
    ("CRV_3Crv", "0x6c3f90f043a72fa612cbac8115ee7e52bde6e490"),
    // Oracle
    ("Keep3rV1Oracle", "0x73353801921417F465377c8d898c6f4C0270282C"),
    ("StdRef", "0xDA7a001b254CD22e46d3eAB04d937489c93174C3"),
    // Routers and pairs
    ("UNI_V2_ROUTER", "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"),
    ("UNI_V2_PAIR", "0xf79a07cd3488BBaFB86dF1bAd09a6168D935c017"),
    ("SUSHI_ROUTER", "0xd9e1cE17f2641f24aE83637ab66a2cca9C378B9F"),
    // Wrapper
    ("SUSHI_MASTERCHEF", "0xc2EdaD668740f1aA35E4D8f227fB8E17dcA888Cd"),
    ("CRV_GAUGE", "0x7D86446dDb609eD0F5f8684AcF30380a356b2B4c"),
    ("CRV_3Crv_POOL", "0xbEbc44782C7dB0a1A60Cb6fe97d0b483032FF1C7"),
    ("IC_DPI_STAKING_REWARDS", "0xB93b505Ed567982E2b6756177ddD23ab5745f309"),
    ("PERP_BALANCER_LP_REWARDS", "0xb9840a4a8a671f79de3df3b812feeb38047ce552"),
    // Protocol
    ("ALPHA", "0xa1faa113cbE53436Df28FF0aEe54275c13B40975"),
    ("IBETHV2", "0xeEa3311250FE4c3268F8E684f7C87A82fF183Ec1"),
    ("Comptroller", "0x3d5BC3c8d13dcB8bF317092d84783c2697AE9258"),
];

/// Labelled addresses for one network.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBook {
    entries: BTreeMap<String, AccountId>,
}

impl AddressBook {
    /// Builds a book from `(label, address)` pairs, validating every address.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let entries = pairs
            .into_iter()
            .map(|(label, raw)| Ok((label.to_string(), parse_address(raw)?)))
            .collect::<Result<_>>()?;
        Ok(Self { entries })
    }

    /// The Ethereum mainnet fork table.
    pub fn mainnet() -> Result<Self> {
        Self::from_pairs(MAINNET.iter().copied())
    }

    /// Looks up a label such as `"DAI"`. Labels are case-sensitive.
    pub fn get(&self, label: &str) -> Option<&AccountId> {
        self.entries.get(label)
    }

    /// Like [`AddressBook::get`], but a missing label is an error.
    ///
    /// # Returns
    ///
    /// The lowercase address, or [`BootstrapError::Config`] naming the label.
    pub fn require(&self, label: &str) -> Result<&AccountId> {
        self.get(label)
            .ok_or_else(|| BootstrapError::Config(format!("address book has no entry `{label}`")))
    }

    /// Reverse lookup, handy in log output.
    pub fn label_of(&self, address: &AccountId) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, candidate)| *candidate == address)
            .map(|(label, _)| label.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_names_round_trip_through_strings() {
        for name in ContractName::ALL {
            assert_eq!(name.as_str().parse::<ContractName>().unwrap(), *name);
        }
        assert_eq!(ContractName::MockCErc20V2.to_string(), "MockCErc20_2");
        assert!(matches!(
            "NotAContract".parse::<ContractName>(),
            Err(BootstrapError::UnknownContract(_))
        ));
    }

    #[test]
    fn contract_names_serialize_as_artifact_names() {
        let json = serde_json::to_string(&ContractName::IbEthRouterV2).unwrap();
        assert_eq!(json, "\"IbETHRouterV2\"");
        let back: ContractName = serde_json::from_str("\"BalancerSpellV1\"").unwrap();
        assert_eq!(back, ContractName::BalancerSpellV1);
    }

    #[test]
    fn addresses_are_lowercased() {
        let dai = parse_address("0x6B175474E89094C44Da98b954EedeAC495271d0F").unwrap();
        assert_eq!(dai.as_str(), "0x6b175474e89094c44da98b954eedeac495271d0f");
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        assert!(parse_address("6b175474e89094c44da98b954eedeac495271d0f").is_err());
        assert!(parse_address("0x6b17").is_err());
        assert!(parse_address("0xzz175474e89094c44da98b954eedeac495271d0f").is_err());
    }

    #[test]
    fn mainnet_book_resolves_every_entry() {
        let book = AddressBook::mainnet().unwrap();
        assert_eq!(book.len(), MAINNET.len());
        assert_eq!(
            book.require("WETH").unwrap().as_str(),
            "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"
        );
        let alpha = book.require("ALPHA").unwrap().clone();
        assert_eq!(book.label_of(&alpha), Some("ALPHA"));
        assert!(book.require("NOPE").is_err());
    }
}
