use crate::core::errors::WalletError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chains the core can derive addresses for and sign on.
///
/// Adding a chain means adding a variant here and a `ChainSigner` impl in
/// `blockchain`; nothing dispatches on chain name strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChainType {
    #[serde(alias = "BTC")]
    Bitcoin,
    #[serde(alias = "BCH")]
    BitcoinCash,
    #[serde(alias = "ETH")]
    Ethereum,
    #[serde(alias = "TRX")]
    Tron,
}

impl ChainType {
    pub fn symbol(&self) -> &'static str {
        match self {
            ChainType::Bitcoin => "BTC",
            ChainType::BitcoinCash => "BCH",
            ChainType::Ethereum => "ETH",
            ChainType::Tron => "TRX",
        }
    }

    /// SLIP-44 coin type. Bitcoin-family testnets share coin 1.
    pub fn coin_type(&self, network: Network) -> u32 {
        match (self, network) {
            (ChainType::Bitcoin | ChainType::BitcoinCash, Network::Testnet) => 1,
            (ChainType::Bitcoin, Network::Mainnet) => 0,
            (ChainType::BitcoinCash, Network::Mainnet) => 145,
            (ChainType::Ethereum, _) => 60,
            (ChainType::Tron, _) => 195,
        }
    }

    /// UTXO chains with WIF keys and external/internal address chains.
    pub fn is_bitcoin_family(&self) -> bool {
        matches!(self, ChainType::Bitcoin | ChainType::BitcoinCash)
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for ChainType {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BITCOIN" | "BTC" => Ok(ChainType::Bitcoin),
            "BITCOINCASH" | "BCH" => Ok(ChainType::BitcoinCash),
            "ETHEREUM" | "ETH" => Ok(ChainType::Ethereum),
            "TRON" | "TRX" => Ok(ChainType::Tron),
            _ => Err(WalletError::ValidationError(format!("unsupported_chain: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn to_bitcoin(self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
        }
    }
}

/// Bitcoin script type of the derived address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SegWit {
    /// P2PKH
    #[default]
    None,
    /// P2WPKH nested in P2SH (`3...`)
    P2wpkh,
    /// Native bech32 P2WPKH (`bc1q...`)
    Segwit,
}

impl SegWit {
    /// BIP44, BIP49 or BIP84 purpose of the default path.
    pub fn purpose(&self) -> u32 {
        match self {
            SegWit::None => 44,
            SegWit::P2wpkh => 49,
            SegWit::Segwit => 84,
        }
    }
}

/// Chain selection carried by import and signing requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainParams {
    pub chain_type: ChainType,
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub seg_wit: SegWit,
    /// Full derivation path; the chain default when absent or empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ChainParams {
    pub fn new(chain_type: ChainType) -> Self {
        Self { chain_type, network: Network::Mainnet, seg_wit: SegWit::None, path: None }
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn with_seg_wit(mut self, seg_wit: SegWit) -> Self {
        self.seg_wit = seg_wit;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// The path if one was given, ignoring blank strings.
    pub fn explicit_path(&self) -> Option<&str> {
        self.path.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        if self.seg_wit != SegWit::None && self.chain_type != ChainType::Bitcoin {
            return Err(WalletError::ValidationError(format!(
                "segwit_unsupported: {}",
                self.chain_type
            )));
        }
        Ok(())
    }
}
