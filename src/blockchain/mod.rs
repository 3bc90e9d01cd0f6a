//! Per-chain address and signing rules behind the `ChainSigner` capability.

pub mod bitcoin;
pub mod bitcoin_cash;
pub mod ethereum;
pub mod traits;
pub mod tron;

pub use traits::{ChainSigner, KeySource, SignedTransaction};

use crate::core::domain::ChainType;

static BITCOIN: bitcoin::BitcoinSigner = bitcoin::BitcoinSigner;
static BITCOIN_CASH: bitcoin_cash::BitcoinCashSigner = bitcoin_cash::BitcoinCashSigner;
static ETHEREUM: ethereum::EthereumSigner = ethereum::EthereumSigner;
static TRON: tron::TronSigner = tron::TronSigner;

/// The signing strategy for `chain`.
pub fn signer_for(chain: ChainType) -> &'static dyn ChainSigner {
    match chain {
        ChainType::Bitcoin => &BITCOIN,
        ChainType::BitcoinCash => &BITCOIN_CASH,
        ChainType::Ethereum => &ETHEREUM,
        ChainType::Tron => &TRON,
    }
}
