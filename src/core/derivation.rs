//! BIP32/BIP44 derivation and address computation.
//!
//! Everything here is a pure function of (seed, path, chain params): the same
//! inputs always give the same keys and addresses, which `find_by_*` and the
//! external address calls rely on.

use crate::blockchain::signer_for;
use crate::core::domain::{ChainParams, ChainType, Network, SegWit};
use crate::core::errors::WalletError;
use crate::security::secret::PrivateKeyBytes;
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::{All, PublicKey, Secp256k1};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use zeroize::Zeroizing;

/// Shared secp256k1 context; building one per call is expensive.
pub static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Default paths per chain and address type.
pub mod paths {
    pub const BITCOIN: &str = "m/44'/0'/0'/0/0";
    pub const BITCOIN_TESTNET: &str = "m/44'/1'/0'/0/0";
    pub const BITCOIN_P2WPKH: &str = "m/49'/0'/0'/0/0";
    pub const BITCOIN_P2WPKH_TESTNET: &str = "m/49'/1'/0'/0/0";
    pub const BITCOIN_SEGWIT: &str = "m/84'/0'/0'/0/0";
    pub const BITCOIN_SEGWIT_TESTNET: &str = "m/84'/1'/0'/0/0";
    pub const BITCOIN_CASH: &str = "m/44'/145'/0'/0/0";
    pub const ETHEREUM: &str = "m/44'/60'/0'/0/0";
    pub const TRON: &str = "m/44'/195'/0'/0/0";
}

const HARDENED_LIMIT: u32 = 1 << 31;

/// A BIP44 path `m/purpose'/coin'/account'/change/index` tagged with its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathDescriptor {
    pub chain: ChainType,
    pub purpose: u32,
    pub coin_type: u32,
    pub account: u32,
    pub change: u32,
    pub index: u32,
}

impl PathDescriptor {
    /// First receiving key of account 0. The purpose follows the address
    /// type: 44 for P2PKH, 49 for nested and 84 for native SegWit.
    pub fn default_for(chain: ChainType, network: Network, seg_wit: SegWit) -> Self {
        Self {
            chain,
            purpose: seg_wit.purpose(),
            coin_type: chain.coin_type(network),
            account: 0,
            change: 0,
            index: 0,
        }
    }

    /// The explicit path in `params`, or the chain default.
    pub fn from_params(params: &ChainParams) -> Result<Self, WalletError> {
        match params.explicit_path() {
            Some(path) => Self::parse(params.chain_type, path),
            None => Ok(Self::default_for(params.chain_type, params.network, params.seg_wit)),
        }
    }

    /// Parse `m/44'/0'/0'/0/0`. The first three levels must be hardened
    /// (`'` or `h`) and the last two must not.
    pub fn parse(chain: ChainType, path: &str) -> Result<Self, WalletError> {
        let invalid = || WalletError::ValidationError(format!("derivation_path_invalid: {}", path));

        let mut parts = path.trim().split('/');
        if parts.next() != Some("m") {
            return Err(invalid());
        }
        let segments: Vec<&str> = parts.collect();
        if segments.len() != 5 {
            return Err(invalid());
        }

        let mut values = [0u32; 5];
        for (i, segment) in segments.iter().enumerate() {
            let (digits, hardened) = match segment.strip_suffix('\'').or_else(|| segment.strip_suffix('h')) {
                Some(d) => (d, true),
                None => (*segment, false),
            };
            if hardened != (i < 3) {
                return Err(invalid());
            }
            values[i] = parse_index(digits).ok_or_else(invalid)?;
        }

        Ok(Self {
            chain,
            purpose: values[0],
            coin_type: values[1],
            account: values[2],
            change: values[3],
            index: values[4],
        })
    }

    /// Same account, different `change/index` given as `"c/i"`.
    pub fn with_relative(&self, relative: &str) -> Result<Self, WalletError> {
        let invalid = || WalletError::ValidationError(format!("relative_path_invalid: {}", relative));
        let mut parts = relative.trim().split('/');
        let change = parts.next().and_then(parse_index).ok_or_else(invalid)?;
        let index = parts.next().and_then(parse_index).ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self { change, index, ..*self })
    }

    /// Receiving address `i` of this account.
    pub fn external(&self, index: u32) -> Self {
        Self { change: 0, index, ..*self }
    }

    pub fn to_bip32(&self) -> Result<DerivationPath, WalletError> {
        let mut children = self.account_children()?;
        children.push(ChildNumber::from_normal_idx(self.change)?);
        children.push(ChildNumber::from_normal_idx(self.index)?);
        Ok(DerivationPath::from(children))
    }

    pub fn account_bip32(&self) -> Result<DerivationPath, WalletError> {
        Ok(DerivationPath::from(self.account_children()?))
    }

    fn account_children(&self) -> Result<Vec<ChildNumber>, WalletError> {
        Ok(vec![
            ChildNumber::from_hardened_idx(self.purpose)?,
            ChildNumber::from_hardened_idx(self.coin_type)?,
            ChildNumber::from_hardened_idx(self.account)?,
        ])
    }
}

impl fmt::Display for PathDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m/{}'/{}'/{}'/{}/{}",
            self.purpose, self.coin_type, self.account, self.change, self.index
        )
    }
}

fn parse_index(s: &str) -> Option<u32> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse::<u32>().ok().filter(|v| *v < HARDENED_LIMIT)
}

/// An address derived for a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedAddress {
    pub chain_type: ChainType,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Compressed SEC1 public key, hex
    pub public_key: String,
}

fn master_key(seed: &[u8], network: Network) -> Result<Xpriv, WalletError> {
    Ok(Xpriv::new_master(network.to_bitcoin(), seed)?)
}

/// Private key at `path`, in a zeroizing buffer.
pub fn derive_private_key(seed: &[u8], path: &PathDescriptor, network: Network) -> Result<PrivateKeyBytes, WalletError> {
    debug!(chain = %path.chain, path = %path, "deriving private key");
    let xpriv = master_key(seed, network)?.derive_priv(&*SECP, &path.to_bip32()?)?;
    Ok(Zeroizing::new(xpriv.private_key.secret_bytes()))
}

/// Serialized extended public key at an arbitrary BIP32 path.
pub fn extended_public_key(seed: &[u8], path: &DerivationPath, network: Network) -> Result<String, WalletError> {
    let xpriv = master_key(seed, network)?.derive_priv(&*SECP, path)?;
    Ok(Xpub::from_priv(&*SECP, &xpriv).to_string())
}

/// Account-level xpub (`m/44'/coin'/account'`), from which every external
/// and internal address of the wallet can be recomputed.
pub fn account_xpub(seed: &[u8], path: &PathDescriptor, network: Network) -> Result<String, WalletError> {
    extended_public_key(seed, &path.account_bip32()?, network)
}

/// Public key `change/index` below an account-level xpub. Needs no secret.
pub fn public_key_from_xpub(xpub: &str, change: u32, index: u32) -> Result<PublicKey, WalletError> {
    let account = Xpub::from_str(xpub).map_err(|e| WalletError::CryptoError(format!("xpub_invalid: {}", e)))?;
    let path = [ChildNumber::from_normal_idx(change)?, ChildNumber::from_normal_idx(index)?];
    Ok(account.derive_pub(&*SECP, &path)?.public_key)
}

/// Address of a single private key under `params`.
pub fn address_from_private_key(private_key: &[u8], params: &ChainParams) -> Result<DerivedAddress, WalletError> {
    let public_key = crate::blockchain::traits::public_key_of(private_key)?;
    address_from_public_key(&public_key, params, None)
}

pub fn address_from_public_key(
    public_key: &PublicKey,
    params: &ChainParams,
    path: Option<&PathDescriptor>,
) -> Result<DerivedAddress, WalletError> {
    let address = signer_for(params.chain_type).encode_address(public_key, params)?;
    Ok(DerivedAddress {
        chain_type: params.chain_type,
        address,
        path: path.map(|p| p.to_string()),
        public_key: hex::encode(public_key.serialize()),
    })
}

/// Key and address at `path` under the chain rules of `params`.
pub fn derive_address(seed: &[u8], path: &PathDescriptor, params: &ChainParams) -> Result<DerivedAddress, WalletError> {
    let private_key = derive_private_key(seed, path, params.network)?;
    let public_key = crate::blockchain::traits::public_key_of(private_key.as_ref())?;
    address_from_public_key(&public_key, params, Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn seed_of(phrase: &str) -> Vec<u8> {
        bip39::Mnemonic::parse_normalized(phrase).unwrap().to_seed_normalized("").to_vec()
    }

    #[test]
    fn test_parse_and_format() {
        let path = PathDescriptor::parse(ChainType::Bitcoin, "m/44'/0'/0'/0/7").unwrap();
        assert_eq!(path.index, 7);
        assert_eq!(path.to_string(), "m/44'/0'/0'/0/7");

        let h = PathDescriptor::parse(ChainType::Bitcoin, "m/44h/0h/0h/1/2").unwrap();
        assert_eq!(h.to_string(), "m/44'/0'/0'/1/2");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "m", "44'/0'/0'/0/0", "m/44'/0'/0'/0", "m/44/0'/0'/0/0", "m/44'/0'/0'/0'/0", "m/44'/0'/x'/0/0"] {
            assert!(PathDescriptor::parse(ChainType::Bitcoin, bad).is_err(), "{}", bad);
        }
        assert!(PathDescriptor::parse(ChainType::Bitcoin, "m/44'/0'/0'/0/2147483648").is_err());
    }

    #[test]
    fn test_external_internal() {
        let base = PathDescriptor::default_for(ChainType::BitcoinCash, Network::Mainnet, SegWit::None);
        assert_eq!(base.to_string(), paths::BITCOIN_CASH);
        assert_eq!(base.external(3).to_string(), "m/44'/145'/0'/0/3");
        assert_eq!(base.with_relative("1/5").unwrap().to_string(), "m/44'/145'/0'/1/5");
        assert!(base.with_relative("1").is_err());
        assert!(base.with_relative("1/2/3").is_err());
    }

    #[test]
    fn test_default_paths() {
        let default = |chain, network, seg_wit| PathDescriptor::default_for(chain, network, seg_wit).to_string();
        assert_eq!(default(ChainType::Bitcoin, Network::Testnet, SegWit::None), paths::BITCOIN_TESTNET);
        assert_eq!(default(ChainType::Bitcoin, Network::Mainnet, SegWit::P2wpkh), paths::BITCOIN_P2WPKH);
        assert_eq!(default(ChainType::Bitcoin, Network::Testnet, SegWit::P2wpkh), paths::BITCOIN_P2WPKH_TESTNET);
        assert_eq!(default(ChainType::Bitcoin, Network::Mainnet, SegWit::Segwit), paths::BITCOIN_SEGWIT);
        assert_eq!(default(ChainType::Bitcoin, Network::Testnet, SegWit::Segwit), paths::BITCOIN_SEGWIT_TESTNET);
        assert_eq!(default(ChainType::BitcoinCash, Network::Testnet, SegWit::None), "m/44'/1'/0'/0/0");
        assert_eq!(default(ChainType::Ethereum, Network::Mainnet, SegWit::None), paths::ETHEREUM);
        assert_eq!(default(ChainType::Tron, Network::Mainnet, SegWit::None), paths::TRON);
    }

    #[test]
    fn test_reference_vectors() {
        let seed = seed_of(ABANDON);
        let btc = ChainParams::new(ChainType::Bitcoin);
        let path = PathDescriptor::from_params(&btc).unwrap();
        assert_eq!(derive_address(&seed, &path, &btc).unwrap().address, "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA");

        let eth = ChainParams::new(ChainType::Ethereum);
        let path = PathDescriptor::from_params(&eth).unwrap();
        assert_eq!(
            derive_address(&seed, &path, &eth).unwrap().address,
            "0x9858EfFD232B4033E47d90003D41EC34EcaEda94"
        );
    }

    #[test]
    fn test_bitcoin_cash_vectors() {
        let seed = seed_of("inject kidney empty canal shadow pact comfort wife crush horse wife sketch");
        let params = ChainParams::new(ChainType::BitcoinCash);
        let base = PathDescriptor::from_params(&params).unwrap();
        assert_eq!(
            derive_address(&seed, &base, &params).unwrap().address,
            "qzld7dav7d2sfjdl6x9snkvf6raj8lfxjcj5fa8y2r"
        );
        assert_eq!(
            derive_address(&seed, &base.external(1), &params).unwrap().address,
            "qzyrtfn4a7cdkn7sp60tw7hl8zndt0tk0sst3p6qr5"
        );
        assert_eq!(
            derive_address(&seed, &base.external(2), &params).unwrap().address,
            "qzhsz3s4hr0f3x0v00zdn6w50tdpa9zgryp4kxgx49"
        );
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let seed = seed_of(ABANDON);
        let params = ChainParams::new(ChainType::Bitcoin).with_seg_wit(SegWit::Segwit);
        let path = PathDescriptor::from_params(&params).unwrap();
        let a = derive_address(&seed, &path, &params).unwrap();
        let b = derive_address(&seed, &path, &params).unwrap();
        assert_eq!(a, b);
        assert!(a.address.starts_with("bc1q"));
        assert_eq!(
            extended_public_key(&seed, &path.to_bip32().unwrap(), Network::Mainnet).unwrap(),
            extended_public_key(&seed, &path.to_bip32().unwrap(), Network::Mainnet).unwrap()
        );
        assert!(account_xpub(&seed, &path, Network::Mainnet).unwrap().starts_with("xpub"));
    }

    #[test]
    fn test_xpub_matches_private_derivation() {
        let seed = seed_of(ABANDON);
        let params = ChainParams::new(ChainType::Bitcoin);
        let base = PathDescriptor::from_params(&params).unwrap();
        let xpub = account_xpub(&seed, &base, Network::Mainnet).unwrap();
        for (change, index) in [(0, 0), (0, 4), (1, 2)] {
            let from_xpub = public_key_from_xpub(&xpub, change, index).unwrap();
            let derived = derive_address(&seed, &base.with_relative(&format!("{}/{}", change, index)).unwrap(), &params).unwrap();
            assert_eq!(hex::encode(from_xpub.serialize()), derived.public_key);
        }
    }
}
