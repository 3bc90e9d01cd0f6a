//! Bitcoin address encoding and validation.
//!
//! Three script types are supported:
//! - P2PKH: `1...` / `m...`
//! - P2SH-P2WPKH: `3...` / `2...`
//! - P2WPKH: `bc1q...` / `tb1q...`

use crate::core::domain::{Network, SegWit};
use crate::core::errors::WalletError;
use crate::security::secret::PrivateKeyBytes;
use bitcoin::address::Address;
use bitcoin::secp256k1::PublicKey as Secp256k1PublicKey;
use bitcoin::{PrivateKey, PublicKey as BitcoinPublicKey, ScriptBuf};
use std::str::FromStr;
use tracing::debug;
use zeroize::Zeroizing;

pub struct BitcoinAddress;

impl BitcoinAddress {
    /// Encode `public_key` (always compressed) as the address for `seg_wit`.
    pub fn from_public_key(
        public_key: &Secp256k1PublicKey,
        seg_wit: SegWit,
        network: Network,
    ) -> Result<String, WalletError> {
        let btc_pubkey = BitcoinPublicKey::new(*public_key);
        let network = network.to_bitcoin();
        let address = match seg_wit {
            SegWit::None => Address::p2pkh(&btc_pubkey, network),
            SegWit::P2wpkh => Address::p2shwpkh(&btc_pubkey, network)
                .map_err(|e| WalletError::CryptoError(format!("p2sh-p2wpkh address: {}", e)))?,
            SegWit::Segwit => Address::p2wpkh(&btc_pubkey, network)
                .map_err(|e| WalletError::CryptoError(format!("p2wpkh address: {}", e)))?,
        };
        debug!(?seg_wit, "encoded bitcoin address");
        Ok(address.to_string())
    }

    pub fn validate(address: &str, network: Network) -> bool {
        Address::from_str(address)
            .map(|a| a.is_valid_for_network(network.to_bitcoin()))
            .unwrap_or(false)
    }

    /// Output script paying to `address` on `network`.
    pub fn script_pubkey(address: &str, network: Network) -> Result<ScriptBuf, WalletError> {
        let address = Address::from_str(address)
            .map_err(|e| WalletError::ValidationError(format!("address_invalid: {}", e)))?
            .require_network(network.to_bitcoin())
            .map_err(|_| WalletError::ValidationError("address_network_mismatch".to_string()))?;
        Ok(address.script_pubkey())
    }
}

/// Decode a WIF key, checking it belongs to `network`.
pub fn parse_wif(wif: &str, network: Network) -> Result<PrivateKeyBytes, WalletError> {
    let key = PrivateKey::from_wif(wif.trim())
        .map_err(|_| WalletError::ValidationError("private_key_invalid".to_string()))?;
    if key.network != network.to_bitcoin() {
        return Err(WalletError::ValidationError("private_key_network_mismatch".to_string()));
    }
    Ok(Zeroizing::new(key.inner.secret_bytes()))
}

/// Compressed WIF for `private_key`.
pub fn to_wif(private_key: &[u8], network: Network) -> Result<String, WalletError> {
    let secret = bitcoin::secp256k1::SecretKey::from_slice(private_key)
        .map_err(|e| WalletError::CryptoError(format!("Invalid secret key: {}", e)))?;
    Ok(PrivateKey::new(secret, network.to_bitcoin()).to_wif())
}
