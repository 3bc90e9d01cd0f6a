use serde::{Deserialize, Serialize};

use crate::core::domain::{ChainParams, ChainType, Network};
use crate::core::errors::WalletError;
use crate::security::secret::{key_bytes, PrivateKeyBytes};
use bitcoin::secp256k1::PublicKey;

/// Supplies signing keys for a wallet during one signing call.
///
/// `relative` is a `change/index` suffix below the wallet's account path
/// (`"0/3"`, `"1/0"`); `None` selects the wallet's own address key. Keys are
/// derived on demand and dropped (zeroed) by the caller after use.
pub trait KeySource {
    fn private_key(&self, relative: Option<&str>) -> Result<PrivateKeyBytes, WalletError>;
}

/// Result of a transaction signing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    /// Detached signature hex, for chains where the host assembles the transaction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Fully serialized signed transaction hex
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_tx: Option<String>,
    pub tx_hash: String,
}

/// Per-chain address and signing rules.
///
/// Every supported chain has exactly one implementation, reached through
/// `blockchain::signer_for`.
pub trait ChainSigner: Send + Sync {
    fn chain_type(&self) -> ChainType;

    /// Encode the address of `public_key` under the chain's rules.
    fn encode_address(&self, public_key: &PublicKey, params: &ChainParams) -> Result<String, WalletError>;

    fn is_valid_address(&self, address: &str, network: Network) -> bool;

    /// Sign a human-readable message with the chain's message prefix.
    fn sign_message(&self, private_key: &[u8], message: &[u8]) -> Result<String, WalletError>;

    /// Sign the chain-specific unsigned transaction carried in `tx`.
    fn sign_transaction(
        &self,
        tx: &serde_json::Value,
        keys: &dyn KeySource,
        params: &ChainParams,
    ) -> Result<SignedTransaction, WalletError>;

    /// Parse an imported private key. The default accepts 64 hex characters
    /// with an optional `0x` prefix.
    fn parse_private_key(&self, input: &str, _network: Network) -> Result<PrivateKeyBytes, WalletError> {
        parse_hex_private_key(input)
    }

    /// Render a private key the way the chain's wallets import it.
    fn format_private_key(&self, private_key: &[u8], _network: Network) -> Result<String, WalletError> {
        Ok(hex::encode(private_key))
    }
}

pub fn parse_hex_private_key(input: &str) -> Result<PrivateKeyBytes, WalletError> {
    let trimmed = input.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if hex_part.len() != 64 {
        return Err(WalletError::ValidationError("private_key_invalid".to_string()));
    }
    let raw = zeroize::Zeroizing::new(
        hex::decode(hex_part).map_err(|_| WalletError::ValidationError("private_key_invalid".to_string()))?,
    );
    let key = key_bytes(&raw).ok_or_else(|| WalletError::ValidationError("private_key_invalid".to_string()))?;
    bitcoin::secp256k1::SecretKey::from_slice(key.as_ref())
        .map_err(|_| WalletError::ValidationError("private_key_invalid".to_string()))?;
    Ok(key)
}

/// Compressed secp256k1 public key of `private_key`.
pub fn public_key_of(private_key: &[u8]) -> Result<PublicKey, WalletError> {
    let secret = bitcoin::secp256k1::SecretKey::from_slice(private_key)
        .map_err(|e| WalletError::CryptoError(format!("Invalid secret key: {}", e)))?;
    Ok(PublicKey::from_secret_key(&*crate::core::derivation::SECP, &secret))
}

/// Message bytes as given by the host: `0x`-prefixed hex is decoded, anything
/// else is taken as UTF-8 text.
pub fn message_bytes(message: &str) -> Vec<u8> {
    if let Some(stripped) = message.strip_prefix("0x") {
        if let Ok(bytes) = hex::decode(stripped) {
            return bytes;
        }
    }
    message.as_bytes().to_vec()
}
