//! Bitcoin support: addresses, WIF keys, message and UTXO transaction signing.

pub mod address;
pub mod sighash;
pub mod transaction;

pub use address::BitcoinAddress;
pub use transaction::{SpendKind, Utxo, UtxoTxInput};

use crate::blockchain::traits::{ChainSigner, KeySource, SignedTransaction};
use crate::core::domain::{ChainParams, ChainType, Network, SegWit};
use crate::core::errors::WalletError;
use crate::crypto::hash::dsha256;
use crate::crypto::signature_utils::sign_recoverable;
use crate::security::secret::PrivateKeyBytes;
use base64::Engine as _;
use bitcoin::consensus::encode::{serialize, VarInt};

const MESSAGE_MAGIC: &[u8] = b"\x18Bitcoin Signed Message:\n";

/// Digest signed by `signmessage`-compatible wallets.
pub fn message_digest(message: &[u8]) -> [u8; 32] {
    let mut data = MESSAGE_MAGIC.to_vec();
    data.extend_from_slice(&serialize(&VarInt(message.len() as u64)));
    data.extend_from_slice(message);
    dsha256(&data)
}

/// Base64 compact signature with the compressed-key header byte.
pub fn sign_message_compact(private_key: &[u8], message: &[u8]) -> Result<String, WalletError> {
    let signature = sign_recoverable(private_key, &message_digest(message))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(signature.to_compact(true)))
}

pub struct BitcoinSigner;

impl ChainSigner for BitcoinSigner {
    fn chain_type(&self) -> ChainType {
        ChainType::Bitcoin
    }

    fn encode_address(
        &self,
        public_key: &bitcoin::secp256k1::PublicKey,
        params: &ChainParams,
    ) -> Result<String, WalletError> {
        BitcoinAddress::from_public_key(public_key, params.seg_wit, params.network)
    }

    fn is_valid_address(&self, address: &str, network: Network) -> bool {
        BitcoinAddress::validate(address, network)
    }

    fn sign_message(&self, private_key: &[u8], message: &[u8]) -> Result<String, WalletError> {
        sign_message_compact(private_key, message)
    }

    fn sign_transaction(
        &self,
        tx: &serde_json::Value,
        keys: &dyn KeySource,
        params: &ChainParams,
    ) -> Result<SignedTransaction, WalletError> {
        let input = UtxoTxInput::from_value(tx)?;
        let recipient = BitcoinAddress::script_pubkey(&input.to, params.network)?;
        let kind = match params.seg_wit {
            SegWit::None => SpendKind::Legacy,
            SegWit::P2wpkh => SpendKind::NestedSegwit,
            SegWit::Segwit => SpendKind::NativeSegwit,
        };
        let change_script = |pk: &bitcoin::secp256k1::PublicKey| {
            let address = BitcoinAddress::from_public_key(pk, params.seg_wit, params.network)?;
            BitcoinAddress::script_pubkey(&address, params.network)
        };
        transaction::build_and_sign(&input, recipient, keys, kind, &change_script)
    }

    /// WIF first, then raw hex.
    fn parse_private_key(&self, input: &str, network: Network) -> Result<PrivateKeyBytes, WalletError> {
        address::parse_wif(input, network).or_else(|_| crate::blockchain::traits::parse_hex_private_key(input))
    }

    fn format_private_key(&self, private_key: &[u8], network: Network) -> Result<String, WalletError> {
        address::to_wif(private_key, network)
    }
}
