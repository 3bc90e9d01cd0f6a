use crate::blockchain::ethereum::address_bytes;
use crate::blockchain::traits::{ChainSigner, KeySource, SignedTransaction};
use crate::core::domain::{ChainParams, ChainType, Network};
use crate::core::errors::WalletError;
use crate::crypto::hash::{keccak256, sha256};
use crate::crypto::signature_utils::sign_recoverable;
use bitcoin::secp256k1::PublicKey;
use serde::Deserialize;
use tracing::info;

const ADDRESS_PREFIX: u8 = 0x41;

/// TronWeb's v1 message header. The length field is the literal "32",
/// whatever the message length.
const MESSAGE_HEADER: &[u8] = b"\x19TRON Signed Message:\n32";

pub fn encode_address(public_key: &PublicKey) -> String {
    let mut raw = vec![ADDRESS_PREFIX];
    raw.extend_from_slice(&address_bytes(public_key));
    bs58::encode(raw).with_check().into_string()
}

pub fn is_valid_address(address: &str) -> bool {
    match bs58::decode(address).with_check(None).into_vec() {
        Ok(data) => data.len() == 21 && data[0] == ADDRESS_PREFIX,
        Err(_) => false,
    }
}

/// Unsigned Tron transaction: the protobuf `raw_data` as hex.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TronTxInput {
    #[serde(alias = "raw_data_hex")]
    pub raw_data: String,
}

pub struct TronSigner;

impl ChainSigner for TronSigner {
    fn chain_type(&self) -> ChainType {
        ChainType::Tron
    }

    fn encode_address(&self, public_key: &PublicKey, _params: &ChainParams) -> Result<String, WalletError> {
        Ok(encode_address(public_key))
    }

    fn is_valid_address(&self, address: &str, _network: Network) -> bool {
        is_valid_address(address)
    }

    /// `r || s || v` hex, v = 27 + recovery id.
    fn sign_message(&self, private_key: &[u8], message: &[u8]) -> Result<String, WalletError> {
        let mut data = MESSAGE_HEADER.to_vec();
        data.extend_from_slice(message);
        let signature = sign_recoverable(private_key, &keccak256(&data))?;
        Ok(hex::encode(signature.to_rsv(27)))
    }

    /// Signs `sha256(raw_data)`; the node expects the bare recovery id as v.
    fn sign_transaction(
        &self,
        tx: &serde_json::Value,
        keys: &dyn KeySource,
        _params: &ChainParams,
    ) -> Result<SignedTransaction, WalletError> {
        let input: TronTxInput = serde_json::from_value(tx.clone())?;
        let raw = hex::decode(input.raw_data.trim_start_matches("0x"))?;
        if raw.is_empty() {
            return Err(WalletError::ValidationError("raw_data_empty".to_string()));
        }
        info!(len = raw.len(), "signing tron transaction");
        let digest = sha256(&raw);
        let private_key = keys.private_key(None)?;
        let signature = sign_recoverable(private_key.as_ref(), &digest)?;
        Ok(SignedTransaction {
            signature: Some(hex::encode(signature.to_rsv(0))),
            raw_tx: None,
            tx_hash: hex::encode(digest),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_vector() {
        let bytes = hex::decode("04DAAC763B1B3492720E404C53D323BAF29391996F7DD5FA27EF0D12F7D50D694700684A32AD97FF4C09BF9CF0B9D0AC7F0091D9C6CB8BE9BB6A1106DA557285D8").unwrap();
        let pk = PublicKey::from_slice(&bytes).unwrap();
        assert_eq!(encode_address(&pk), "THfuSDVRvSsjNDPFdGjMU19Ha4Kf7acotq");
    }

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address("THfuSDVRvSsjNDPFdGjMU19Ha4Kf7acotq"));
        assert!(!is_valid_address("THfuSDVRvSsjNDPFdGjMU19Ha4Kf7acot"));
        assert!(!is_valid_address("qq9j7zsvxxl7qsrtpnxp8q0ahcc3j3k6mss7mnlrj8"));
        assert!(!is_valid_address("mkeNU5nVnozJiaACDELLCsVUc8Wxoh1rQN"));
    }

    #[test]
    fn test_message_signature_layout() {
        let sig = TronSigner.sign_message(&[0x22u8; 32], b"hello").unwrap();
        let raw = hex::decode(sig).unwrap();
        assert_eq!(raw.len(), 65);
        assert!(raw[64] == 27 || raw[64] == 28);
    }
}
