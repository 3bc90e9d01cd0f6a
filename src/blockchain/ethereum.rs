//! Ethereum addresses (EIP-55), personal messages (EIP-191) and
//! transaction signing (EIP-155 legacy and EIP-1559).

use crate::blockchain::traits::{ChainSigner, KeySource, SignedTransaction};
use crate::core::domain::{ChainParams, ChainType, Network};
use crate::core::errors::WalletError;
use crate::crypto::hash::keccak256;
use crate::crypto::signature_utils::{sign_recoverable, trim_leading_zeros};
use bitcoin::secp256k1::PublicKey;
use rlp::RlpStream;
use serde::Deserialize;
use tracing::info;

/// Last 20 bytes of keccak256 over the uncompressed key without its 0x04 tag.
pub fn address_bytes(public_key: &PublicKey) -> [u8; 20] {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    out
}

/// EIP-55 mixed-case checksum encoding.
pub fn to_checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, ch) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (4 * (1 - (i % 2)))) & 0x0f;
        if ch.is_ascii_alphabetic() && nibble >= 8 {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// `0x` + 40 hex digits; mixed case must carry a valid checksum.
pub fn is_valid_address(address: &str) -> bool {
    let Some(body) = address.strip_prefix("0x") else {
        return false;
    };
    if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    let is_all_lower = !body.chars().any(|c| c.is_ascii_uppercase());
    let is_all_upper = !body.chars().any(|c| c.is_ascii_lowercase());
    if is_all_lower || is_all_upper {
        return true;
    }
    match hex::decode(body) {
        Ok(bytes) => {
            let mut raw = [0u8; 20];
            raw.copy_from_slice(&bytes);
            to_checksum_address(&raw) == address
        }
        Err(_) => false,
    }
}

/// EIP-191 personal message hash.
pub fn hash_message(message: &[u8]) -> [u8; 32] {
    let mut data = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    data.extend_from_slice(message);
    keccak256(&data)
}

/// A non-negative integer given as a JSON number, a decimal string or a
/// `0x` hex string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Number(u64),
    Text(String),
}

impl Quantity {
    /// Minimal big-endian bytes, empty for zero (the RLP integer encoding).
    pub fn to_be_bytes(&self) -> Result<Vec<u8>, WalletError> {
        let invalid = |s: &str| WalletError::ValidationError(format!("quantity_invalid: {}", s));
        match self {
            Quantity::Number(n) => Ok(trim_leading_zeros(&n.to_be_bytes()).to_vec()),
            Quantity::Text(s) => {
                let s = s.trim();
                if let Some(hex_part) = s.strip_prefix("0x") {
                    let padded = if hex_part.len() % 2 == 1 { format!("0{}", hex_part) } else { hex_part.to_string() };
                    let bytes = hex::decode(&padded).map_err(|_| invalid(s))?;
                    let trimmed = trim_leading_zeros(&bytes).to_vec();
                    if trimmed.len() > 32 {
                        return Err(invalid(s));
                    }
                    Ok(trimmed)
                } else {
                    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
                        return Err(invalid(s));
                    }
                    let n = s.parse::<u128>().map_err(|_| invalid(s))?;
                    Ok(trim_leading_zeros(&n.to_be_bytes()).to_vec())
                }
            }
        }
    }

    pub fn to_u64(&self) -> Result<u64, WalletError> {
        let bytes = self.to_be_bytes()?;
        if bytes.len() > 8 {
            return Err(WalletError::ValidationError("quantity_too_large".to_string()));
        }
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }
}

fn zero() -> Quantity {
    Quantity::Number(0)
}

/// Unsigned Ethereum transaction. Setting `maxFeePerGas` selects EIP-1559.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthTxInput {
    pub nonce: Quantity,
    #[serde(default)]
    pub gas_price: Option<Quantity>,
    #[serde(default)]
    pub max_fee_per_gas: Option<Quantity>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<Quantity>,
    pub gas_limit: Quantity,
    /// Recipient; empty for contract creation
    #[serde(default)]
    pub to: String,
    #[serde(default = "zero")]
    pub value: Quantity,
    #[serde(default)]
    pub data: String,
    pub chain_id: Quantity,
}

impl EthTxInput {
    fn to_bytes(&self) -> Result<Vec<u8>, WalletError> {
        if self.to.is_empty() {
            return Ok(Vec::new());
        }
        if !is_valid_address(&self.to) {
            return Err(WalletError::ValidationError(format!("address_invalid: {}", self.to)));
        }
        Ok(hex::decode(&self.to[2..])?)
    }

    fn data_bytes(&self) -> Result<Vec<u8>, WalletError> {
        let data = self.data.strip_prefix("0x").unwrap_or(&self.data);
        Ok(hex::decode(data)?)
    }

    fn is_eip1559(&self) -> bool {
        self.max_fee_per_gas.is_some()
    }

    /// Legacy list: `[nonce, gasPrice, gasLimit, to, value, data]`.
    fn append_legacy_fields(&self, stream: &mut RlpStream) -> Result<(), WalletError> {
        let gas_price = self
            .gas_price
            .as_ref()
            .ok_or_else(|| WalletError::ValidationError("gas_price_missing".to_string()))?;
        stream.append(&self.nonce.to_be_bytes()?);
        stream.append(&gas_price.to_be_bytes()?);
        stream.append(&self.gas_limit.to_be_bytes()?);
        stream.append(&self.to_bytes()?);
        stream.append(&self.value.to_be_bytes()?);
        stream.append(&self.data_bytes()?);
        Ok(())
    }

    /// EIP-1559 list up to and including the (empty) access list.
    fn append_eip1559_fields(&self, stream: &mut RlpStream) -> Result<(), WalletError> {
        let max_fee = self
            .max_fee_per_gas
            .as_ref()
            .ok_or_else(|| WalletError::ValidationError("max_fee_per_gas_missing".to_string()))?;
        let priority = self.max_priority_fee_per_gas.clone().unwrap_or_else(zero);
        stream.append(&self.chain_id.to_be_bytes()?);
        stream.append(&self.nonce.to_be_bytes()?);
        stream.append(&priority.to_be_bytes()?);
        stream.append(&max_fee.to_be_bytes()?);
        stream.append(&self.gas_limit.to_be_bytes()?);
        stream.append(&self.to_bytes()?);
        stream.append(&self.value.to_be_bytes()?);
        stream.append(&self.data_bytes()?);
        stream.begin_list(0);
        Ok(())
    }

    /// Sign and return the raw transaction bytes.
    pub fn sign(&self, private_key: &[u8]) -> Result<Vec<u8>, WalletError> {
        let chain_id = self.chain_id.to_u64()?;
        if self.is_eip1559() {
            let mut unsigned = RlpStream::new_list(9);
            self.append_eip1559_fields(&mut unsigned)?;
            let mut payload = vec![0x02];
            payload.extend_from_slice(&unsigned.out());
            let signature = sign_recoverable(private_key, &keccak256(&payload))?;

            let mut signed = RlpStream::new_list(12);
            self.append_eip1559_fields(&mut signed)?;
            signed.append(&trim_leading_zeros(&[signature.recovery_id]).to_vec());
            signed.append(&trim_leading_zeros(&signature.r).to_vec());
            signed.append(&trim_leading_zeros(&signature.s).to_vec());
            let mut raw = vec![0x02];
            raw.extend_from_slice(&signed.out());
            Ok(raw)
        } else {
            let mut unsigned = RlpStream::new_list(9);
            self.append_legacy_fields(&mut unsigned)?;
            unsigned.append(&self.chain_id.to_be_bytes()?);
            unsigned.append(&Vec::<u8>::new());
            unsigned.append(&Vec::<u8>::new());
            let signature = sign_recoverable(private_key, &keccak256(&unsigned.out()))?;

            let v = chain_id
                .checked_mul(2)
                .and_then(|v| v.checked_add(35 + u64::from(signature.recovery_id)))
                .ok_or_else(|| WalletError::ValidationError(format!("chain_id_out_of_range: {}", chain_id)))?;
            let mut signed = RlpStream::new_list(9);
            self.append_legacy_fields(&mut signed)?;
            signed.append(&trim_leading_zeros(&v.to_be_bytes()).to_vec());
            signed.append(&trim_leading_zeros(&signature.r).to_vec());
            signed.append(&trim_leading_zeros(&signature.s).to_vec());
            Ok(signed.out().to_vec())
        }
    }
}

pub struct EthereumSigner;

impl ChainSigner for EthereumSigner {
    fn chain_type(&self) -> ChainType {
        ChainType::Ethereum
    }

    fn encode_address(&self, public_key: &PublicKey, _params: &ChainParams) -> Result<String, WalletError> {
        Ok(to_checksum_address(&address_bytes(public_key)))
    }

    fn is_valid_address(&self, address: &str, _network: Network) -> bool {
        is_valid_address(address)
    }

    /// `0x` + `r || s || v`, v = 27 + recovery id.
    fn sign_message(&self, private_key: &[u8], message: &[u8]) -> Result<String, WalletError> {
        let signature = sign_recoverable(private_key, &hash_message(message))?;
        Ok(format!("0x{}", hex::encode(signature.to_rsv(27))))
    }

    fn sign_transaction(
        &self,
        tx: &serde_json::Value,
        keys: &dyn KeySource,
        _params: &ChainParams,
    ) -> Result<SignedTransaction, WalletError> {
        let input: EthTxInput = serde_json::from_value(tx.clone())?;
        info!(eip1559 = input.is_eip1559(), "signing ethereum transaction");
        let private_key = keys.private_key(None)?;
        let raw = input.sign(private_key.as_ref())?;
        Ok(SignedTransaction {
            signature: None,
            raw_tx: Some(format!("0x{}", hex::encode(&raw))),
            tx_hash: format!("0x{}", hex::encode(keccak256(&raw))),
        })
    }
}
