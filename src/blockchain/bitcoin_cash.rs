//! Bitcoin Cash: CashAddr encoding and SIGHASH_FORKID transaction signing.
//!
//! Keys, WIF and message signing are shared with Bitcoin; addresses are
//! CashAddr and returned without the `bitcoincash:` / `bchtest:` prefix.

use crate::blockchain::bitcoin::transaction::{build_and_sign, SpendKind, UtxoTxInput};
use crate::blockchain::bitcoin::{address, sign_message_compact};
use crate::blockchain::traits::{ChainSigner, KeySource, SignedTransaction};
use crate::core::domain::{ChainParams, ChainType, Network};
use crate::core::errors::WalletError;
use crate::crypto::hash::hash160;
use crate::security::secret::PrivateKeyBytes;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{PubkeyHash, ScriptBuf, ScriptHash};

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const GENERATORS: [u64; 5] = [0x98f2bc8e61, 0x79b76d99e2, 0xf33e5fb3c4, 0xae2eabe2a8, 0x1e4f43e470];

/// Version byte of a 160-bit hash payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashAddrKind {
    P2pkh = 0x00,
    P2sh = 0x08,
}

pub fn prefix(network: Network) -> &'static str {
    match network {
        Network::Mainnet => "bitcoincash",
        Network::Testnet => "bchtest",
    }
}

fn polymod(values: &[u8]) -> u64 {
    let mut c: u64 = 1;
    for d in values {
        let c0 = (c >> 35) as u8;
        c = ((c & 0x07_ffff_ffff) << 5) ^ u64::from(*d);
        for (i, generator) in GENERATORS.iter().enumerate() {
            if c0 & (1 << i) != 0 {
                c ^= generator;
            }
        }
    }
    c ^ 1
}

fn prefix_values(prefix: &str) -> Vec<u8> {
    let mut values: Vec<u8> = prefix.bytes().map(|b| b & 0x1f).collect();
    values.push(0);
    values
}

/// Regroup bits; `pad` fills the last group with zeros.
fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let max = (1u32 << to) - 1;
    let max_acc = (1u32 << (from + to - 1)) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);
    for value in data {
        let v = u32::from(*value);
        if v >> from != 0 {
            return None;
        }
        acc = ((acc << from) | v) & max_acc;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max) as u8);
        }
    }
    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max) != 0 {
        return None;
    }
    Some(out)
}

/// CashAddr for a 20-byte hash, without prefix.
pub fn encode(kind: CashAddrKind, hash: &[u8; 20], network: Network) -> String {
    let mut payload = vec![kind as u8];
    payload.extend_from_slice(hash);
    let mut data = convert_bits(&payload, 8, 5, true).unwrap_or_default();

    let mut checked = prefix_values(prefix(network));
    checked.extend_from_slice(&data);
    checked.extend_from_slice(&[0u8; 8]);
    let checksum = polymod(&checked);
    for i in 0..8 {
        data.push(((checksum >> (5 * (7 - i))) & 0x1f) as u8);
    }
    data.iter().map(|d| CHARSET[*d as usize] as char).collect()
}

/// Decode a CashAddr, with or without prefix, checking it belongs to `network`.
pub fn decode(address: &str, network: Network) -> Result<(CashAddrKind, [u8; 20]), WalletError> {
    let invalid = || WalletError::ValidationError(format!("address_invalid: {}", address));

    let has_upper = address.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = address.chars().any(|c| c.is_ascii_lowercase());
    if has_upper && has_lower {
        return Err(invalid());
    }
    let lowered = address.to_ascii_lowercase();
    let expected = prefix(network);
    let body = match lowered.split_once(':') {
        Some((p, body)) if p == expected => body,
        Some(_) => return Err(WalletError::ValidationError("address_network_mismatch".to_string())),
        None => lowered.as_str(),
    };

    let mut data = Vec::with_capacity(body.len());
    for c in body.bytes() {
        let value = CHARSET.iter().position(|x| *x == c).ok_or_else(invalid)?;
        data.push(value as u8);
    }
    if data.len() < 8 {
        return Err(invalid());
    }
    let mut checked = prefix_values(expected);
    checked.extend_from_slice(&data);
    if polymod(&checked) != 0 {
        return Err(invalid());
    }

    let payload = convert_bits(&data[..data.len() - 8], 5, 8, false).ok_or_else(invalid)?;
    if payload.len() != 21 {
        return Err(invalid());
    }
    let kind = match payload[0] {
        0x00 => CashAddrKind::P2pkh,
        0x08 => CashAddrKind::P2sh,
        _ => return Err(invalid()),
    };
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    Ok((kind, hash))
}

/// Convert a legacy base58 address to CashAddr.
pub fn from_legacy(legacy: &str, network: Network) -> Result<String, WalletError> {
    let script = address::BitcoinAddress::script_pubkey(legacy, network)?;
    let bytes = script.as_bytes();
    if script.is_p2pkh() {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&bytes[3..23]);
        Ok(encode(CashAddrKind::P2pkh, &hash, network))
    } else if script.is_p2sh() {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&bytes[2..22]);
        Ok(encode(CashAddrKind::P2sh, &hash, network))
    } else {
        Err(WalletError::ValidationError(format!("address_invalid: {}", legacy)))
    }
}

/// Output script for a CashAddr or legacy address.
pub fn script_pubkey(address: &str, network: Network) -> Result<ScriptBuf, WalletError> {
    match decode(address, network) {
        Ok((CashAddrKind::P2pkh, hash)) => Ok(ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash))),
        Ok((CashAddrKind::P2sh, hash)) => Ok(ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash))),
        Err(err) => address::BitcoinAddress::script_pubkey(address, network).map_err(|_| err),
    }
}

pub struct BitcoinCashSigner;

impl ChainSigner for BitcoinCashSigner {
    fn chain_type(&self) -> ChainType {
        ChainType::BitcoinCash
    }

    fn encode_address(&self, public_key: &PublicKey, params: &ChainParams) -> Result<String, WalletError> {
        Ok(encode(CashAddrKind::P2pkh, &hash160(&public_key.serialize()), params.network))
    }

    /// CashAddr, or a legacy base58 address that converts to one.
    fn is_valid_address(&self, address: &str, network: Network) -> bool {
        decode(address, network).is_ok() || from_legacy(address, network).is_ok()
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
        let recipient = script_pubkey(&input.to, params.network)?;
        let change_script = |pk: &PublicKey| -> Result<ScriptBuf, WalletError> {
            Ok(ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash160(&pk.serialize()))))
        };
        build_and_sign(&input, recipient, keys, SpendKind::ForkId, &change_script)
    }

    fn parse_private_key(&self, input: &str, network: Network) -> Result<PrivateKeyBytes, WalletError> {
        address::parse_wif(input, network).or_else(|_| crate::blockchain::traits::parse_hex_private_key(input))
    }

    fn format_private_key(&self, private_key: &[u8], network: Network) -> Result<String, WalletError> {
        address::to_wif(private_key, network)
    }
}
