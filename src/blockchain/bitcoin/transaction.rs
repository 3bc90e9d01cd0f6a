//! UTXO transaction building and signing for Bitcoin and Bitcoin Cash.

use super::sighash::{bip143_sighash, SIGHASH_ALL, SIGHASH_ALL_FORKID};
use crate::blockchain::traits::{public_key_of, KeySource, SignedTransaction};
use crate::core::derivation::SECP;
use crate::core::errors::WalletError;
use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{Message, PublicKey, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, PublicKey as BitcoinPublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, info};

/// Outputs below this value are not created; the remainder goes to the fee.
pub const DUST_THRESHOLD: u64 = 546;

/// An unspent output the wallet controls.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    pub tx_hash: String,
    pub vout: u32,
    /// Value in satoshis
    pub amount: u64,
    /// `change/index` of the key owning this output; the wallet's own key when absent
    #[serde(default)]
    pub derived_path: Option<String>,
    #[serde(default)]
    pub sequence: Option<u32>,
}

/// Unsigned UTXO transfer as sent by the host.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtxoTxInput {
    pub to: String,
    pub amount: u64,
    pub fee: u64,
    #[serde(alias = "inputs")]
    pub unspents: Vec<Utxo>,
    /// Index of the internal (change) address; 0 when absent
    #[serde(default)]
    pub change_idx: Option<u32>,
}

impl UtxoTxInput {
    pub fn from_value(tx: &serde_json::Value) -> Result<Self, WalletError> {
        let input: UtxoTxInput = serde_json::from_value(tx.clone())?;
        if input.unspents.is_empty() {
            return Err(WalletError::ValidationError("unspents_empty".to_string()));
        }
        if input.amount < DUST_THRESHOLD {
            return Err(WalletError::ValidationError("amount_below_dust".to_string()));
        }
        Ok(input)
    }

    fn change_amount(&self) -> Result<u64, WalletError> {
        let total = self
            .unspents
            .iter()
            .try_fold(0u64, |acc, u| acc.checked_add(u.amount))
            .ok_or_else(|| WalletError::ValidationError("amount_overflow".to_string()))?;
        let spend = self
            .amount
            .checked_add(self.fee)
            .ok_or_else(|| WalletError::ValidationError("amount_overflow".to_string()))?;
        total
            .checked_sub(spend)
            .ok_or_else(|| WalletError::ValidationError("insufficient_funds".to_string()))
    }

    pub fn change_relative(&self) -> String {
        format!("1/{}", self.change_idx.unwrap_or(0))
    }
}

/// How each input is unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendKind {
    /// P2PKH with the legacy sighash
    Legacy,
    /// P2SH-wrapped P2WPKH
    NestedSegwit,
    /// Native P2WPKH
    NativeSegwit,
    /// P2PKH with BIP143 + SIGHASH_FORKID (Bitcoin Cash)
    ForkId,
}

/// Build the transaction described by `input`, paying to `recipient`, and
/// sign every input with the key its `derived_path` resolves to.
///
/// `change_script` maps the change key to its output script; it is only
/// called when the change is above dust.
pub fn build_and_sign(
    input: &UtxoTxInput,
    recipient: ScriptBuf,
    keys: &dyn KeySource,
    kind: SpendKind,
    change_script: &dyn Fn(&PublicKey) -> Result<ScriptBuf, WalletError>,
) -> Result<SignedTransaction, WalletError> {
    info!(
        inputs = input.unspents.len(),
        amount = input.amount,
        fee = input.fee,
        ?kind,
        "signing utxo transaction"
    );
    let change = input.change_amount()?;

    let mut tx_inputs = Vec::with_capacity(input.unspents.len());
    for utxo in &input.unspents {
        let txid = Txid::from_str(&utxo.tx_hash)
            .map_err(|_| WalletError::ValidationError(format!("tx_hash_invalid: {}", utxo.tx_hash)))?;
        tx_inputs.push(TxIn {
            previous_output: OutPoint { txid, vout: utxo.vout },
            script_sig: ScriptBuf::new(),
            sequence: utxo.sequence.map(Sequence).unwrap_or(Sequence::MAX),
            witness: Witness::new(),
        });
    }

    let mut outputs = vec![TxOut { value: Amount::from_sat(input.amount), script_pubkey: recipient }];
    if change >= DUST_THRESHOLD {
        let change_key = keys.private_key(Some(&input.change_relative()))?;
        let change_pk = public_key_of(change_key.as_ref())?;
        outputs.push(TxOut { value: Amount::from_sat(change), script_pubkey: change_script(&change_pk)? });
    }

    let mut tx = Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: tx_inputs,
        output: outputs,
    };

    // Sighashes never commit to other inputs' unlocking data, so all of them
    // are computed against the unsigned transaction first.
    let mut unlocks = Vec::with_capacity(input.unspents.len());
    let mut cache = SighashCache::new(&tx);
    for (i, utxo) in input.unspents.iter().enumerate() {
        let private_key = keys.private_key(utxo.derived_path.as_deref())?;
        let secret = SecretKey::from_slice(private_key.as_ref())
            .map_err(|e| WalletError::CryptoError(format!("Invalid secret key: {}", e)))?;
        let public_key = BitcoinPublicKey::new(PublicKey::from_secret_key(&*SECP, &secret));
        let script_code = ScriptBuf::new_p2pkh(&public_key.pubkey_hash());

        let (digest, sighash_byte) = match kind {
            SpendKind::Legacy => {
                let sighash = cache
                    .legacy_signature_hash(i, &script_code, EcdsaSighashType::All.to_u32())
                    .map_err(|e| WalletError::CryptoError(format!("sighash: {}", e)))?;
                (sighash.to_byte_array(), SIGHASH_ALL as u8)
            }
            SpendKind::NestedSegwit | SpendKind::NativeSegwit => {
                let hash = public_key
                    .wpubkey_hash()
                    .ok_or_else(|| WalletError::CryptoError("segwit key must be compressed".to_string()))?;
                let sighash = cache
                    .p2wpkh_signature_hash(
                        i,
                        &ScriptBuf::new_p2wpkh(&hash),
                        Amount::from_sat(utxo.amount),
                        EcdsaSighashType::All,
                    )
                    .map_err(|e| WalletError::CryptoError(format!("sighash: {}", e)))?;
                (sighash.to_byte_array(), SIGHASH_ALL as u8)
            }
            SpendKind::ForkId => (
                bip143_sighash(&tx, i, &script_code, utxo.amount, SIGHASH_ALL_FORKID),
                SIGHASH_ALL_FORKID as u8,
            ),
        };

        let signature = SECP.sign_ecdsa(&Message::from_digest(digest), &secret);
        let mut sig_bytes = signature.serialize_der().to_vec();
        sig_bytes.push(sighash_byte);
        let pk_bytes = public_key.to_bytes();

        let unlock = match kind {
            SpendKind::Legacy | SpendKind::ForkId => {
                (push_script(&[sig_bytes, pk_bytes])?, Witness::new())
            }
            SpendKind::NativeSegwit => (ScriptBuf::new(), Witness::from_slice(&[sig_bytes, pk_bytes])),
            SpendKind::NestedSegwit => {
                let mut redeem = vec![0x00, 0x14];
                redeem.extend_from_slice(&public_key.pubkey_hash().to_byte_array());
                (push_script(&[redeem])?, Witness::from_slice(&[sig_bytes, pk_bytes]))
            }
        };
        unlocks.push(unlock);
    }

    for (txin, (script_sig, witness)) in tx.input.iter_mut().zip(unlocks) {
        txin.script_sig = script_sig;
        txin.witness = witness;
    }

    let txid = tx.txid().to_string();
    debug!(%txid, "utxo transaction signed");
    Ok(SignedTransaction { signature: None, raw_tx: Some(hex::encode(serialize(&tx))), tx_hash: txid })
}

fn push_script(items: &[Vec<u8>]) -> Result<ScriptBuf, WalletError> {
    let mut builder = Builder::new();
    for item in items {
        let push = PushBytesBuf::try_from(item.clone())
            .map_err(|e| WalletError::CryptoError(format!("script push: {:?}", e)))?;
        builder = builder.push_slice(push);
    }
    Ok(builder.into_script())
}
