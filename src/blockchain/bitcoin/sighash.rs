//! BIP143 digest with a caller-chosen sighash type.
//!
//! Bitcoin SegWit inputs go through `bitcoin::sighash::SighashCache`; this
//! exists for Bitcoin Cash, whose `SIGHASH_FORKID` type that cache rejects.

use crate::crypto::hash::dsha256;
use bitcoin::consensus::encode::serialize;
use bitcoin::{Script, Transaction};

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_ALL_FORKID: u32 = 0x41;

/// Digest for input `index` spending `value` satoshis locked by `script_code`.
/// Only `SIGHASH_ALL` semantics (all inputs, all outputs) are produced.
pub fn bip143_sighash(
    tx: &Transaction,
    index: usize,
    script_code: &Script,
    value: u64,
    sighash_type: u32,
) -> [u8; 32] {
    let mut prevouts = Vec::with_capacity(tx.input.len() * 36);
    let mut sequences = Vec::with_capacity(tx.input.len() * 4);
    for input in &tx.input {
        prevouts.extend_from_slice(&serialize(&input.previous_output));
        sequences.extend_from_slice(&input.sequence.0.to_le_bytes());
    }
    let mut outputs = Vec::new();
    for output in &tx.output {
        outputs.extend_from_slice(&serialize(output));
    }

    let input = &tx.input[index];
    let mut preimage = Vec::with_capacity(160 + script_code.len());
    preimage.extend_from_slice(&tx.version.0.to_le_bytes());
    preimage.extend_from_slice(&dsha256(&prevouts));
    preimage.extend_from_slice(&dsha256(&sequences));
    preimage.extend_from_slice(&serialize(&input.previous_output));
    preimage.extend_from_slice(&serialize(&script_code.to_owned()));
    preimage.extend_from_slice(&value.to_le_bytes());
    preimage.extend_from_slice(&input.sequence.0.to_le_bytes());
    preimage.extend_from_slice(&dsha256(&outputs));
    preimage.extend_from_slice(&tx.lock_time.to_consensus_u32().to_le_bytes());
    preimage.extend_from_slice(&sighash_type.to_le_bytes());
    dsha256(&preimage)
}
