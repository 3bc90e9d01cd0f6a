//! Small helpers and aliases for secret buffers that must be zeroized on drop.
use serde_json::Value;
use zeroize::{Zeroize, Zeroizing};

/// Common alias for secret byte buffers which will be zeroed when dropped.
pub type SecretVec = Zeroizing<Vec<u8>>;

/// A 32-byte secp256k1 private key that is zeroed when dropped.
pub type PrivateKeyBytes = Zeroizing<[u8; 32]>;

/// Copy a 32-byte slice into a zeroizing key buffer.
pub fn key_bytes(slice: &[u8]) -> Option<PrivateKeyBytes> {
    if slice.len() != 32 {
        return None;
    }
    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(slice);
    Some(out)
}

/// Zeroize every string inside a JSON value, keys excluded.
pub fn wipe_json(value: &mut Value) {
    match value {
        Value::String(s) => s.zeroize(),
        Value::Array(items) => items.iter_mut().for_each(wipe_json),
        Value::Object(map) => map.values_mut().for_each(wipe_json),
        _ => {}
    }
}
