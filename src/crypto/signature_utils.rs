use crate::core::errors::WalletError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

/// Recoverable secp256k1 signature over a 32-byte prehash.
///
/// k256 emits low-S signatures and adjusts the recovery id accordingly, so
/// the output is non-malleable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub recovery_id: u8,
}

impl RecoverableSignature {
    /// `r || s || (recovery_id + v_offset)`.
    pub fn to_rsv(&self, v_offset: u8) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.recovery_id + v_offset;
        out
    }

    /// Bitcoin compact layout: header byte first.
    pub fn to_compact(&self, compressed: bool) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[0] = 27 + self.recovery_id + if compressed { 4 } else { 0 };
        out[1..33].copy_from_slice(&self.r);
        out[33..].copy_from_slice(&self.s);
        out
    }
}

pub fn sign_recoverable(secret: &[u8], digest: &[u8; 32]) -> Result<RecoverableSignature, WalletError> {
    let key = SigningKey::from_slice(secret)
        .map_err(|e| WalletError::CryptoError(format!("Invalid secret key: {}", e)))?;
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest)
        .map_err(|e| WalletError::CryptoError(format!("sign_failed: {}", e)))?;
    let bytes = signature.to_bytes();
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..]);
    Ok(RecoverableSignature { r, s, recovery_id: recovery_id.to_byte() })
}

/// Recover the SEC1 compressed public key that produced `sig` over `digest`.
pub fn recover_public_key(sig: &RecoverableSignature, digest: &[u8; 32]) -> Result<Vec<u8>, WalletError> {
    let mut rs = [0u8; 64];
    rs[..32].copy_from_slice(&sig.r);
    rs[32..].copy_from_slice(&sig.s);
    let signature = Signature::from_slice(&rs)
        .map_err(|e| WalletError::CryptoError(format!("Invalid signature: {}", e)))?;
    let recid = RecoveryId::from_byte(sig.recovery_id)
        .ok_or_else(|| WalletError::CryptoError("Invalid recovery id".to_string()))?;
    let key = VerifyingKey::recover_from_prehash(digest, &signature, recid)
        .map_err(|e| WalletError::CryptoError(format!("recover_failed: {}", e)))?;
    Ok(key.to_encoded_point(true).as_bytes().to_vec())
}

/// Strip leading zero bytes, the integer encoding RLP expects.
pub fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};

    #[test]
    fn test_sign_and_recover() {
        let secret = [1u8; 32];
        let digest = [2u8; 32];
        let sig = sign_recoverable(&secret, &digest).unwrap();
        let recovered = recover_public_key(&sig, &digest).unwrap();

        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&secret).unwrap();
        let expected = PublicKey::from_secret_key(&secp, &sk).serialize();
        assert_eq!(recovered, expected.to_vec());
    }

    #[test]
    fn test_signature_is_deterministic() {
        let a = sign_recoverable(&[3u8; 32], &[4u8; 32]).unwrap();
        let b = sign_recoverable(&[3u8; 32], &[4u8; 32]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_layouts() {
        let sig = RecoverableSignature { r: [1u8; 32], s: [2u8; 32], recovery_id: 1 };
        assert_eq!(sig.to_rsv(27)[64], 28);
        assert_eq!(sig.to_compact(true)[0], 32);
    }

    #[test]
    fn test_trim_leading_zeros() {
        assert_eq!(trim_leading_zeros(&[0, 0, 5, 0]), &[5, 0]);
        assert!(trim_leading_zeros(&[0, 0]).is_empty());
    }

    #[test]
    fn test_invalid_secret_rejected() {
        assert!(sign_recoverable(&[0u8; 32], &[1u8; 32]).is_err());
    }
}
