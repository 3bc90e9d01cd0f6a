//! Password-based encryption of wallet secrets.
//!
//! Layout on disk (inside the keystore JSON):
//!
//! ```text
//! password --KDF(salt)--> credential[64]
//!   credential[0..32]  -> AES-256-GCM key   (encrypts the secret, AAD = wallet binding)
//!   credential[32..64] -> HMAC-SHA256 key   (mac over nonce || ciphertext)
//! ```
//!
//! The MAC lets a password be checked without running the cipher, which is
//! what `verify` on the derived key cache relies on.

use crate::core::errors::WalletError;
use crate::crypto::kdf::{KDFAlgorithm, KdfParams, CREDENTIAL_LEN};
use crate::security::SecretVec;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

pub const CIPHER_NAME: &str = "aes-256-gcm";
const NONCE_LEN: usize = 12;

type HmacSha256 = Hmac<Sha256>;

/// Output of the KDF for one password. Zeroed on drop.
pub type Credential = Zeroizing<Vec<u8>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherParams {
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub cipher: String,
    pub cipherparams: CipherParams,
    pub ciphertext: String,
    pub kdf: String,
    pub kdfparams: KdfParams,
    pub mac: String,
}

impl EncryptedSecret {
    /// Encrypt `secret` under `password` with a fresh salt and nonce.
    pub fn encrypt(
        password: &str,
        secret: &[u8],
        algorithm: KDFAlgorithm,
        aad: &[u8],
    ) -> Result<Self, WalletError> {
        let kdfparams = KdfParams::generate(algorithm);
        let credential = derive_credential(&kdfparams, password)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(&credential[..32])
            .map_err(|_| WalletError::CryptoError("Invalid key length".to_string()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), Payload { msg: secret, aad })
            .map_err(|_| WalletError::CryptoError("encrypt_failed".to_string()))?;

        let mac = compute_mac(&credential, &nonce_bytes, &ciphertext)?;

        Ok(Self {
            cipher: CIPHER_NAME.to_string(),
            cipherparams: CipherParams { nonce: hex::encode(nonce_bytes) },
            ciphertext: hex::encode(ciphertext),
            kdf: kdfparams.name().to_string(),
            kdfparams,
            mac: hex::encode(mac),
        })
    }

    /// Run the (expensive) KDF for `password` against this blob's parameters.
    pub fn derive_credential(&self, password: &str) -> Result<Credential, WalletError> {
        self.check_header()?;
        derive_credential(&self.kdfparams, password)
    }

    /// Constant-time comparison of the stored MAC with one computed from `credential`.
    pub fn verify_credential(&self, credential: &[u8]) -> Result<bool, WalletError> {
        let (nonce, ciphertext) = self.decode_parts()?;
        let expected = hex::decode(&self.mac)
            .map_err(|_| WalletError::CryptoError("keystore_mac_corrupt".to_string()))?;
        let actual = compute_mac(credential, &nonce, &ciphertext)?;
        Ok(actual.ct_eq(expected.as_slice()).into())
    }

    pub fn verify_password(&self, password: &str) -> Result<bool, WalletError> {
        let credential = self.derive_credential(password)?;
        self.verify_credential(&credential)
    }

    /// Decrypt with a password. A wrong password is an authentication error,
    /// a MAC match followed by a cipher failure means the blob is corrupt.
    pub fn decrypt(&self, password: &str, aad: &[u8]) -> Result<SecretVec, WalletError> {
        let credential = self.derive_credential(password)?;
        self.decrypt_with_credential(&credential, aad)
    }

    pub fn decrypt_with_credential(
        &self,
        credential: &[u8],
        aad: &[u8],
    ) -> Result<SecretVec, WalletError> {
        if !self.verify_credential(credential)? {
            return Err(WalletError::password_incorrect());
        }
        let (nonce, ciphertext) = self.decode_parts()?;
        let cipher = Aes256Gcm::new_from_slice(&credential[..32])
            .map_err(|_| WalletError::CryptoError("Invalid key length".to_string()))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), Payload { msg: &ciphertext, aad })
            .map_err(|_| WalletError::CryptoError("keystore_ciphertext_corrupt".to_string()))?;
        Ok(Zeroizing::new(plaintext))
    }

    fn check_header(&self) -> Result<(), WalletError> {
        if self.cipher != CIPHER_NAME {
            return Err(WalletError::CryptoError(format!("unsupported_cipher: {}", self.cipher)));
        }
        if self.kdf != self.kdfparams.name() {
            return Err(WalletError::CryptoError("kdf_params_mismatch".to_string()));
        }
        Ok(())
    }

    fn decode_parts(&self) -> Result<(Vec<u8>, Vec<u8>), WalletError> {
        let nonce = hex::decode(&self.cipherparams.nonce)
            .map_err(|_| WalletError::CryptoError("keystore_nonce_corrupt".to_string()))?;
        if nonce.len() != NONCE_LEN {
            return Err(WalletError::CryptoError("keystore_nonce_corrupt".to_string()));
        }
        let ciphertext = hex::decode(&self.ciphertext)
            .map_err(|_| WalletError::CryptoError("keystore_ciphertext_corrupt".to_string()))?;
        Ok((nonce, ciphertext))
    }
}

fn derive_credential(params: &KdfParams, password: &str) -> Result<Credential, WalletError> {
    let credential = params
        .derive(password.as_bytes())
        .map_err(|e| WalletError::CryptoError(format!("kdf_failed: {}", e)))?;
    if credential.len() != CREDENTIAL_LEN {
        return Err(WalletError::CryptoError("kdf_output_length".to_string()));
    }
    Ok(credential)
}

fn compute_mac(credential: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, WalletError> {
    if credential.len() != CREDENTIAL_LEN {
        return Err(WalletError::CryptoError("credential_length_invalid".to_string()));
    }
    let mut mac = <HmacSha256 as Mac>::new_from_slice(&credential[32..])
        .map_err(|_| WalletError::CryptoError("Invalid mac key length".to_string()))?;
    mac.update(nonce);
    mac.update(ciphertext);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FAST: KDFAlgorithm = KDFAlgorithm::PBKDF2 { iterations: 16 };

    #[test]
    fn test_encrypt_decrypt() {
        let blob = EncryptedSecret::encrypt("pw", b"hello secret", FAST, b"aad").unwrap();
        assert_eq!(blob.cipher, "aes-256-gcm");
        assert_eq!(blob.kdf, "pbkdf2");
        let plain = blob.decrypt("pw", b"aad").unwrap();
        assert_eq!(plain.as_slice(), b"hello secret");
    }

    #[test]
    fn test_wrong_password_is_authentication_error() {
        let blob = EncryptedSecret::encrypt("pw", b"data", FAST, b"").unwrap();
        assert_eq!(blob.decrypt("nope", b"").unwrap_err(), WalletError::password_incorrect());
        assert!(!blob.verify_password("nope").unwrap());
        assert!(blob.verify_password("pw").unwrap());
    }

    #[test]
    fn test_wrong_aad_is_crypto_error() {
        let blob = EncryptedSecret::encrypt("pw", b"data", FAST, b"wallet-a").unwrap();
        let err = blob.decrypt("pw", b"wallet-b").unwrap_err();
        assert!(matches!(err, WalletError::CryptoError(_)));
    }

    #[test]
    fn test_tampered_ciphertext_fails_mac() {
        let mut blob = EncryptedSecret::encrypt("pw", b"data", FAST, b"").unwrap();
        let mut raw = hex::decode(&blob.ciphertext).unwrap();
        raw[0] ^= 0xff;
        blob.ciphertext = hex::encode(raw);
        assert!(!blob.verify_password("pw").unwrap());
    }

    #[test]
    fn test_scrypt_blob_serializes() {
        let blob = EncryptedSecret::encrypt(
            "pw",
            b"data",
            KDFAlgorithm::Scrypt { n: 1024, r: 8, p: 1 },
            b"",
        )
        .unwrap();
        let json = serde_json::to_string(&blob).unwrap();
        let back: EncryptedSecret = serde_json::from_str(&json).unwrap();
        assert_eq!(back, blob);
        assert_eq!(back.decrypt("pw", b"").unwrap().as_slice(), b"data");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]
        #[test]
        fn prop_roundtrip(secret in proptest::collection::vec(any::<u8>(), 0..96), pw in "[a-zA-Z0-9]{0,16}") {
            let blob = EncryptedSecret::encrypt(&pw, &secret, FAST, b"x").unwrap();
            let plain = blob.decrypt(&pw, b"x").unwrap();
            prop_assert_eq!(plain.as_slice(), secret.as_slice());
        }
    }
}
