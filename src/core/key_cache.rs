//! Session cache of password-unlocked wallet secrets.
//!
//! An entry holds the secret an HD wallet derives from (the 64-byte BIP39
//! seed) or the raw key of a private-key wallet. Entries live until cleared
//! or until the process ends; there is no TTL. Secrets sit in
//! `secrecy::SecretVec`, which zeroizes the buffer when the entry is dropped.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretVec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::core::errors::WalletError;
use crate::core::wallet_info::WalletRecord;
use crate::security::redaction::redact_hex_bytes;
use crate::security::SecretVec as ZeroizingVec;

struct CachedKeyEntry {
    secret: SecretVec<u8>,
    /// MAC of the keystore the secret was unlocked from; a re-encrypted
    /// keystore no longer matches and the entry is stale.
    mac: String,
    key_hash: String,
    cached_at: DateTime<Utc>,
}

/// What the host learns about a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheHandle {
    pub id: Uuid,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
}

impl CacheHandle {
    pub fn absent(id: Uuid) -> Self {
        Self { id, cached: false, key_hash: None, cached_at: None }
    }
}

/// HD keystores encrypt the mnemonic and derive from its BIP39 seed;
/// private-key keystores encrypt and use the key itself.
pub fn secret_from_plaintext(record: &WalletRecord, plaintext: &[u8]) -> Result<ZeroizingVec, WalletError> {
    if record.is_hd() {
        let phrase = std::str::from_utf8(plaintext)
            .map_err(|_| WalletError::CryptoError("keystore_plaintext_corrupt".to_string()))?;
        let mnemonic = bip39::Mnemonic::parse_normalized(phrase)
            .map_err(|_| WalletError::CryptoError("keystore_plaintext_corrupt".to_string()))?;
        Ok(Zeroizing::new(mnemonic.to_seed_normalized("").to_vec()))
    } else {
        if plaintext.len() != 32 {
            return Err(WalletError::CryptoError("keystore_plaintext_corrupt".to_string()));
        }
        Ok(Zeroizing::new(plaintext.to_vec()))
    }
}

#[derive(Default)]
pub struct DerivedKeyCache {
    entries: RwLock<HashMap<Uuid, CachedKeyEntry>>,
}

impl DerivedKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the KDF once for `password`, decrypt the wallet secret and keep it.
    /// A wrong password fails with `password_incorrect` and leaves any
    /// existing entry in place.
    pub fn cache(&self, record: &WalletRecord, password: &str) -> Result<CacheHandle, WalletError> {
        let secret = self.unlock(record, password)?;
        Ok(self.insert(record, secret))
    }

    /// Cached secret, or a fresh unlock when a password is given.
    ///
    /// Without a password the wallet must have been cached before; otherwise
    /// the call fails with `wallet_locked`.
    pub fn resolve(&self, record: &WalletRecord, password: Option<&str>) -> Result<ZeroizingVec, WalletError> {
        match password {
            Some(password) => self.unlock(record, password),
            None => self
                .get(record)
                .ok_or_else(|| WalletError::AuthenticationError("wallet_locked".to_string())),
        }
    }

    /// Store an already decrypted secret for `record`.
    pub fn insert(&self, record: &WalletRecord, secret: ZeroizingVec) -> CacheHandle {
        debug!(id = %record.id, secret = %redact_hex_bytes(&secret), "caching unlocked secret");
        let entry = CachedKeyEntry {
            secret: SecretVec::new(secret.to_vec()),
            mac: record.crypto.mac.clone(),
            key_hash: record.key_hash.clone(),
            cached_at: Utc::now(),
        };
        let handle = CacheHandle {
            id: record.id,
            cached: true,
            key_hash: Some(entry.key_hash.clone()),
            cached_at: Some(entry.cached_at),
        };
        self.entries.write().insert(record.id, entry);
        info!(id = %record.id, "derived key cached");
        handle
    }

    /// Copy of the cached secret for `record`, if one is cached and still
    /// matches the keystore. A stale entry is dropped.
    pub fn get(&self, record: &WalletRecord) -> Option<ZeroizingVec> {
        {
            let entries = self.entries.read();
            match entries.get(&record.id) {
                None => return None,
                Some(entry) if entry.mac == record.crypto.mac => {
                    return Some(Zeroizing::new(entry.secret.expose_secret().clone()));
                }
                Some(_) => {}
            }
        }
        self.remove_if_stale(record);
        None
    }

    /// Drop the entry of `record` if its MAC still differs. The check is
    /// repeated under the write lock so a fresh `cache` call is never undone.
    fn remove_if_stale(&self, record: &WalletRecord) -> bool {
        let mut entries = self.entries.write();
        let stale = entries.get(&record.id).is_some_and(|entry| entry.mac != record.crypto.mac);
        if stale {
            debug!(id = %record.id, "dropping stale cache entry");
            entries.remove(&record.id);
        }
        stale
    }

    pub fn handle(&self, id: &Uuid) -> CacheHandle {
        match self.entries.read().get(id) {
            Some(entry) => CacheHandle {
                id: *id,
                cached: true,
                key_hash: Some(entry.key_hash.clone()),
                cached_at: Some(entry.cached_at),
            },
            None => CacheHandle::absent(*id),
        }
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Re-derive the KDF for `password` and compare MACs in constant time.
    /// Never touches the cache.
    pub fn verify(&self, record: &WalletRecord, password: &str) -> Result<bool, WalletError> {
        record.crypto.verify_password(password)
    }

    /// Decrypt without caching and turn the plaintext into the secret keys
    /// are derived from.
    pub fn unlock(&self, record: &WalletRecord, password: &str) -> Result<ZeroizingVec, WalletError> {
        let plaintext = record.crypto.decrypt(password, &record.aad())?;
        secret_from_plaintext(record, &plaintext)
    }

    /// Remove one entry; its secret is zeroized on drop.
    pub fn clear(&self, id: &Uuid) -> bool {
        let removed = self.entries.write().remove(id).is_some();
        if removed {
            info!(%id, "derived key cleared");
        }
        removed
    }

    pub fn clear_all(&self) -> usize {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        info!(count, "all derived keys cleared");
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{ChainType, Network, SegWit};
    use crate::core::wallet_info::{Account, Metadata, Source, PRIVATE_KEY_VERSION};
    use crate::crypto::kdf::KDFAlgorithm;
    use crate::crypto::keystore_crypto::EncryptedSecret;

    fn record(secret: &[u8], password: &str) -> WalletRecord {
        let id = Uuid::new_v4();
        WalletRecord {
            id,
            version: PRIVATE_KEY_VERSION,
            key_hash: "cd".repeat(20),
            crypto: EncryptedSecret::encrypt(
                password,
                secret,
                KDFAlgorithm::PBKDF2 { iterations: 8 },
                &WalletRecord::aad_for(&id),
            )
            .unwrap(),
            account: Account {
                chain_type: ChainType::Ethereum,
                network: Network::Mainnet,
                seg_wit: SegWit::None,
                address: "0x0".to_string(),
                path: None,
                ext_pub_key: None,
            },
            derived_accounts: Vec::new(),
            meta: Metadata { name: "t".into(), password_hint: None, created_at: Utc::now(), source: Source::PrivateKey },
        }
    }

    #[test]
    fn test_cache_get_clear() {
        let cache = DerivedKeyCache::new();
        let rec = record(&[9u8; 32], "pw");
        assert!(cache.get(&rec).is_none());

        let handle = cache.cache(&rec, "pw").unwrap();
        assert!(handle.cached);
        assert_eq!(cache.get(&rec).unwrap().as_slice(), &[9u8; 32]);

        assert!(cache.clear(&rec.id));
        assert!(cache.get(&rec).is_none());
        assert!(!cache.clear(&rec.id));
    }

    #[test]
    fn test_wrong_password_leaves_entry() {
        let cache = DerivedKeyCache::new();
        let rec = record(&[1u8; 32], "pw");
        cache.cache(&rec, "pw").unwrap();

        assert!(!cache.verify(&rec, "wrong").unwrap());
        assert_eq!(cache.cache(&rec, "wrong").unwrap_err(), WalletError::password_incorrect());
        assert_eq!(cache.get(&rec).unwrap().as_slice(), &[1u8; 32]);
        assert!(cache.verify(&rec, "pw").unwrap());
    }

    #[test]
    fn test_stale_entry_after_reencryption() {
        let cache = DerivedKeyCache::new();
        let mut rec = record(&[2u8; 32], "pw");
        cache.cache(&rec, "pw").unwrap();
        rec.crypto = EncryptedSecret::encrypt(
            "new",
            &[2u8; 32],
            KDFAlgorithm::PBKDF2 { iterations: 8 },
            &rec.aad(),
        )
        .unwrap();
        assert!(cache.get(&rec).is_none());
        assert!(!cache.contains(&rec.id));
    }

    #[test]
    fn test_stale_removal_spares_fresh_entry() {
        let cache = DerivedKeyCache::new();
        let old = record(&[6u8; 32], "pw");
        let mut current = old.clone();
        current.crypto = EncryptedSecret::encrypt("pw", &[6u8; 32], KDFAlgorithm::PBKDF2 { iterations: 8 }, &old.aad())
            .unwrap();

        // an entry unlocked from the current keystore survives a stale check against it
        cache.cache(&current, "pw").unwrap();
        assert!(!cache.remove_if_stale(&current));
        assert!(cache.contains(&current.id));

        // checked against the superseded record it is stale
        assert!(cache.remove_if_stale(&old));
        assert!(!cache.contains(&current.id));
        assert!(!cache.remove_if_stale(&old));
    }

    #[test]
    fn test_resolve_requires_cache_without_password() {
        let cache = DerivedKeyCache::new();
        let rec = record(&[5u8; 32], "pw");
        assert_eq!(
            cache.resolve(&rec, None).unwrap_err(),
            WalletError::AuthenticationError("wallet_locked".to_string())
        );
        assert_eq!(cache.resolve(&rec, Some("pw")).unwrap().as_slice(), &[5u8; 32]);
        assert!(!cache.contains(&rec.id));
        cache.cache(&rec, "pw").unwrap();
        assert_eq!(cache.resolve(&rec, None).unwrap().as_slice(), &[5u8; 32]);
    }

    #[test]
    fn test_clear_all() {
        let cache = DerivedKeyCache::new();
        let a = record(&[3u8; 32], "a");
        let b = record(&[4u8; 32], "b");
        cache.cache(&a, "a").unwrap();
        cache.cache(&b, "b").unwrap();
        assert!(cache.contains(&a.id) && cache.contains(&b.id));
        assert_eq!(cache.clear_all(), 2);
        assert!(!cache.contains(&b.id));
        assert!(!cache.handle(&a.id).cached);
    }
}
