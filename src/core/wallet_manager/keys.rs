//! Key management
//!
//! Secret export, lookup by secret, password checks and the derived key cache.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use zeroize::{Zeroize, Zeroizing};

use super::WalletManager;
use crate::blockchain::signer_for;
use crate::blockchain::traits::parse_hex_private_key;
use crate::core::derivation::{address_from_private_key, derive_address, derive_private_key, PathDescriptor};
use crate::core::domain::{ChainParams, ChainType, Network};
use crate::core::errors::WalletError;
use crate::core::key_cache::CacheHandle;
use crate::core::wallet_info::{WalletDescriptor, WalletRecord};
use crate::crypto::hash::key_hash;
use crate::security::secret::{key_bytes, PrivateKeyBytes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportType {
    Mnemonic,
    PrivateKey,
}

/// An exported secret. The value is wiped when the export is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyExport {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub export_type: ExportType,
    pub value: String,
}

impl Drop for KeyExport {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

/// The key to use inside `record`: its own path, a `change/index` suffix
/// below its account, or a full `m/...` path. Private-key wallets have no
/// path and ignore the request.
pub(crate) fn key_path(record: &WalletRecord, requested: Option<&str>) -> Result<Option<PathDescriptor>, WalletError> {
    let Some(base) = record.path()? else {
        return Ok(None);
    };
    match requested.map(str::trim).filter(|p| !p.is_empty()) {
        None => Ok(Some(base)),
        Some(p) if p.starts_with('m') => Ok(Some(PathDescriptor::parse(record.account.chain_type, p)?)),
        Some(p) => Ok(Some(base.with_relative(p)?)),
    }
}

/// Private key at `path` from an unlocked secret (seed or raw key).
pub(crate) fn key_at(
    record: &WalletRecord,
    secret: &[u8],
    path: Option<&PathDescriptor>,
) -> Result<PrivateKeyBytes, WalletError> {
    match path {
        Some(path) => derive_private_key(secret, path, record.account.network),
        None => key_bytes(secret).ok_or_else(|| WalletError::CryptoError("keystore_plaintext_corrupt".to_string())),
    }
}

impl WalletManager {
    /// Decrypt and return the mnemonic of an HD wallet.
    ///
    /// # Errors
    /// * `WalletError::AuthenticationError` - wrong password
    /// * `WalletError::ValidationError` - the wallet holds a single private key
    pub fn export_mnemonic(&self, id: &Uuid, password: &str) -> Result<KeyExport, WalletError> {
        let record = self.record(id)?;
        if !record.is_hd() {
            return Err(WalletError::ValidationError("private_key_wallet_has_no_mnemonic".to_string()));
        }
        let plaintext = record.crypto.decrypt(password, &record.aad())?;
        let phrase = std::str::from_utf8(&plaintext)
            .map_err(|_| WalletError::CryptoError("keystore_plaintext_corrupt".to_string()))?;
        info!(id = %id, "mnemonic exported");
        Ok(KeyExport { id: *id, export_type: ExportType::Mnemonic, value: phrase.to_string() })
    }

    /// Decrypt and return the private key at `path` (the wallet's own key by
    /// default), formatted the way the chain's wallets import it.
    pub fn export_private_key(&self, id: &Uuid, password: &str, path: Option<&str>) -> Result<KeyExport, WalletError> {
        let record = self.record(id)?;
        let secret = self.cache.unlock(&record, password)?;
        let path = key_path(&record, path)?;
        let key = key_at(&record, &secret, path.as_ref())?;
        let value = signer_for(record.account.chain_type).format_private_key(key.as_ref(), record.account.network)?;
        info!(id = %id, "private key exported");
        Ok(KeyExport { id: *id, export_type: ExportType::PrivateKey, value })
    }

    /// Wallet holding `mnemonic`, matched by seed fingerprint and, when
    /// `params` is given, by the address derived under them on any of its
    /// accounts.
    pub fn find_by_mnemonic(&self, mnemonic: &str, params: Option<&ChainParams>) -> Result<WalletDescriptor, WalletError> {
        let mnemonic = bip39::Mnemonic::parse_normalized(mnemonic.trim())?;
        let seed = Zeroizing::new(mnemonic.to_seed_normalized("").to_vec());
        let expected = match params {
            Some(params) => {
                params.validate()?;
                let path = PathDescriptor::from_params(params)?;
                Some((params.chain_type, params.network, derive_address(&seed, &path, params)?.address))
            }
            None => None,
        };
        self.find_by_fingerprint(&key_hash(&seed), expected)
    }

    /// Wallet holding `private_key`, matched by key fingerprint and, when
    /// `params` is given, by its address under them.
    pub fn find_by_private_key(&self, private_key: &str, params: Option<&ChainParams>) -> Result<WalletDescriptor, WalletError> {
        let (key, expected) = match params {
            Some(params) => {
                params.validate()?;
                let key = signer_for(params.chain_type).parse_private_key(private_key, params.network)?;
                let address = address_from_private_key(key.as_ref(), params)?.address;
                (key, Some((params.chain_type, params.network, address)))
            }
            None => (parse_any_private_key(private_key)?, None),
        };
        self.find_by_fingerprint(&key_hash(key.as_ref()), expected)
    }

    fn find_by_fingerprint(
        &self,
        hash: &str,
        expected: Option<(ChainType, Network, String)>,
    ) -> Result<WalletDescriptor, WalletError> {
        let found = {
            let wallets = self.wallets.read();
            let mut matches: Vec<&WalletRecord> = wallets
                .values()
                .filter(|w| w.key_hash == hash)
                .filter(|w| match &expected {
                    Some((chain, network, address)) => w
                        .accounts()
                        .any(|a| a.chain_type == *chain && a.network == *network && &a.address == address),
                    None => true,
                })
                .collect();
            matches.sort_by_key(|w| w.meta.created_at);
            matches.first().map(|w| (*w).clone())
        };
        match found {
            Some(record) => self.describe(&record),
            None => Err(WalletError::wallet_not_found()),
        }
    }

    /// Check `password` against the keystore MAC.
    pub fn verify_password(&self, id: &Uuid, password: &str) -> Result<bool, WalletError> {
        let record = self.record(id)?;
        record.crypto.verify_password(password)
    }

    /// Unlock the wallet once and keep its secret for password-less signing.
    pub fn cache_derived_key(&self, id: &Uuid, password: &str) -> Result<CacheHandle, WalletError> {
        let record = self.record(id)?;
        self.cache.cache(&record, password)
    }

    /// Handle of the cached secret. Fails with `derived_key_not_cached` when
    /// nothing is cached or the entry went stale.
    pub fn get_derived_key(&self, id: &Uuid) -> Result<CacheHandle, WalletError> {
        let record = self.record(id)?;
        match self.cache.get(&record) {
            Some(_) => Ok(self.cache.handle(id)),
            None => Err(WalletError::NotFoundError("derived_key_not_cached".to_string())),
        }
    }

    /// Whether `password` unlocks the wallet. The cache is left as it is.
    pub fn verify_derived_key(&self, id: &Uuid, password: &str) -> Result<bool, WalletError> {
        let record = self.record(id)?;
        self.cache.verify(&record, password)
    }

    /// Clear one wallet's cached secret, or all of them. Returns how many went.
    pub fn clear_derived_key(&self, id: Option<&Uuid>) -> usize {
        match id {
            Some(id) => usize::from(self.cache.clear(id)),
            None => self.cache.clear_all(),
        }
    }
}

/// Hex, or WIF on either Bitcoin network.
fn parse_any_private_key(input: &str) -> Result<PrivateKeyBytes, WalletError> {
    if let Ok(key) = parse_hex_private_key(input) {
        return Ok(key);
    }
    let bitcoin = signer_for(ChainType::Bitcoin);
    bitcoin
        .parse_private_key(input, Network::Mainnet)
        .or_else(|_| bitcoin.parse_private_key(input, Network::Testnet))
        .map_err(|_| WalletError::ValidationError("private_key_invalid".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::SegWit;
    use crate::core::wallet_manager::test_support::{manager, ABANDON};
    use crate::core::wallet_manager::WalletOptions;
    use tempfile::TempDir;

    #[test]
    fn test_export_mnemonic_roundtrip() {
        let dir = TempDir::new().unwrap();
        let wm = manager(dir.path());
        let messy = format!("  {}  ", ABANDON.replace(' ', "   "));
        let desc = wm
            .import_mnemonic(&messy, "pw", &ChainParams::new(ChainType::Bitcoin), WalletOptions::default())
            .unwrap();
        let export = wm.export_mnemonic(&desc.id, "pw").unwrap();
        assert_eq!(export.value, ABANDON);
        assert_eq!(export.export_type, ExportType::Mnemonic);
        assert_eq!(wm.export_mnemonic(&desc.id, "bad").unwrap_err(), WalletError::password_incorrect());
    }

    #[test]
    fn test_export_private_key_formats() {
        let dir = TempDir::new().unwrap();
        let wm = manager(dir.path());
        let btc = wm
            .import_mnemonic(ABANDON, "pw", &ChainParams::new(ChainType::Bitcoin), WalletOptions::default())
            .unwrap();
        let wif = wm.export_private_key(&btc.id, "pw", None).unwrap();
        assert_eq!(wif.value, "L4p2b9VAf8k5aUahF1JCJUzZkgNEAqLfq8DDdQiyAprQAKSbu8hf");

        let key = "46".repeat(32);
        let eth = wm
            .import_private_key(&key, "pw", &ChainParams::new(ChainType::Ethereum), WalletOptions::default())
            .unwrap();
        assert_eq!(wm.export_private_key(&eth.id, "pw", Some("0/5")).unwrap().value, key);
        assert!(wm.export_mnemonic(&eth.id, "pw").is_err());
    }

    #[test]
    fn test_export_at_relative_path_differs() {
        let dir = TempDir::new().unwrap();
        let wm = manager(dir.path());
        let desc = wm
            .import_mnemonic(ABANDON, "pw", &ChainParams::new(ChainType::Ethereum), WalletOptions::default())
            .unwrap();
        let own = wm.export_private_key(&desc.id, "pw", None).unwrap();
        let same = wm.export_private_key(&desc.id, "pw", Some("m/44'/60'/0'/0/0")).unwrap();
        let other = wm.export_private_key(&desc.id, "pw", Some("0/1")).unwrap();
        assert_eq!(own.value, same.value);
        assert_ne!(own.value, other.value);
    }

    #[test]
    fn test_find_by_mnemonic_and_key() {
        let dir = TempDir::new().unwrap();
        let wm = manager(dir.path());
        let params = ChainParams::new(ChainType::Bitcoin).with_seg_wit(SegWit::Segwit);
        let desc = wm.import_mnemonic(ABANDON, "pw", &params, WalletOptions::default()).unwrap();

        assert_eq!(wm.find_by_mnemonic(ABANDON, None).unwrap().id, desc.id);
        assert_eq!(wm.find_by_mnemonic(ABANDON, Some(&params)).unwrap().id, desc.id);
        // Same secret, different address type
        assert_eq!(
            wm.find_by_mnemonic(ABANDON, Some(&ChainParams::new(ChainType::Bitcoin))).unwrap_err(),
            WalletError::wallet_not_found()
        );

        let key = "46".repeat(32);
        let eth = ChainParams::new(ChainType::Ethereum);
        let pk = wm.import_private_key(&key, "pw", &eth, WalletOptions::default()).unwrap();
        assert_eq!(wm.find_by_private_key(&key, Some(&eth)).unwrap().id, pk.id);
        assert_eq!(wm.find_by_private_key(&format!("0x{}", key), None).unwrap().id, pk.id);
        assert!(wm.find_by_private_key(&"47".repeat(32), None).is_err());
    }

    #[test]
    fn test_cache_lifecycle() {
        let dir = TempDir::new().unwrap();
        let wm = manager(dir.path());
        let desc = wm
            .import_mnemonic(ABANDON, "pw", &ChainParams::new(ChainType::Tron), WalletOptions::default())
            .unwrap();

        assert!(wm.get_derived_key(&desc.id).is_err());
        let handle = wm.cache_derived_key(&desc.id, "pw").unwrap();
        assert!(handle.cached);
        assert!(wm.get_derived_key(&desc.id).unwrap().cached);

        assert!(!wm.verify_derived_key(&desc.id, "wrong").unwrap());
        assert!(wm.get_derived_key(&desc.id).is_ok());
        assert!(wm.verify_derived_key(&desc.id, "pw").unwrap());

        assert_eq!(wm.clear_derived_key(Some(&desc.id)), 1);
        assert_eq!(
            wm.get_derived_key(&desc.id).unwrap_err(),
            WalletError::NotFoundError("derived_key_not_cached".to_string())
        );
    }
}
