//! Wallet lifecycle management
//!
//! Create, import, extend with derived accounts, remove, rescan and
//! re-encrypt keystores.

use bip39::Mnemonic;
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::{WalletManager, WalletOptions};
use crate::blockchain::signer_for;
use crate::core::derivation::{account_xpub, address_from_private_key, derive_address, PathDescriptor};
use crate::core::domain::ChainParams;
use crate::core::errors::WalletError;
use crate::core::wallet_info::{
    Account, Metadata, Source, WalletDescriptor, WalletRecord, HD_VERSION, PRIVATE_KEY_VERSION,
};
use crate::crypto::hash::key_hash;
use crate::crypto::keystore_crypto::EncryptedSecret;
use crate::storage::{KeystoreDir, ScanFailure};

/// Entropy of a generated mnemonic: 128 bits, 12 words.
const NEW_MNEMONIC_ENTROPY: usize = 16;

/// Result of a keystore directory scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub loaded: usize,
    pub failures: Vec<ScanFailure>,
}

impl ScanReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// One-line summary for the error channel.
    pub fn summary(&self) -> String {
        let paths: Vec<&str> = self.failures.iter().map(|f| f.path.as_str()).collect();
        format!("{} keystore(s) skipped: {}", self.failures.len(), paths.join(", "))
    }
}

impl WalletManager {
    /// Create an HD wallet from a freshly generated 12-word mnemonic.
    ///
    /// # Errors
    /// * `WalletError::ValidationError` - chain parameters or path are invalid
    /// * `WalletError::CryptoError` - randomness or encryption failure
    /// * `WalletError::IoError` - the keystore could not be written
    pub fn create_wallet(
        &self,
        password: &str,
        params: &ChainParams,
        options: WalletOptions,
    ) -> Result<WalletDescriptor, WalletError> {
        let mut entropy = Zeroizing::new([0u8; NEW_MNEMONIC_ENTROPY]);
        OsRng.fill_bytes(entropy.as_mut());
        let mnemonic = Mnemonic::from_entropy(entropy.as_ref())
            .map_err(|e| WalletError::CryptoError(format!("mnemonic_generation_failed: {}", e)))?;
        let phrase = Zeroizing::new(mnemonic.to_string());
        info!(chain = %params.chain_type, "creating wallet");
        self.import_hd(&phrase, password, params, options, Source::NewMnemonic)
    }

    /// Import a BIP39 mnemonic.
    ///
    /// Word list, word count and checksum are validated before anything is
    /// written. Importing a mnemonic that is already stored fails with
    /// `wallet_exists` unless `options.overwrite` is set.
    pub fn import_mnemonic(
        &self,
        mnemonic: &str,
        password: &str,
        params: &ChainParams,
        options: WalletOptions,
    ) -> Result<WalletDescriptor, WalletError> {
        info!(chain = %params.chain_type, "importing mnemonic");
        self.import_hd(mnemonic, password, params, options, Source::Mnemonic)
    }

    /// Import a single private key: WIF for Bitcoin-family chains, or 64 hex characters.
    pub fn import_private_key(
        &self,
        private_key: &str,
        password: &str,
        params: &ChainParams,
        options: WalletOptions,
    ) -> Result<WalletDescriptor, WalletError> {
        params.validate()?;
        let signer = signer_for(params.chain_type);
        let key = signer.parse_private_key(private_key, params.network)?;
        let source = if is_hex_key(private_key) { Source::PrivateKey } else { Source::Wif };
        let hash = key_hash(key.as_ref());
        let account = key_account(key.as_ref(), params)?;
        info!(chain = %params.chain_type, address = %account.address, "importing private key");
        self.store_new(PRIVATE_KEY_VERSION, key.as_ref(), hash, account, password, options, source)
    }

    fn import_hd(
        &self,
        mnemonic: &str,
        password: &str,
        params: &ChainParams,
        options: WalletOptions,
        source: Source,
    ) -> Result<WalletDescriptor, WalletError> {
        params.validate()?;
        let mnemonic = Mnemonic::parse_normalized(mnemonic.trim())?;
        let phrase = Zeroizing::new(mnemonic.to_string());
        let seed = Zeroizing::new(mnemonic.to_seed_normalized("").to_vec());
        let account = hd_account(&seed, params)?;
        let hash = key_hash(&seed);
        self.store_new(HD_VERSION, phrase.as_bytes(), hash, account, password, options, source)
    }

    /// Encrypt `secret`, persist the record and register it.
    #[allow(clippy::too_many_arguments)]
    fn store_new(
        &self,
        version: u32,
        secret: &[u8],
        hash: String,
        account: Account,
        password: &str,
        options: WalletOptions,
        source: Source,
    ) -> Result<WalletDescriptor, WalletError> {
        let existing = self.find_existing(&hash, &account);
        if existing.is_some() && !options.overwrite {
            return Err(WalletError::ValidationError("wallet_exists".to_string()));
        }
        let id = existing.unwrap_or_else(Uuid::new_v4);

        // KDF runs before the write lock is taken
        let crypto = EncryptedSecret::encrypt(
            password,
            secret,
            self.config.effective_kdf(),
            &WalletRecord::aad_for(&id),
        )?;
        let mut record = WalletRecord {
            id,
            version,
            key_hash: hash,
            crypto,
            derived_accounts: Vec::new(),
            meta: Metadata {
                name: options.name.unwrap_or_else(|| format!("{} wallet", account.chain_type.symbol())),
                password_hint: options.password_hint,
                created_at: Utc::now(),
                source,
            },
            account,
        };

        let mut wallets = self.wallets.write();
        // Another import of the same secret may have landed meanwhile
        let raced = wallets
            .values()
            .any(|w| w.id != id && w.key_hash == record.key_hash && same_account(&w.account, &record.account));
        if raced {
            return Err(WalletError::ValidationError("wallet_exists".to_string()));
        }
        // Overwriting a mnemonic keeps the accounts derived from it
        if let Some(previous) = wallets.get(&id).filter(|w| w.is_hd() && record.is_hd()) {
            record.derived_accounts = previous.derived_accounts.clone();
        }
        self.store.read().flush(&record)?;
        wallets.insert(id, record.clone());
        drop(wallets);

        // An overwritten keystore has a new MAC; make the stale entry go away now
        self.cache.clear(&id);
        info!(id = %id, address = %record.account.address, "wallet stored");
        self.describe(&record)
    }

    fn find_existing(&self, hash: &str, account: &Account) -> Option<Uuid> {
        self.wallets
            .read()
            .values()
            .find(|w| w.key_hash == hash && same_account(&w.account, account))
            .map(|w| w.id)
    }

    /// Derive one more account per entry of `derivations` from an HD
    /// wallet's seed and store them on its keystore.
    ///
    /// Accounts already on the wallet are returned but not stored twice.
    /// Signing for a chain other than the primary one uses the first derived
    /// account on that chain.
    ///
    /// # Errors
    /// * `WalletError::ValidationError` - empty `derivations`, invalid chain parameters, or a private-key wallet
    /// * `WalletError::AuthenticationError` - wrong password
    pub fn derive_accounts(
        &self,
        id: &Uuid,
        password: &str,
        derivations: &[ChainParams],
    ) -> Result<Vec<Account>, WalletError> {
        if derivations.is_empty() {
            return Err(WalletError::ValidationError("derivations_empty".to_string()));
        }
        let record = self.record(id)?;
        if !record.is_hd() {
            return Err(WalletError::ValidationError("private_key_wallet_cannot_derive".to_string()));
        }
        let seed = self.cache.unlock(&record, password)?;
        let accounts = derivations
            .iter()
            .map(|params| hd_account(&seed, params))
            .collect::<Result<Vec<_>, _>>()?;

        let mut wallets = self.wallets.write();
        let current = wallets.get(id).ok_or_else(WalletError::wallet_not_found)?;
        let mut updated = current.clone();
        for account in &accounts {
            if !updated.accounts().any(|a| same_account(a, account)) {
                updated.derived_accounts.push(account.clone());
            }
        }
        let added = updated.derived_accounts.len() - current.derived_accounts.len();
        if added > 0 {
            self.store.read().flush(&updated)?;
            wallets.insert(*id, updated);
        }
        drop(wallets);

        info!(id = %id, requested = accounts.len(), added, "accounts derived");
        Ok(accounts)
    }

    /// Every account of a wallet, primary first.
    pub fn accounts(&self, id: &Uuid) -> Result<Vec<Account>, WalletError> {
        Ok(self.record(id)?.accounts().cloned().collect())
    }

    /// Verify the password, then drop the cache entry, the file and the record.
    pub fn remove_wallet(&self, id: &Uuid, password: &str) -> Result<(), WalletError> {
        let record = self.record(id)?;
        if !record.crypto.verify_password(password)? {
            return Err(WalletError::password_incorrect());
        }
        let mut wallets = self.wallets.write();
        self.store.read().delete(id)?;
        wallets.remove(id);
        drop(wallets);
        self.cache.clear(id);
        info!(id = %id, "wallet removed");
        Ok(())
    }

    /// Re-encrypt a keystore under a new password. Any cached secret is cleared.
    pub fn change_password(&self, id: &Uuid, old_password: &str, new_password: &str) -> Result<WalletDescriptor, WalletError> {
        let record = self.record(id)?;
        let plaintext = record.crypto.decrypt(old_password, &record.aad())?;
        let crypto = EncryptedSecret::encrypt(new_password, &plaintext, self.config.effective_kdf(), &record.aad())?;
        let updated = WalletRecord { crypto, ..record };

        let mut wallets = self.wallets.write();
        if !wallets.contains_key(id) {
            return Err(WalletError::wallet_not_found());
        }
        self.store.read().flush(&updated)?;
        wallets.insert(*id, updated.clone());
        drop(wallets);
        self.cache.clear(id);
        info!(id = %id, "wallet password changed");
        self.describe(&updated)
    }

    /// Reload the registry from the keystore directory.
    ///
    /// Every file is parsed independently; a bad file is recorded in the
    /// report and the rest still load. The registry is replaced by what was
    /// loaded, and cache entries of wallets that vanished are cleared.
    ///
    /// The registry write lock is held across the directory read, taken
    /// before the store lock like every other mutation, so an import cannot
    /// land between the read and the replacement.
    pub fn scan_wallets(&self) -> Result<ScanReport, WalletError> {
        let mut wallets = self.wallets.write();
        self.reload(&mut wallets)
    }

    /// Point the manager at another keystore directory and scan it.
    pub fn scan_wallets_in(&self, dir: &Path) -> Result<ScanReport, WalletError> {
        let store = KeystoreDir::open(dir)?;
        let mut wallets = self.wallets.write();
        *self.store.write() = store;
        info!(dir = %dir.display(), "keystore directory switched");
        self.reload(&mut wallets)
    }

    fn reload(&self, wallets: &mut HashMap<Uuid, WalletRecord>) -> Result<ScanReport, WalletError> {
        let outcome = self.store.read().scan()?;
        let loaded: HashMap<Uuid, WalletRecord> = outcome.records.into_iter().map(|r| (r.id, r)).collect();

        for id in wallets.keys() {
            if !loaded.contains_key(id) {
                self.cache.clear(id);
            }
        }
        let report = ScanReport { loaded: loaded.len(), failures: outcome.failures };
        *wallets = loaded;

        if report.is_partial() {
            warn!(loaded = report.loaded, failed = report.failures.len(), "wallet registry reloaded with failures");
        } else {
            info!(loaded = report.loaded, "wallet registry reloaded");
        }
        Ok(report)
    }

    /// Descriptors of all loaded wallets, oldest first.
    pub fn list_wallets(&self) -> Result<Vec<WalletDescriptor>, WalletError> {
        let mut records: Vec<WalletRecord> = self.wallets.read().values().cloned().collect();
        records.sort_by(|a, b| a.meta.created_at.cmp(&b.meta.created_at).then(a.id.cmp(&b.id)));
        records.iter().map(|r| self.describe(r)).collect()
    }

    pub fn wallet(&self, id: &Uuid) -> Result<WalletDescriptor, WalletError> {
        let record = self.record(id)?;
        self.describe(&record)
    }
}

/// Account at the path `params` names (or their default path) below `seed`.
fn hd_account(seed: &[u8], params: &ChainParams) -> Result<Account, WalletError> {
    params.validate()?;
    let path = PathDescriptor::from_params(params)?;
    let derived = derive_address(seed, &path, params)?;
    Ok(Account {
        chain_type: params.chain_type,
        network: params.network,
        seg_wit: params.seg_wit,
        address: derived.address,
        path: Some(path.to_string()),
        ext_pub_key: Some(account_xpub(seed, &path, params.network)?),
    })
}

fn key_account(private_key: &[u8], params: &ChainParams) -> Result<Account, WalletError> {
    let derived = address_from_private_key(private_key, params)?;
    Ok(Account {
        chain_type: params.chain_type,
        network: params.network,
        seg_wit: params.seg_wit,
        address: derived.address,
        path: None,
        ext_pub_key: None,
    })
}

/// The same secret may back one wallet per chain account.
fn same_account(a: &Account, b: &Account) -> bool {
    a.chain_type == b.chain_type && a.network == b.network && a.address == b.address
}

fn is_hex_key(input: &str) -> bool {
    let trimmed = input.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex_part.len() == 64 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{ChainType, Network, SegWit};
    use crate::core::wallet_manager::test_support::{manager, ABANDON};
    use tempfile::TempDir;

    fn btc() -> ChainParams {
        ChainParams::new(ChainType::Bitcoin)
    }

    #[test]
    fn test_import_mnemonic_persists_and_describes() {
        let dir = TempDir::new().unwrap();
        let wm = manager(dir.path());
        let desc = wm.import_mnemonic(ABANDON, "pw", &btc(), WalletOptions::default()).unwrap();
        assert_eq!(desc.address, "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA");
        assert_eq!(desc.source, Source::Mnemonic);
        assert_eq!(desc.path.as_deref(), Some("m/44'/0'/0'/0/0"));
        assert!(desc.external_address.is_some());
        assert!(dir.path().join(format!("{}.json", desc.id)).exists());
    }

    #[test]
    fn test_duplicate_import_rejected_unless_overwrite() {
        let dir = TempDir::new().unwrap();
        let wm = manager(dir.path());
        let first = wm.import_mnemonic(ABANDON, "pw", &btc(), WalletOptions::default()).unwrap();
        let err = wm.import_mnemonic(ABANDON, "pw", &btc(), WalletOptions::default()).unwrap_err();
        assert_eq!(err, WalletError::ValidationError("wallet_exists".to_string()));

        let options = WalletOptions { overwrite: true, name: Some("renamed".to_string()), ..Default::default() };
        let second = wm.import_mnemonic(ABANDON, "pw2", &btc(), options).unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "renamed");
        assert_eq!(wm.wallet_count(), 1);
    }

    #[test]
    fn test_same_mnemonic_on_two_chains() {
        let dir = TempDir::new().unwrap();
        let wm = manager(dir.path());
        wm.import_mnemonic(ABANDON, "pw", &btc(), WalletOptions::default()).unwrap();
        let eth = wm
            .import_mnemonic(ABANDON, "pw", &ChainParams::new(ChainType::Ethereum), WalletOptions::default())
            .unwrap();
        assert_eq!(eth.address, "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");
        assert_eq!(wm.wallet_count(), 2);
    }

    #[test]
    fn test_invalid_mnemonic_rejected() {
        let dir = TempDir::new().unwrap();
        let wm = manager(dir.path());
        let bad_checksum = ABANDON.replace("about", "abandon");
        assert!(matches!(
            wm.import_mnemonic(&bad_checksum, "pw", &btc(), WalletOptions::default()),
            Err(WalletError::ValidationError(_))
        ));
        assert_eq!(wm.wallet_count(), 0);
    }

    #[test]
    fn test_import_wif_and_hex() {
        let dir = TempDir::new().unwrap();
        let wm = manager(dir.path());
        let wif = "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn";
        let desc = wm.import_private_key(wif, "pw", &btc(), WalletOptions::default()).unwrap();
        assert_eq!(desc.source, Source::Wif);
        assert!(desc.path.is_none());

        let eth = wm
            .import_private_key(&"46".repeat(32), "pw", &ChainParams::new(ChainType::Ethereum), WalletOptions::default())
            .unwrap();
        assert_eq!(eth.source, Source::PrivateKey);
        assert_eq!(eth.address, "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F");
    }

    #[test]
    fn test_segwit_rejected_off_bitcoin() {
        let dir = TempDir::new().unwrap();
        let wm = manager(dir.path());
        let params = ChainParams::new(ChainType::Tron).with_seg_wit(SegWit::Segwit);
        assert!(wm.import_mnemonic(ABANDON, "pw", &params, WalletOptions::default()).is_err());
    }

    #[test]
    fn test_remove_requires_password() {
        let dir = TempDir::new().unwrap();
        let wm = manager(dir.path());
        let desc = wm.import_mnemonic(ABANDON, "pw", &btc(), WalletOptions::default()).unwrap();
        assert_eq!(wm.remove_wallet(&desc.id, "nope").unwrap_err(), WalletError::password_incorrect());
        assert_eq!(wm.wallet_count(), 1);

        wm.remove_wallet(&desc.id, "pw").unwrap();
        assert_eq!(wm.wallet_count(), 0);
        assert!(!dir.path().join(format!("{}.json", desc.id)).exists());
        assert_eq!(wm.wallet(&desc.id).unwrap_err(), WalletError::wallet_not_found());
    }

    #[test]
    fn test_change_password() {
        let dir = TempDir::new().unwrap();
        let wm = manager(dir.path());
        let desc = wm.import_mnemonic(ABANDON, "old", &btc(), WalletOptions::default()).unwrap();
        wm.cache_derived_key(&desc.id, "old").unwrap();

        assert!(wm.change_password(&desc.id, "wrong", "new").is_err());
        wm.change_password(&desc.id, "old", "new").unwrap();
        assert!(!wm.cache().contains(&desc.id));
        assert!(!wm.verify_password(&desc.id, "old").unwrap());
        assert!(wm.verify_password(&desc.id, "new").unwrap());
    }

    #[test]
    fn test_scan_reloads_from_disk() {
        let dir = TempDir::new().unwrap();
        let id = {
            let wm = manager(dir.path());
            wm.import_mnemonic(ABANDON, "pw", &btc().with_network(Network::Testnet), WalletOptions::default())
                .unwrap()
                .id
        };
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

        let wm = manager(dir.path());
        let report = wm.scan_wallets().unwrap();
        assert_eq!(report.loaded, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.is_partial());
        assert_eq!(wm.wallet(&id).unwrap().network, Network::Testnet);
    }

    #[test]
    fn test_scan_never_drops_concurrent_imports() {
        let dir = TempDir::new().unwrap();
        let wm = manager(dir.path());
        let chains = [ChainType::Bitcoin, ChainType::BitcoinCash, ChainType::Ethereum, ChainType::Tron];

        let ids = std::thread::scope(|scope| {
            let scanner = scope.spawn(|| {
                for _ in 0..50 {
                    wm.scan_wallets().unwrap();
                }
            });
            let ids: Vec<Uuid> = chains
                .iter()
                .map(|chain| {
                    wm.import_mnemonic(ABANDON, "pw", &ChainParams::new(*chain), WalletOptions::default())
                        .unwrap()
                        .id
                })
                .collect();
            scanner.join().unwrap();
            ids
        });

        assert_eq!(wm.wallet_count(), chains.len());
        for id in &ids {
            assert!(wm.wallet(id).is_ok());
        }
    }

    #[test]
    fn test_derive_accounts_from_one_seed() {
        let dir = TempDir::new().unwrap();
        let wm = manager(dir.path());
        let desc = wm.import_mnemonic(ABANDON, "pw", &btc(), WalletOptions::default()).unwrap();
        let derivations = [ChainParams::new(ChainType::Ethereum), ChainParams::new(ChainType::Tron)];

        assert!(matches!(
            wm.derive_accounts(&desc.id, "nope", &derivations),
            Err(WalletError::AuthenticationError(_))
        ));
        assert!(matches!(wm.derive_accounts(&desc.id, "pw", &[]), Err(WalletError::ValidationError(_))));

        let accounts = wm.derive_accounts(&desc.id, "pw", &derivations).unwrap();
        assert_eq!(accounts[0].address, "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");
        assert_eq!(accounts[0].path.as_deref(), Some("m/44'/60'/0'/0/0"));
        assert_eq!(accounts[1].address, "TUEZSdKsoDHQMeZwihtdoBiN46zxhGWYdH");

        // deriving again stores nothing new
        wm.derive_accounts(&desc.id, "pw", &derivations[..1]).unwrap();
        let all = wm.accounts(&desc.id).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].address, desc.address);

        // the keystore carries them across a restart, and overwrite keeps them
        let wm = manager(dir.path());
        assert_eq!(wm.accounts(&desc.id).unwrap(), all);
        let options = WalletOptions { overwrite: true, ..Default::default() };
        wm.import_mnemonic(ABANDON, "pw", &btc(), options).unwrap();
        assert_eq!(wm.accounts(&desc.id).unwrap().len(), 3);
        assert_eq!(wm.wallet_count(), 1);
    }

    #[test]
    fn test_private_key_wallet_cannot_derive() {
        let dir = TempDir::new().unwrap();
        let wm = manager(dir.path());
        let desc = wm
            .import_private_key(&"46".repeat(32), "pw", &ChainParams::new(ChainType::Ethereum), WalletOptions::default())
            .unwrap();
        assert!(matches!(
            wm.derive_accounts(&desc.id, "pw", &[ChainParams::new(ChainType::Tron)]),
            Err(WalletError::ValidationError(_))
        ));
        assert_eq!(wm.accounts(&desc.id).unwrap().len(), 1);
    }

    #[test]
    fn test_scan_other_directory() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let id = manager(second.path())
            .import_mnemonic(ABANDON, "pw", &btc(), WalletOptions::default())
            .unwrap()
            .id;

        let wm = manager(first.path());
        assert_eq!(wm.wallet_count(), 0);
        let report = wm.scan_wallets_in(second.path()).unwrap();
        assert_eq!(report.loaded, 1);
        assert!(wm.wallet(&id).is_ok());
        assert!(wm.verify_password(&id, "pw").unwrap());
    }
}
