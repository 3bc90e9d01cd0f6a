//! Wallet Manager Core Module
//!
//! Owns the keystore registry, the keystore directory and the derived key
//! cache, and implements every wallet operation on top of them.
//!
//! ## Module Structure
//! - `lifecycle` - create, import, derive accounts, remove, scan, list, change password
//! - `keys` - export, lookup by secret, password checks, derived key cache
//! - `address` - external address computation from the account xpub
//! - `signing` - message and transaction signing

pub mod address;
pub mod keys;
pub mod lifecycle;
pub mod signing;

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::core::config::CoreConfig;
use crate::core::errors::WalletError;
use crate::core::key_cache::DerivedKeyCache;
use crate::core::wallet_info::WalletRecord;
use crate::storage::KeystoreDir;

/// Per-wallet options supplied at create/import time.
#[derive(Debug, Clone, Default)]
pub struct WalletOptions {
    pub name: Option<String>,
    pub password_hint: Option<String>,
    /// Replace an existing wallet holding the same secret
    pub overwrite: bool,
}

/// Wallet manager
///
/// Mutations of the registry take the write lock for the check-then-write
/// section only; the KDF runs outside any lock.
pub struct WalletManager {
    pub config: CoreConfig,
    store: RwLock<KeystoreDir>,
    /// Loaded keystores (id → record)
    wallets: RwLock<HashMap<Uuid, WalletRecord>>,
    cache: DerivedKeyCache,
}

impl WalletManager {
    /// Open the keystore directory named by `config` and load every keystore in it.
    ///
    /// Files that fail to load are logged and skipped; `scan_wallets`
    /// reports them to the caller.
    pub fn new(config: CoreConfig) -> Result<Self, WalletError> {
        config.validate()?;
        let store = KeystoreDir::open(&config.file_dir)?;
        let manager = Self {
            config,
            store: RwLock::new(store),
            wallets: RwLock::new(HashMap::new()),
            cache: DerivedKeyCache::new(),
        };
        let report = manager.scan_wallets()?;
        info!(
            dir = %manager.store.read().dir().display(),
            loaded = report.loaded,
            failed = report.failures.len(),
            "wallet manager initialized"
        );
        Ok(manager)
    }

    /// Clone of the record registered under `id`.
    pub(crate) fn record(&self, id: &Uuid) -> Result<WalletRecord, WalletError> {
        self.wallets.read().get(id).cloned().ok_or_else(WalletError::wallet_not_found)
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.read().len()
    }

    pub fn cache(&self) -> &DerivedKeyCache {
        &self.cache
    }

    /// Drop every cached secret and forget the registry. Keystore files stay on disk.
    pub fn shutdown(&self) {
        let cleared = self.cache.clear_all();
        self.wallets.write().clear();
        info!(cleared, "wallet manager shut down");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::crypto::kdf::KDFAlgorithm;

    pub const ABANDON: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    pub fn manager(dir: &std::path::Path) -> WalletManager {
        let config = CoreConfig::new(dir).with_kdf(KDFAlgorithm::PBKDF2 { iterations: 16 });
        WalletManager::new(config).unwrap()
    }
}
