//! Shared helpers for the integration tests.
#![allow(dead_code)]

use ironkey_core::crypto::KDFAlgorithm;
use ironkey_core::{CoreConfig, WalletManager};
use std::path::Path;

pub const ABANDON: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub const PASSWORD: &str = "Insecure Pa55w0rd";

/// Cheap KDF so each test can create several wallets.
pub fn fast_config(dir: &Path) -> CoreConfig {
    CoreConfig::new(dir).with_kdf(KDFAlgorithm::PBKDF2 { iterations: 16 })
}

pub fn manager(dir: &Path) -> WalletManager {
    WalletManager::new(fast_config(dir)).expect("manager")
}
