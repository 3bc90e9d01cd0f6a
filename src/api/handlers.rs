//! One handler per boundary method: decode the request, call the process-wide
//! `WalletManager`, encode the response.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::api::error_channel;
use crate::api::types::*;
use crate::core::config::CoreConfig;
use crate::core::errors::WalletError;
use crate::core::logging::init_logging;
use crate::core::wallet_manager::WalletManager;

static WALLET_MANAGER: Lazy<RwLock<Option<Arc<WalletManager>>>> = Lazy::new(|| RwLock::new(None));

/// The instance created by `init_token_core_x`.
pub fn manager() -> Result<Arc<WalletManager>, WalletError> {
    WALLET_MANAGER
        .read()
        .clone()
        .ok_or_else(|| WalletError::ValidationError("core_not_initialized".to_string()))
}

/// Create the process-wide instance, replacing (and shutting down) any previous one.
pub fn init(config: CoreConfig) -> Result<(), WalletError> {
    if let Some(level) = &config.log_level {
        init_logging(level);
    }
    let manager = Arc::new(WalletManager::new(config)?);
    let previous = WALLET_MANAGER.write().replace(manager);
    if let Some(previous) = previous {
        previous.shutdown();
    }
    Ok(())
}

/// Drop the instance, zeroizing every cached secret. Returns whether one existed.
pub fn shutdown() -> bool {
    match WALLET_MANAGER.write().take() {
        Some(manager) => {
            manager.shutdown();
            true
        }
        None => false,
    }
}

fn decode<T: serde::de::DeserializeOwned>(param: Value) -> Result<T, WalletError> {
    Ok(serde_json::from_value(param)?)
}

fn encode<T: Serialize>(value: &T) -> Result<Value, WalletError> {
    serde_json::to_value(value).map_err(|e| WalletError::InternalError(format!("encode: {}", e)))
}

fn success() -> Value {
    json!({ "isSuccess": true })
}

pub fn init_token_core_x(param: Value) -> Result<Value, WalletError> {
    let config: CoreConfig = decode(param)?;
    config.validate()?;
    init(config)?;
    info!("token core initialized");
    Ok(success())
}

pub fn shutdown_token_core_x(_param: Value) -> Result<Value, WalletError> {
    shutdown();
    Ok(success())
}

/// Succeeds even when files were skipped; those are also reported as a
/// `PartialScanError` in the error channel.
pub fn scan_wallets(param: Value) -> Result<Value, WalletError> {
    let param: ScanParam = if param.is_null() { ScanParam::default() } else { decode(param)? };
    let manager = manager()?;
    let report = match &param.file_dir {
        Some(dir) => manager.scan_wallets_in(dir)?,
        None => manager.scan_wallets()?,
    };
    if report.is_partial() {
        error_channel::report(&WalletError::PartialScanError(report.summary()));
    }
    encode(&report)
}

pub fn create_wallet(param: Value) -> Result<Value, WalletError> {
    let p: CreateWalletParam = decode(param)?;
    encode(&manager()?.create_wallet(&p.password, &p.chain, p.meta.options())?)
}

pub fn import_wallet_from_mnemonic(param: Value) -> Result<Value, WalletError> {
    let p: ImportMnemonicParam = decode(param)?;
    encode(&manager()?.import_mnemonic(&p.mnemonic, &p.password, &p.chain, p.meta.options())?)
}

pub fn import_wallet_from_private_key(param: Value) -> Result<Value, WalletError> {
    let p: ImportPrivateKeyParam = decode(param)?;
    encode(&manager()?.import_private_key(&p.private_key, &p.password, &p.chain, p.meta.options())?)
}

pub fn export_mnemonic(param: Value) -> Result<Value, WalletError> {
    let p: WalletKeyParam = decode(param)?;
    encode(&manager()?.export_mnemonic(&p.id, &p.password)?)
}

pub fn export_private_key(param: Value) -> Result<Value, WalletError> {
    let p: ExportPrivateKeyParam = decode(param)?;
    encode(&manager()?.export_private_key(&p.id, &p.password, p.path.as_deref())?)
}

pub fn find_wallet_by_mnemonic(param: Value) -> Result<Value, WalletError> {
    let p: FindByMnemonicParam = decode(param)?;
    encode(&manager()?.find_by_mnemonic(&p.mnemonic, p.filter.params().as_ref())?)
}

pub fn find_wallet_by_private_key(param: Value) -> Result<Value, WalletError> {
    let p: FindByPrivateKeyParam = decode(param)?;
    encode(&manager()?.find_by_private_key(&p.private_key, p.filter.params().as_ref())?)
}

pub fn remove_wallet(param: Value) -> Result<Value, WalletError> {
    let p: WalletKeyParam = decode(param)?;
    manager()?.remove_wallet(&p.id, &p.password)?;
    Ok(success())
}

/// A wrong password is an `AuthenticationError`, not a `false` result.
pub fn verify_password(param: Value) -> Result<Value, WalletError> {
    let p: WalletKeyParam = decode(param)?;
    if !manager()?.verify_password(&p.id, &p.password)? {
        return Err(WalletError::password_incorrect());
    }
    Ok(success())
}

pub fn change_password(param: Value) -> Result<Value, WalletError> {
    let p: ChangePasswordParam = decode(param)?;
    encode(&manager()?.change_password(&p.id, &p.old_password, &p.new_password)?)
}

pub fn list_wallets(_param: Value) -> Result<Value, WalletError> {
    encode(&manager()?.list_wallets()?)
}

pub fn get_wallet(param: Value) -> Result<Value, WalletError> {
    let p: WalletIdParam = decode(param)?;
    encode(&manager()?.wallet(&p.id)?)
}

pub fn derive_accounts(param: Value) -> Result<Value, WalletError> {
    let p: DeriveAccountsParam = decode(param)?;
    let accounts = manager()?.derive_accounts(&p.id, &p.password, &p.derivations)?;
    Ok(json!({ "accounts": encode(&accounts)? }))
}

pub fn get_accounts(param: Value) -> Result<Value, WalletError> {
    let p: WalletIdParam = decode(param)?;
    Ok(json!({ "accounts": encode(&manager()?.accounts(&p.id)?)? }))
}

pub fn sign_message(param: Value) -> Result<Value, WalletError> {
    let p: SignMessageParam = decode(param)?;
    encode(&manager()?.sign_message(&p.id, p.password.as_deref(), &p.message, p.path.as_deref())?)
}

pub fn sign_transaction(param: Value) -> Result<Value, WalletError> {
    let p: SignTxParam = decode(param)?;
    encode(&manager()?.sign_transaction(&p.id, p.password.as_deref(), &p.tx, p.chain_type)?)
}

pub fn calc_external_address(param: Value) -> Result<Value, WalletError> {
    let p: ExternalAddressParam = decode(param)?;
    encode(&manager()?.calc_external_address(&p.id, p.external_idx)?)
}

pub fn cache_derived_key(param: Value) -> Result<Value, WalletError> {
    let p: WalletKeyParam = decode(param)?;
    encode(&manager()?.cache_derived_key(&p.id, &p.password)?)
}

pub fn get_derived_key(param: Value) -> Result<Value, WalletError> {
    let p: WalletIdParam = decode(param)?;
    encode(&manager()?.get_derived_key(&p.id)?)
}

pub fn verify_derived_key(param: Value) -> Result<Value, WalletError> {
    let p: WalletKeyParam = decode(param)?;
    let valid = manager()?.verify_derived_key(&p.id, &p.password)?;
    Ok(json!({ "id": p.id, "valid": valid }))
}

pub fn clear_derived_key(param: Value) -> Result<Value, WalletError> {
    let p: ClearDerivedKeyParam = if param.is_null() { ClearDerivedKeyParam::default() } else { decode(param)? };
    let cleared = manager()?.clear_derived_key(p.id.as_ref());
    Ok(json!({ "cleared": cleared }))
}
