//! Single-entry façade: `{method, param}` in, `{isSuccess, result | error}` out.
//!
//! Typed entry points route through [`route`] as well, so both surfaces
//! share validation and error reporting.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::api::error_channel::{self, LastError};
use crate::api::handlers;
use crate::core::errors::WalletError;
use crate::security::redaction::redact_json_params;

type Handler = fn(Value) -> Result<Value, WalletError>;

/// Every method the core answers to.
pub const METHODS: &[(&str, Handler)] = &[
    ("init_token_core_x", handlers::init_token_core_x),
    ("shutdown_token_core_x", handlers::shutdown_token_core_x),
    ("scan_wallets", handlers::scan_wallets),
    ("create_wallet", handlers::create_wallet),
    ("import_wallet_from_mnemonic", handlers::import_wallet_from_mnemonic),
    ("import_wallet_from_private_key", handlers::import_wallet_from_private_key),
    ("export_mnemonic", handlers::export_mnemonic),
    ("export_private_key", handlers::export_private_key),
    ("find_wallet_by_mnemonic", handlers::find_wallet_by_mnemonic),
    ("find_wallet_by_private_key", handlers::find_wallet_by_private_key),
    ("remove_wallet", handlers::remove_wallet),
    ("verify_password", handlers::verify_password),
    ("change_password", handlers::change_password),
    ("list_wallets", handlers::list_wallets),
    ("get_wallet", handlers::get_wallet),
    ("derive_accounts", handlers::derive_accounts),
    ("get_accounts", handlers::get_accounts),
    ("sign_message", handlers::sign_message),
    ("sign_transaction", handlers::sign_transaction),
    ("calc_external_address", handlers::calc_external_address),
    ("cache_derived_key", handlers::cache_derived_key),
    ("get_derived_key", handlers::get_derived_key),
    ("verify_derived_key", handlers::verify_derived_key),
    ("clear_derived_key", handlers::clear_derived_key),
];

#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub method: String,
    #[serde(default)]
    pub param: Value,
}

/// Run `method` on `param`.
pub fn route(method: &str, param: Value) -> Result<Value, WalletError> {
    let handler = METHODS
        .iter()
        .find(|(name, _)| *name == method)
        .map(|(_, handler)| *handler)
        .ok_or_else(|| WalletError::ValidationError(format!("unsupported_method: {}", method)))?;
    debug!(method, param = %redact_json_params(&param), "dispatching");
    handler(param)
}

/// Decode an envelope and route it. Errors are reported to the channel by
/// the caller's landingpad.
pub fn dispatch(envelope: &str) -> Result<Value, WalletError> {
    let envelope: Envelope = serde_json::from_str(envelope)?;
    route(&envelope.method, envelope.param)
}

/// The response envelope for a finished call.
pub fn respond(outcome: Option<Value>) -> Value {
    match outcome {
        Some(result) => json!({ "isSuccess": true, "result": result }),
        None => {
            let error = error_channel::current().unwrap_or(LastError {
                kind: crate::core::errors::ErrorKind::InternalError,
                message: "unknown".to_string(),
            });
            json!({ "isSuccess": false, "error": error })
        }
    }
}
