//! `extern "C"` entry points.
//!
//! Every function takes NUL-terminated UTF-8 JSON and returns a string owned
//! by the arena, or null on failure with details in `get_last_err_message`.
//! Returned strings must be released with `free_string`, or with
//! `free_const_string` which also accepts constant results.

use serde_json::Value;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::ptr;

use crate::api::{arena, dispatcher, error_channel, handlers};
use crate::core::errors::WalletError;
use crate::storage;

/// Constant response of operations that only report success.
static SUCCESS_JSON: &CStr = match CStr::from_bytes_with_nul(b"{\"isSuccess\":true}\0") {
    Ok(s) => s,
    Err(_) => panic!("success response must be nul terminated"),
};

unsafe fn read_str<'a>(ptr: *const c_char) -> Result<&'a str, WalletError> {
    if ptr.is_null() {
        return Err(WalletError::ValidationError("null_argument".to_string()));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| WalletError::ValidationError("argument_not_utf8".to_string()))
}

/// Null or blank input is an empty parameter.
unsafe fn read_json(ptr: *const c_char) -> Result<Value, WalletError> {
    if ptr.is_null() {
        return Ok(Value::Null);
    }
    let s = read_str(ptr)?;
    if s.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(s)?)
}

fn hand_out_value(value: Value) -> Result<*const c_char, WalletError> {
    if value == serde_json::json!({ "isSuccess": true }) {
        return Ok(arena::hand_out_static(SUCCESS_JSON));
    }
    arena::hand_out_json(value)
}

unsafe fn call(method: &str, json_str: *const c_char) -> *const c_char {
    error_channel::landingpad(|| {
        let param = read_json(json_str)?;
        hand_out_value(dispatcher::route(method, param)?)
    })
    .unwrap_or(ptr::null())
}

macro_rules! json_entry_points {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            ///
            /// # Safety
            /// `json_str` must be null or a valid NUL-terminated string.
            #[no_mangle]
            pub unsafe extern "C" fn $name(json_str: *const c_char) -> *const c_char {
                call(stringify!($name), json_str)
            }
        )*
    };
}

json_entry_points! {
    /// Reload keystores; `{fileDir?}`. Skipped files leave a `PartialScanError`.
    scan_wallets,
    /// New HD wallet; `{password, chainType, network?, segWit?, path?, name?, passwordHint?}`.
    create_wallet,
    import_wallet_from_mnemonic,
    import_wallet_from_private_key,
    export_mnemonic,
    export_private_key,
    find_wallet_by_mnemonic,
    find_wallet_by_private_key,
    remove_wallet,
    verify_password,
    change_password,
    list_wallets,
    get_wallet,
    /// `{id, password, derivations: [{chainType, network?, segWit?, path?}]}`; HD wallets only.
    derive_accounts,
    /// `{id}` → `{accounts}`, primary account first.
    get_accounts,
    /// `{id, password?, message, path?}`; without a password the cached key is used.
    sign_message,
    /// `{id, password?, chainType?, tx}`
    sign_transaction,
    calc_external_address,
    cache_derived_key,
    get_derived_key,
    verify_derived_key,
    /// `{id?}`; all entries when `id` is absent.
    clear_derived_key,
}

/// Create the process-wide core from `{fileDir, isDebug?, kdf?, logLevel?}`.
/// Failure is reported through the error channel.
///
/// # Safety
/// `json_str` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn init_token_core_x(json_str: *const c_char) {
    error_channel::landingpad(|| {
        let param = read_json(json_str)?;
        dispatcher::route("init_token_core_x", param)
    });
}

/// Drop the core and zeroize every cached secret.
#[no_mangle]
pub extern "C" fn shutdown_token_core_x() {
    error_channel::landingpad(|| {
        handlers::shutdown();
        Ok(())
    });
}

/// Generic entry: `{method, param}` → `{isSuccess, result | error}`.
///
/// # Safety
/// `json_str` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn call_api(json_str: *const c_char) -> *const c_char {
    let outcome = error_channel::landingpad(|| dispatcher::dispatch(read_str(json_str)?));
    let response = dispatcher::respond(outcome);
    match arena::hand_out_json(response) {
        Ok(ptr) => ptr,
        Err(err) => {
            error_channel::report(&err);
            ptr::null()
        }
    }
}

/// File contents, or null with details in `read_file_error`.
///
/// # Safety
/// `path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn read_file(path: *const c_char) -> *const c_char {
    error_channel::clear_read_file();
    let result = read_str(path).and_then(storage::read_file).and_then(arena::hand_out);
    match result {
        Ok(ptr) => ptr,
        Err(err) => {
            error_channel::report_read_file(&err);
            ptr::null()
        }
    }
}

/// `{kind, message}` of the last `read_file` failure on this thread, or null.
#[no_mangle]
pub extern "C" fn read_file_error() -> *const c_char {
    match error_channel::current_read_file() {
        Some(err) => last_error_json(&err),
        None => ptr::null(),
    }
}

#[no_mangle]
pub extern "C" fn clear_err() {
    error_channel::clear();
}

/// `{kind, message}` of the last failure on this thread, or null.
/// Reading does not clear the error.
#[no_mangle]
pub extern "C" fn get_last_err_message() -> *const c_char {
    match error_channel::current() {
        Some(err) => last_error_json(&err),
        None => ptr::null(),
    }
}

fn last_error_json(err: &error_channel::LastError) -> *const c_char {
    serde_json::to_string(err)
        .ok()
        .and_then(|json| arena::hand_out(json).ok())
        .unwrap_or(ptr::null())
}

/// Release a string returned by this library. Null is ignored; an unknown,
/// constant or already released pointer is reported as `InvalidHandle`.
/// A successful release leaves the error channel as it was.
///
/// # Safety
/// `ptr` must not be used after a successful release.
#[no_mangle]
pub unsafe extern "C" fn free_string(ptr: *const c_char) {
    error_channel::guard(|| arena::release(ptr));
}

/// Release a string that may alias constant storage. Constant strings are
/// left alone, heap strings are freed as by `free_string`.
///
/// # Safety
/// `ptr` must not be used after a successful release.
#[no_mangle]
pub unsafe extern "C" fn free_const_string(ptr: *const c_char) {
    error_channel::guard(|| arena::release_const(ptr));
}
