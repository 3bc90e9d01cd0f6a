//! Ownership of every string handed across the C boundary.
//!
//! Each pointer given to the host is registered with its provenance. The
//! host hands it back exactly once through `free_string` (heap strings) or
//! `free_const_string` (either kind). Pointers the arena does not know are
//! rejected with `InvalidHandle` and never dereferenced.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::io::{self, Write};
use std::os::raw::c_char;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::core::errors::WalletError;
use crate::security::secret::wipe_json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// `CString::into_raw`, freed on release
    Heap,
    /// `'static` storage, never freed
    Static,
}

static OWNED: Lazy<Mutex<HashMap<usize, Provenance>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Hand a heap string to the host. Interior NUL bytes are an internal error.
pub fn hand_out(value: String) -> Result<*const c_char, WalletError> {
    hand_out_bytes(value.into_bytes())
}

/// Serialize `value` and hand it out. Results may carry exported secrets, so
/// the text is written into a buffer sized up front (no reallocation leaves a
/// copy behind) and every string in `value` is wiped afterwards.
pub fn hand_out_json(mut value: Value) -> Result<*const c_char, WalletError> {
    let encode = |e: serde_json::Error| WalletError::InternalError(format!("encode: {}", e));
    let mut counter = ByteCounter(0);
    serde_json::to_writer(&mut counter, &value).map_err(encode)?;

    let mut buf = Zeroizing::new(Vec::with_capacity(counter.0 + 1));
    let written = serde_json::to_writer(&mut *buf, &value).map_err(encode);
    wipe_json(&mut value);
    written?;
    hand_out_bytes(std::mem::take(&mut *buf))
}

fn hand_out_bytes(bytes: Vec<u8>) -> Result<*const c_char, WalletError> {
    let owned = CString::new(bytes).map_err(|e| {
        e.into_vec().zeroize();
        WalletError::InternalError("result contains interior nul".to_string())
    })?;
    let ptr = owned.into_raw() as *const c_char;
    OWNED.lock().insert(ptr as usize, Provenance::Heap);
    Ok(ptr)
}

/// Counts serialized bytes without storing them.
struct ByteCounter(usize);

impl Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hand out constant storage. The same pointer may be handed out many times.
pub fn hand_out_static(value: &'static CStr) -> *const c_char {
    let ptr = value.as_ptr();
    OWNED.lock().insert(ptr as usize, Provenance::Static);
    ptr
}

pub fn provenance(ptr: *const c_char) -> Option<Provenance> {
    OWNED.lock().get(&(ptr as usize)).copied()
}

/// Release a heap string. Null is a no-op; a static, unknown or already
/// released pointer is rejected.
///
/// # Safety
/// `ptr` must be null or a pointer previously returned by this crate.
pub unsafe fn release(ptr: *const c_char) -> Result<(), WalletError> {
    if ptr.is_null() {
        return Ok(());
    }
    let mut owned = OWNED.lock();
    match owned.get(&(ptr as usize)) {
        Some(Provenance::Heap) => {
            owned.remove(&(ptr as usize));
            drop(owned);
            drop(reclaim(ptr));
            debug!("string released");
            Ok(())
        }
        Some(Provenance::Static) => Err(WalletError::InvalidHandle(
            "static string released with free_string".to_string(),
        )),
        None => Err(WalletError::InvalidHandle("unknown or already released string".to_string())),
    }
}

/// Release a string of either provenance. Static strings stay valid.
///
/// # Safety
/// `ptr` must be null or a pointer previously returned by this crate.
pub unsafe fn release_const(ptr: *const c_char) -> Result<(), WalletError> {
    if ptr.is_null() {
        return Ok(());
    }
    match provenance(ptr) {
        Some(Provenance::Static) => Ok(()),
        _ => release(ptr),
    }
}

/// Take back a heap string; its bytes are wiped when the buffer drops.
///
/// # Safety
/// `ptr` must come from `CString::into_raw` and no longer be registered.
unsafe fn reclaim(ptr: *const c_char) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(CString::from_raw(ptr as *mut c_char).into_bytes_with_nul())
}

#[cfg(test)]
mod tests {
    use super::*;

    static CONST: &CStr = match CStr::from_bytes_with_nul(b"constant\0") {
        Ok(s) => s,
        Err(_) => panic!("constant is nul terminated"),
    };

    #[test]
    fn test_heap_string_released_once() {
        let ptr = hand_out("hello".to_string()).unwrap();
        assert_eq!(unsafe { CStr::from_ptr(ptr) }.to_str().unwrap(), "hello");
        assert_eq!(provenance(ptr), Some(Provenance::Heap));
        unsafe {
            assert!(release(ptr).is_ok());
            assert!(matches!(release(ptr), Err(WalletError::InvalidHandle(_))));
        }
    }

    #[test]
    fn test_null_release_is_noop() {
        unsafe {
            assert!(release(std::ptr::null()).is_ok());
            assert!(release_const(std::ptr::null()).is_ok());
        }
    }

    #[test]
    fn test_unknown_pointer_rejected() {
        let foreign = CString::new("not ours").unwrap();
        unsafe {
            assert!(matches!(release(foreign.as_ptr()), Err(WalletError::InvalidHandle(_))));
        }
    }

    #[test]
    fn test_static_provenance() {
        let ptr = hand_out_static(CONST);
        unsafe {
            assert!(release_const(ptr).is_ok());
            assert!(release_const(ptr).is_ok());
            assert!(matches!(release(ptr), Err(WalletError::InvalidHandle(_))));
            assert_eq!(CStr::from_ptr(ptr).to_str().unwrap(), "constant");
        }
    }

    #[test]
    fn test_release_const_frees_heap() {
        let ptr = hand_out("x".to_string()).unwrap();
        unsafe {
            assert!(release_const(ptr).is_ok());
            assert!(release_const(ptr).is_err());
        }
    }

    #[test]
    fn test_json_result_matches_serde_text() {
        let value = serde_json::json!({ "id": 1, "value": "abandon about", "nested": ["x", { "y": "z" }] });
        let expected = value.to_string();
        let ptr = hand_out_json(value).unwrap();
        assert_eq!(unsafe { CStr::from_ptr(ptr) }.to_str().unwrap(), expected);
        unsafe { release(ptr).unwrap() };
    }

    #[test]
    fn test_reclaimed_bytes_are_zeroizing() {
        let ptr = hand_out("seed words".to_string()).unwrap();
        OWNED.lock().remove(&(ptr as usize));
        let bytes: Zeroizing<Vec<u8>> = unsafe { reclaim(ptr) };
        assert_eq!(bytes.as_slice(), b"seed words\0");
    }

    #[test]
    fn test_interior_nul_rejected() {
        assert!(matches!(hand_out("a\0b".to_string()), Err(WalletError::InternalError(_))));
    }
}
