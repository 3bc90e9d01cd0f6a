//! Per-thread last-error slot read by the host after a sentinel return.
//!
//! Every boundary call goes through [`landingpad`], which clears the slot,
//! runs the call and reports its error (or panic) before returning. A host
//! therefore never reads an error left over from an earlier call on the
//! same thread. String releases use [`guard`] instead and only write the
//! slot when they fail.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, warn};

use crate::core::errors::{ErrorKind, WalletError};

/// What the host sees through `get_last_err_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&WalletError> for LastError {
    fn from(err: &WalletError) -> Self {
        Self { kind: err.kind(), message: err.message().to_string() }
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<LastError>> = const { RefCell::new(None) };
    /// `read_file` keeps its own slot, separate from the general channel.
    static LAST_READ_FILE_ERROR: RefCell<Option<LastError>> = const { RefCell::new(None) };
}

pub fn clear() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

/// Record `err` as the current error. The last writer wins.
pub fn report(err: &WalletError) {
    if err.is_caller_error() {
        warn!(kind = ?err.kind(), "call failed: {}", err.message());
    } else {
        error!(kind = ?err.kind(), "call failed: {}", err.message());
    }
    LAST_ERROR.with(|e| *e.borrow_mut() = Some(LastError::from(err)));
}

/// The current error, left in place.
pub fn current() -> Option<LastError> {
    LAST_ERROR.with(|e| e.borrow().clone())
}

pub fn clear_read_file() {
    LAST_READ_FILE_ERROR.with(|e| *e.borrow_mut() = None);
}

pub fn report_read_file(err: &WalletError) {
    warn!("read_file failed: {}", err.message());
    LAST_READ_FILE_ERROR.with(|e| *e.borrow_mut() = Some(LastError::from(err)));
}

pub fn current_read_file() -> Option<LastError> {
    LAST_READ_FILE_ERROR.with(|e| e.borrow().clone())
}

/// Run one boundary call: clear, run, report.
///
/// `Ok(v)` comes back as `Some(v)`. An error or a panic is written to the
/// channel and comes back as `None`; the panic does not unwind further.
pub fn landingpad<T, F>(f: F) -> Option<T>
where
    F: FnOnce() -> Result<T, WalletError>,
{
    clear();
    guard(f)
}

/// Run `f` and report its failure, leaving the slot alone when it succeeds.
///
/// Used by the release calls, so freeing a result does not erase the error
/// that came with it.
pub fn guard<T, F>(f: F) -> Option<T>
where
    F: FnOnce() -> Result<T, WalletError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            report(&err);
            None
        }
        Err(payload) => {
            let msg = match payload.downcast_ref::<&str>() {
                Some(s) => (*s).to_string(),
                None => match payload.downcast_ref::<String>() {
                    Some(s) => s.clone(),
                    None => "Box<Any>".to_string(),
                },
            };
            report(&WalletError::InternalError(format!("panic: {}", msg)));
            None
        }
    }
}
