// src/security/mod.rs
//! Security-related functionality for the wallet
//!
//! Zeroizing secret buffers and redaction helpers that keep secrets out of logs.

pub mod secret;

// Secret buffer alias re-export
pub use secret::SecretVec;

// Redaction helpers to avoid accidental secret prints
pub mod redaction;
pub use redaction::{redact_body, redact_hex_bytes, redact_json_params};
