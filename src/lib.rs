#![allow(clippy::missing_safety_doc)]
// src/lib.rs

//! Multi-chain wallet core behind a C ABI.
//!
//! Hosts talk to the `extern "C"` functions in [`api::ffi`] with JSON
//! strings. Everything below that layer is plain Rust and usable directly
//! through [`core::WalletManager`].

pub mod api;
pub mod blockchain;
pub mod core;
pub mod crypto;
pub mod security;
pub mod storage;

pub use crate::core::config::CoreConfig;
pub use crate::core::domain::{ChainParams, ChainType, Network, SegWit};
pub use crate::core::errors::{ErrorKind, WalletError};
pub use crate::core::wallet_manager::{WalletManager, WalletOptions};
