pub mod config;
pub mod derivation;
pub mod domain;
pub mod errors;
pub mod key_cache;
pub mod logging;
pub mod wallet_info;
pub mod wallet_manager;

// Re-export key structures
pub use errors::WalletError;
pub use wallet_info::{WalletDescriptor, WalletRecord};
pub use wallet_manager::WalletManager;
