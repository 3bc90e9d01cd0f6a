use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error kinds surfaced to the host through the last-error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ValidationError,
    AuthenticationError,
    NotFoundError,
    CryptoError,
    IoError,
    PartialScanError,
    InvalidHandle,
    InternalError,
}

/// Custom error type for wallet core operations.
///
/// The payload is a short machine-readable code (`password_incorrect`,
/// `wallet_not_found`, ...) or a diagnostic message. It never carries
/// secret material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    /// Malformed mnemonic, key, path or JSON.
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// Wrong password or failed verification.
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
    /// Wallet id or matching wallet absent.
    #[error("Not found: {0}")]
    NotFoundError(String),
    /// KDF, cipher or signing failure, corrupt ciphertext.
    #[error("Crypto error: {0}")]
    CryptoError(String),
    /// File read or keystore persistence failure.
    #[error("IO error: {0}")]
    IoError(String),
    /// Bulk scan finished but skipped one or more entries.
    #[error("Partial scan: {0}")]
    PartialScanError(String),
    /// Release of a pointer the arena does not own.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
    /// Unexpected internal state, including caught panics.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::ValidationError(_) => ErrorKind::ValidationError,
            WalletError::AuthenticationError(_) => ErrorKind::AuthenticationError,
            WalletError::NotFoundError(_) => ErrorKind::NotFoundError,
            WalletError::CryptoError(_) => ErrorKind::CryptoError,
            WalletError::IoError(_) => ErrorKind::IoError,
            WalletError::PartialScanError(_) => ErrorKind::PartialScanError,
            WalletError::InvalidHandle(_) => ErrorKind::InvalidHandle,
            WalletError::InternalError(_) => ErrorKind::InternalError,
        }
    }

    /// The bare message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            WalletError::ValidationError(m)
            | WalletError::AuthenticationError(m)
            | WalletError::NotFoundError(m)
            | WalletError::CryptoError(m)
            | WalletError::IoError(m)
            | WalletError::PartialScanError(m)
            | WalletError::InvalidHandle(m)
            | WalletError::InternalError(m) => m,
        }
    }

    pub fn wallet_not_found() -> Self {
        WalletError::NotFoundError("wallet_not_found".to_string())
    }

    pub fn password_incorrect() -> Self {
        WalletError::AuthenticationError("password_incorrect".to_string())
    }

    /// Whether the error comes from the caller's input rather than the core.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            WalletError::ValidationError(_)
                | WalletError::AuthenticationError(_)
                | WalletError::NotFoundError(_)
                | WalletError::InvalidHandle(_)
        )
    }
}

impl From<std::io::Error> for WalletError {
    fn from(err: std::io::Error) -> Self {
        WalletError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        WalletError::ValidationError(format!("invalid_json: {}", err))
    }
}

impl From<hex::FromHexError> for WalletError {
    fn from(err: hex::FromHexError) -> Self {
        WalletError::ValidationError(format!("invalid_hex: {}", err))
    }
}

impl From<bip39::Error> for WalletError {
    fn from(err: bip39::Error) -> Self {
        let code = match err {
            bip39::Error::BadWordCount(_) => "mnemonic_length_invalid",
            bip39::Error::UnknownWord(_) => "mnemonic_word_invalid",
            bip39::Error::InvalidChecksum => "mnemonic_checksum_invalid",
            _ => "mnemonic_invalid",
        };
        WalletError::ValidationError(code.to_string())
    }
}

impl From<bitcoin::bip32::Error> for WalletError {
    fn from(err: bitcoin::bip32::Error) -> Self {
        WalletError::CryptoError(format!("bip32: {}", err))
    }
}
