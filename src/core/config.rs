use crate::core::errors::WalletError;
use crate::crypto::kdf::KDFAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// PBKDF2 rounds used when `isDebug` is set. Test hosts create many wallets
/// and cannot afford the production scrypt cost on each one.
pub const DEBUG_PBKDF2_ITERATIONS: u32 = 1024;

/// Core configuration, passed as JSON to `init_token_core_x`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfig {
    /// Directory holding `<id>.json` keystore files
    pub file_dir: PathBuf,

    /// Lower KDF cost for test builds of the host
    #[serde(default)]
    pub is_debug: bool,

    /// KDF applied to newly encrypted secrets
    #[serde(default)]
    pub kdf: KDFAlgorithm,

    /// `tracing` filter directive; logging stays off when absent
    #[serde(default = "CoreConfig::default_log_level")]
    pub log_level: Option<String>,
}

impl CoreConfig {
    fn default_log_level() -> Option<String> { None }

    pub fn new(file_dir: impl Into<PathBuf>) -> Self {
        Self {
            file_dir: file_dir.into(),
            is_debug: false,
            kdf: KDFAlgorithm::default(),
            log_level: Self::default_log_level(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, WalletError> {
        let config: CoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        if self.file_dir.as_os_str().is_empty() {
            return Err(WalletError::ValidationError("file_dir_empty".to_string()));
        }
        self.kdf
            .validate()
            .map_err(|e| WalletError::ValidationError(format!("kdf_params_invalid: {}", e)))
    }

    /// The KDF actually used for new keystores.
    pub fn effective_kdf(&self) -> KDFAlgorithm {
        if self.is_debug {
            KDFAlgorithm::PBKDF2 { iterations: DEBUG_PBKDF2_ITERATIONS }
        } else {
            self.kdf
        }
    }

    pub fn with_kdf(mut self, kdf: KDFAlgorithm) -> Self {
        self.kdf = kdf;
        self
    }
}
