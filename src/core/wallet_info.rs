use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::derivation::{DerivedAddress, PathDescriptor};
use crate::core::domain::{ChainParams, ChainType, Network, SegWit};
use crate::core::errors::WalletError;
use crate::crypto::keystore_crypto::EncryptedSecret;

/// Keystore record holding an encrypted BIP39 mnemonic.
pub const HD_VERSION: u32 = 11000;
/// Keystore record holding an encrypted raw private key.
pub const PRIVATE_KEY_VERSION: u32 = 11001;

/// How the secret entered the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    /// Generated by `create_wallet`
    NewMnemonic,
    Mnemonic,
    PrivateKey,
    Wif,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub source: Source,
}

/// The chain account a keystore is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub chain_type: ChainType,
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub seg_wit: SegWit,
    pub address: String,
    /// Path of `address`; HD wallets only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Account-level xpub; HD wallets only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_pub_key: Option<String>,
}

/// One wallet as persisted in `<fileDir>/<id>.json`.
///
/// Only `crypto` depends on the password; everything else is public data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    pub id: Uuid,
    pub version: u32,
    /// Fingerprint of the secret, see `crypto::hash::key_hash`
    pub key_hash: String,
    pub crypto: EncryptedSecret,
    pub account: Account,
    /// Further chain accounts derived from the same seed; HD wallets only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_accounts: Vec<Account>,
    pub meta: Metadata,
}

impl WalletRecord {
    pub fn is_hd(&self) -> bool {
        self.version == HD_VERSION
    }

    /// AEAD associated data binding the ciphertext to this wallet id.
    pub fn aad_for(id: &Uuid) -> Vec<u8> {
        let mut out = b"IRONKEY-AAD-V1".to_vec();
        out.extend_from_slice(id.as_bytes());
        out
    }

    pub fn aad(&self) -> Vec<u8> {
        Self::aad_for(&self.id)
    }

    /// The primary account followed by every derived one.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        std::iter::once(&self.account).chain(self.derived_accounts.iter())
    }

    /// The derived account on `chain`, if one was added.
    pub fn derived_account(&self, chain: ChainType) -> Option<&Account> {
        self.derived_accounts.iter().find(|a| a.chain_type == chain)
    }

    /// This record viewed through another of its accounts. Paths, network
    /// and address type then all come from `account`.
    pub fn with_account(&self, account: &Account) -> WalletRecord {
        WalletRecord { account: account.clone(), derived_accounts: Vec::new(), ..self.clone() }
    }

    pub fn chain_params(&self) -> ChainParams {
        ChainParams {
            chain_type: self.account.chain_type,
            network: self.account.network,
            seg_wit: self.account.seg_wit,
            path: self.account.path.clone(),
        }
    }

    /// Path of the wallet's own address. Private-key wallets have none.
    pub fn path(&self) -> Result<Option<PathDescriptor>, WalletError> {
        match &self.account.path {
            Some(p) if self.is_hd() => Ok(Some(PathDescriptor::parse(self.account.chain_type, p)?)),
            _ => Ok(None),
        }
    }

    /// Structural checks run on every record loaded from disk.
    pub fn validate(&self) -> Result<(), WalletError> {
        match self.version {
            HD_VERSION => {
                if self.account.path.is_none() {
                    return Err(WalletError::ValidationError("hd_record_without_path".to_string()));
                }
                self.path()?;
            }
            PRIVATE_KEY_VERSION => {}
            other => {
                return Err(WalletError::ValidationError(format!("unsupported_version: {}", other)));
            }
        }
        if self.key_hash.len() != 40 || !self.key_hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WalletError::ValidationError("key_hash_invalid".to_string()));
        }
        self.crypto
            .kdfparams
            .validate()
            .map_err(|e| WalletError::CryptoError(format!("kdf_params_invalid: {}", e)))?;
        self.chain_params().validate()?;

        if !self.derived_accounts.is_empty() && !self.is_hd() {
            return Err(WalletError::ValidationError("derived_accounts_need_hd_record".to_string()));
        }
        for account in &self.derived_accounts {
            let view = self.with_account(account);
            if view.account.path.is_none() {
                return Err(WalletError::ValidationError("hd_record_without_path".to_string()));
            }
            view.path()?;
            view.chain_params().validate()?;
        }
        Ok(())
    }

    pub fn descriptor(&self) -> WalletDescriptor {
        WalletDescriptor {
            id: self.id,
            name: self.meta.name.clone(),
            chain_type: self.account.chain_type,
            network: self.account.network,
            seg_wit: self.account.seg_wit,
            address: self.account.address.clone(),
            path: self.account.path.clone(),
            source: self.meta.source,
            password_hint: self.meta.password_hint.clone(),
            created_at: self.meta.created_at,
            external_address: None,
        }
    }
}

/// Public view of a wallet returned to the host. Carries no secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletDescriptor {
    pub id: Uuid,
    pub name: String,
    pub chain_type: ChainType,
    pub network: Network,
    pub seg_wit: SegWit,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_hint: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Next receiving address, Bitcoin-family HD wallets only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_address: Option<DerivedAddress>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::KDFAlgorithm;

    fn sample(version: u32, path: Option<&str>) -> WalletRecord {
        let id = Uuid::new_v4();
        WalletRecord {
            id,
            version,
            key_hash: "ab".repeat(20),
            crypto: EncryptedSecret::encrypt(
                "pw",
                b"secret",
                KDFAlgorithm::PBKDF2 { iterations: 8 },
                &WalletRecord::aad_for(&id),
            )
            .unwrap(),
            account: Account {
                chain_type: ChainType::Bitcoin,
                network: Network::Mainnet,
                seg_wit: SegWit::None,
                address: "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA".to_string(),
                path: path.map(str::to_string),
                ext_pub_key: None,
            },
            derived_accounts: Vec::new(),
            meta: Metadata {
                name: "test".to_string(),
                password_hint: None,
                created_at: Utc::now(),
                source: Source::Mnemonic,
            },
        }
    }

    #[test]
    fn test_record_json_roundtrip() {
        let record = sample(HD_VERSION, Some("m/44'/0'/0'/0/0"));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"keyHash\""));
        assert!(json.contains("\"chainType\":\"BITCOIN\""));
        let back: WalletRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert!(back.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_version() {
        let record = sample(9999, None);
        assert!(matches!(record.validate(), Err(WalletError::ValidationError(_))));
    }

    #[test]
    fn test_validate_hd_requires_path() {
        assert!(sample(HD_VERSION, None).validate().is_err());
        assert!(sample(PRIVATE_KEY_VERSION, None).validate().is_ok());
    }

    #[test]
    fn test_derived_accounts_are_validated() {
        let mut record = sample(HD_VERSION, Some("m/44'/0'/0'/0/0"));
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("derivedAccounts"));

        record.derived_accounts.push(Account {
            chain_type: ChainType::Ethereum,
            network: Network::Mainnet,
            seg_wit: SegWit::None,
            address: "0x9858EfFD232B4033E47d90003D41EC34EcaEda94".to_string(),
            path: Some("m/44'/60'/0'/0/0".to_string()),
            ext_pub_key: None,
        });
        assert!(record.validate().is_ok());
        assert_eq!(record.accounts().count(), 2);
        assert_eq!(record.with_account(&record.derived_accounts[0]).path().unwrap().unwrap().coin_type, 60);

        record.derived_accounts[0].seg_wit = SegWit::Segwit;
        assert!(record.validate().is_err());
        record.derived_accounts[0].seg_wit = SegWit::None;
        record.derived_accounts[0].path = None;
        assert!(record.validate().is_err());

        let mut single = sample(PRIVATE_KEY_VERSION, None);
        single.derived_accounts = record.derived_accounts.clone();
        assert!(single.validate().is_err());
    }

    #[test]
    fn test_descriptor_has_no_crypto() {
        let record = sample(PRIVATE_KEY_VERSION, None);
        let json = serde_json::to_string(&record.descriptor()).unwrap();
        assert!(!json.contains("ciphertext"));
        assert!(!json.contains("keyHash"));
    }
}
