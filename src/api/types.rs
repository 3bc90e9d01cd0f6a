//! JSON request bodies accepted at the boundary.
//!
//! Field names are camelCase. Structs carrying a password, mnemonic or key
//! wipe those fields when dropped.

use serde::Deserialize;
use std::path::PathBuf;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::domain::{ChainParams, ChainType, Network, SegWit};
use crate::core::wallet_manager::WalletOptions;

/// Name, hint and overwrite flag shared by create and import requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub password_hint: Option<String>,
    #[serde(default)]
    pub overwrite: bool,
}

impl WalletMeta {
    pub fn options(&self) -> WalletOptions {
        WalletOptions {
            name: self.name.clone(),
            password_hint: self.password_hint.clone(),
            overwrite: self.overwrite,
        }
    }
}

/// Optional chain selection used by the `find_*` lookups.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainFilter {
    #[serde(default)]
    pub chain_type: Option<ChainType>,
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub seg_wit: SegWit,
    #[serde(default)]
    pub path: Option<String>,
}

impl ChainFilter {
    pub fn params(&self) -> Option<ChainParams> {
        self.chain_type.map(|chain_type| ChainParams {
            chain_type,
            network: self.network,
            seg_wit: self.seg_wit,
            path: self.path.clone(),
        })
    }
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletParam {
    pub password: String,
    #[serde(flatten)]
    #[zeroize(skip)]
    pub chain: ChainParams,
    #[serde(flatten)]
    #[zeroize(skip)]
    pub meta: WalletMeta,
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct ImportMnemonicParam {
    pub mnemonic: String,
    pub password: String,
    #[serde(flatten)]
    #[zeroize(skip)]
    pub chain: ChainParams,
    #[serde(flatten)]
    #[zeroize(skip)]
    pub meta: WalletMeta,
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct ImportPrivateKeyParam {
    pub private_key: String,
    pub password: String,
    #[serde(flatten)]
    #[zeroize(skip)]
    pub chain: ChainParams,
    #[serde(flatten)]
    #[zeroize(skip)]
    pub meta: WalletMeta,
}

/// `{id, password}`: export mnemonic, remove, verify and cache calls.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct WalletKeyParam {
    #[zeroize(skip)]
    pub id: Uuid,
    pub password: String,
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct ExportPrivateKeyParam {
    #[zeroize(skip)]
    pub id: Uuid,
    pub password: String,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordParam {
    #[zeroize(skip)]
    pub id: Uuid,
    pub old_password: String,
    pub new_password: String,
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct FindByMnemonicParam {
    pub mnemonic: String,
    #[serde(flatten)]
    #[zeroize(skip)]
    pub filter: ChainFilter,
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct FindByPrivateKeyParam {
    pub private_key: String,
    #[serde(flatten)]
    #[zeroize(skip)]
    pub filter: ChainFilter,
}

/// `derive_accounts`: one entry per account to add.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct DeriveAccountsParam {
    #[zeroize(skip)]
    pub id: Uuid,
    pub password: String,
    #[zeroize(skip)]
    pub derivations: Vec<ChainParams>,
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct SignMessageParam {
    #[zeroize(skip)]
    pub id: Uuid,
    #[serde(default)]
    pub password: Option<String>,
    #[zeroize(skip)]
    pub message: String,
    #[serde(default)]
    #[zeroize(skip)]
    pub path: Option<String>,
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct SignTxParam {
    #[zeroize(skip)]
    pub id: Uuid,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    #[zeroize(skip)]
    pub chain_type: Option<ChainType>,
    #[zeroize(skip)]
    pub tx: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAddressParam {
    pub id: Uuid,
    pub external_idx: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletIdParam {
    pub id: Uuid,
}

/// `clear_derived_key`: one wallet, or all of them when `id` is absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearDerivedKeyParam {
    #[serde(default)]
    pub id: Option<Uuid>,
}

/// `scan_wallets`: the configured directory, or `fileDir` when given.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanParam {
    #[serde(default)]
    pub file_dir: Option<PathBuf>,
}
