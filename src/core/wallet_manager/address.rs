//! Address derivation from stored public data
//!
//! HD keystores keep the account-level xpub, so receiving addresses can be
//! computed without the password.

use tracing::debug;
use uuid::Uuid;

use super::WalletManager;
use crate::core::derivation::{address_from_public_key, public_key_from_xpub, DerivedAddress, PathDescriptor};
use crate::core::errors::WalletError;
use crate::core::wallet_info::{WalletDescriptor, WalletRecord};

impl WalletManager {
    /// Receiving address `external_idx` (`.../0/external_idx`) of an HD wallet.
    ///
    /// # Errors
    /// * `WalletError::ValidationError` - the wallet holds a single private key
    /// * `WalletError::NotFoundError` - unknown wallet id
    pub fn calc_external_address(&self, id: &Uuid, external_idx: u32) -> Result<DerivedAddress, WalletError> {
        let record = self.record(id)?;
        external_address(&record, external_idx)
    }

    /// Public descriptor of `record`. Bitcoin-family HD wallets also carry
    /// the receiving address following their own.
    pub(crate) fn describe(&self, record: &WalletRecord) -> Result<WalletDescriptor, WalletError> {
        let mut descriptor = record.descriptor();
        if record.is_hd() && record.account.chain_type.is_bitcoin_family() {
            if let Some(path) = record.path()? {
                descriptor.external_address = Some(external_address(record, path.index.saturating_add(1))?);
            }
        }
        Ok(descriptor)
    }
}

fn external_address(record: &WalletRecord, index: u32) -> Result<DerivedAddress, WalletError> {
    let (Some(path), Some(xpub)) = (record.path()?, record.account.ext_pub_key.as_deref()) else {
        return Err(WalletError::ValidationError("wallet_not_hd".to_string()));
    };
    let path: PathDescriptor = path.external(index);
    debug!(id = %record.id, path = %path, "computing external address");
    let public_key = public_key_from_xpub(xpub, path.change, path.index)?;
    address_from_public_key(&public_key, &record.chain_params(), Some(&path))
}
