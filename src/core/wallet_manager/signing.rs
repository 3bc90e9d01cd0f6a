//! Message and transaction signing
//!
//! A password unlocks the keystore for this call only; without one the
//! cached secret is used. Derived keys are zeroized when the call returns.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::keys::{key_at, key_path};
use super::WalletManager;
use crate::blockchain::signer_for;
use crate::blockchain::traits::{message_bytes, KeySource, SignedTransaction};
use crate::core::derivation::address_from_private_key;
use crate::core::domain::{ChainParams, ChainType};
use crate::core::errors::WalletError;
use crate::core::wallet_info::WalletRecord;
use crate::security::secret::PrivateKeyBytes;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessage {
    pub signature: String,
    pub address: String,
}

/// Keys of one unlocked wallet, resolved on demand.
struct WalletKeys<'a> {
    record: &'a WalletRecord,
    secret: &'a [u8],
}

impl KeySource for WalletKeys<'_> {
    fn private_key(&self, relative: Option<&str>) -> Result<PrivateKeyBytes, WalletError> {
        let path = key_path(self.record, relative)?;
        key_at(self.record, self.secret, path.as_ref())
    }
}

impl WalletManager {
    /// Sign `message` with the key at `path` (the wallet's own key by default).
    ///
    /// `0x`-prefixed messages are signed as the bytes they encode.
    pub fn sign_message(
        &self,
        id: &Uuid,
        password: Option<&str>,
        message: &str,
        path: Option<&str>,
    ) -> Result<SignedMessage, WalletError> {
        let record = self.record(id)?;
        let secret = self.cache.resolve(&record, password)?;
        let keys = WalletKeys { record: &record, secret: &secret };

        let key_path = key_path(&record, path)?;
        let private_key = keys.private_key(path)?;
        let signer = signer_for(record.account.chain_type);
        let signature = signer.sign_message(private_key.as_ref(), &message_bytes(message))?;

        let address = if key_path == record.path()? {
            record.account.address.clone()
        } else {
            address_from_private_key(private_key.as_ref(), &record.chain_params())?.address
        };
        info!(id = %id, chain = %record.account.chain_type, "message signed");
        Ok(SignedMessage { signature, address })
    }

    /// Sign the chain-specific transaction in `tx`.
    ///
    /// `chain_type` selects the account: the wallet's own by default, or the
    /// first account derived for that chain. Network and address type come
    /// from that account. A `to` field must be a valid address on its network
    /// before the wallet is unlocked.
    pub fn sign_transaction(
        &self,
        id: &Uuid,
        password: Option<&str>,
        tx: &serde_json::Value,
        chain_type: Option<ChainType>,
    ) -> Result<SignedTransaction, WalletError> {
        let mut record = self.record(id)?;
        if let Some(requested) = chain_type.filter(|c| *c != record.account.chain_type) {
            let Some(account) = record.derived_account(requested) else {
                return Err(WalletError::ValidationError(format!(
                    "chain_mismatch: wallet is {}, request is {}",
                    record.account.chain_type, requested
                )));
            };
            record = record.with_account(account);
        }
        let params: ChainParams = record.chain_params();
        let signer = signer_for(params.chain_type);
        if let Some(to) = tx.get("to").and_then(serde_json::Value::as_str).filter(|to| !to.is_empty()) {
            if !signer.is_valid_address(to, params.network) {
                return Err(WalletError::ValidationError(format!("address_invalid: {}", to)));
            }
        }
        let secret = self.cache.resolve(&record, password)?;
        let keys = WalletKeys { record: &record, secret: &secret };

        let signed = signer.sign_transaction(tx, &keys, &params)?;
        info!(id = %id, chain = %params.chain_type, tx_hash = %signed.tx_hash, "transaction signed");
        Ok(signed)
    }
}
