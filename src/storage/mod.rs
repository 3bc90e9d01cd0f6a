//! Keystore file persistence: one `<id>.json` per wallet in a directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::errors::WalletError;
use crate::core::wallet_info::WalletRecord;
use crate::security::redaction::redact_body;

/// A keystore file that could not be loaded during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanFailure {
    pub path: String,
    pub reason: String,
}

/// Records loaded by a scan plus the per-file failures.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub records: Vec<WalletRecord>,
    pub failures: Vec<ScanFailure>,
}

#[derive(Debug, Clone)]
pub struct KeystoreDir {
    dir: PathBuf,
}

impl KeystoreDir {
    /// Open `dir`, creating it when missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, WalletError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| WalletError::IoError(format!("keystore dir {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Write `record`, replacing any previous file atomically.
    pub fn flush(&self, record: &WalletRecord) -> Result<(), WalletError> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| WalletError::InternalError(format!("keystore encode: {}", e)))?;
        let path = self.path_of(&record.id);
        let tmp = self.dir.join(format!(".{}.json.tmp", record.id));
        fs::write(&tmp, json).map_err(|e| WalletError::IoError(format!("{}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &path).map_err(|e| WalletError::IoError(format!("{}: {}", path.display(), e)))?;
        debug!(id = %record.id, "keystore flushed");
        Ok(())
    }

    /// Remove the keystore file of `id`. A missing file is not an error.
    pub fn delete(&self, id: &Uuid) -> Result<(), WalletError> {
        match fs::remove_file(self.path_of(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WalletError::IoError(format!("delete {}: {}", id, e))),
        }
    }

    /// Load and validate a single keystore file.
    pub fn load(path: &Path) -> Result<WalletRecord, WalletError> {
        let content = fs::read_to_string(path)?;
        let record: WalletRecord = serde_json::from_str(&content)?;
        record.validate()?;
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if stem != record.id.to_string() {
            return Err(WalletError::ValidationError("file_name_id_mismatch".to_string()));
        }
        Ok(record)
    }

    /// Load every `*.json` file independently. A bad file is recorded and
    /// skipped; only an unreadable directory fails the scan.
    pub fn scan(&self) -> Result<ScanOutcome, WalletError> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| WalletError::IoError(format!("scan {}: {}", self.dir.display(), e)))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().map_or(false, |ext| ext == "json"))
            .collect();
        paths.sort();

        let mut outcome = ScanOutcome::default();
        for path in paths {
            match Self::load(&path) {
                Ok(record) => outcome.records.push(record),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping keystore file");
                    outcome.failures.push(ScanFailure { path: path.display().to_string(), reason: err.to_string() });
                }
            }
        }
        info!(
            dir = %self.dir.display(),
            loaded = outcome.records.len(),
            failed = outcome.failures.len(),
            "keystore scan finished"
        );
        Ok(outcome)
    }
}

/// Read a whole file as UTF-8.
pub fn read_file(path: &str) -> Result<String, WalletError> {
    if path.is_empty() {
        return Err(WalletError::ValidationError("path_empty".to_string()));
    }
    let contents = fs::read_to_string(path).map_err(|e| WalletError::IoError(format!("{}: {}", path, e)))?;
    debug!(path, contents = %redact_body(&contents), "file read");
    Ok(contents)
}
