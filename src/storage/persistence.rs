//! Wallet persistence layer
//!
//! Saves and loads the wallet file a seeded group is recorded in, keeping a
//! rotating set of backups.

use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::multisig::{Change, CosignerIndex};

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub wallet_file: String,
    pub backup_enabled: bool,
    pub max_backups: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".multisig_data"),
            wallet_file: "wallet.json".to_string(),
            backup_enabled: true,
            max_backups: 5,
        }
    }
}

// =============================================================================
// Wallet file
// =============================================================================

/// One cosigner's master keys
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CosignerRecord {
    pub index: CosignerIndex,
    /// Extended public key at `m/45`
    pub public: String,
    /// Extended private key at `m/45`, when this wallet holds it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<String>,
}

/// One derived group address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddressRecord {
    pub change: Change,
    pub index: u32,
    pub address: String,
    pub redeem_script: String,
}

/// Everything recorded about a seeded group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletFile {
    pub network: String,
    pub required_signs: usize,
    pub created_at: DateTime<Utc>,
    /// Serialized group of the cosigners' public masters
    pub bip45: String,
    pub cosigners: Vec<CosignerRecord>,
    #[serde(default)]
    pub addresses: Vec<AddressRecord>,
}

impl WalletFile {
    pub fn new(network: &str, required_signs: usize, bip45: String) -> Self {
        Self {
            network: network.to_string(),
            required_signs,
            created_at: Utc::now(),
            bip45,
            cosigners: Vec::new(),
            addresses: Vec::new(),
        }
    }

    pub fn holds_private_keys(&self) -> bool {
        self.cosigners.iter().any(|c| c.private.is_some())
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Wallet storage manager
pub struct Storage {
    config: StorageConfig,
}

impl Storage {
    /// Create a new storage manager
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self { config })
    }

    /// Create with default configuration
    pub fn with_defaults() -> Result<Self, StorageError> {
        Self::new(StorageConfig::default())
    }

    /// Path of the wallet file
    pub fn wallet_path(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.wallet_file)
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{}.backup.{}", self.config.wallet_file, index))
    }

    /// Save the wallet to disk
    pub fn save(&self, wallet: &WalletFile) -> Result<(), StorageError> {
        let path = self.wallet_path();

        if self.config.backup_enabled && self.config.max_backups > 0 && path.exists() {
            self.rotate_backups()?;
            fs::copy(&path, self.backup_path(0))?;
        }

        // Write to temporary file first
        let temp_path = self.config.data_dir.join("wallet.tmp");
        let file = fs::File::create(&temp_path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, wallet)?;

        fs::rename(&temp_path, &path)?;

        if wallet.holds_private_keys() {
            log::warn!("{} contains private keys", path.display());
        }
        log::info!("Saved wallet to {}", path.display());
        Ok(())
    }

    /// Load the wallet from disk
    pub fn load(&self) -> Result<WalletFile, StorageError> {
        let path = self.wallet_path();

        if !path.exists() {
            return Err(StorageError::InvalidData(
                "Wallet file not found".to_string(),
            ));
        }

        read_wallet(&path)
    }

    /// Check if a saved wallet exists
    pub fn exists(&self) -> bool {
        self.wallet_path().exists()
    }

    /// Delete the saved wallet
    pub fn delete(&self) -> Result<(), StorageError> {
        let path = self.wallet_path();
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn rotate_backups(&self) -> Result<(), StorageError> {
        let oldest = self.backup_path(self.config.max_backups - 1);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }

        for i in (0..self.config.max_backups - 1).rev() {
            let current = self.backup_path(i);
            if current.exists() {
                fs::rename(&current, self.backup_path(i + 1))?;
            }
        }

        Ok(())
    }

    /// Restore from a backup
    pub fn restore_backup(&self, backup_index: usize) -> Result<WalletFile, StorageError> {
        let backup_path = self.backup_path(backup_index);

        if !backup_path.exists() {
            return Err(StorageError::InvalidData(format!(
                "Backup {} not found",
                backup_index
            )));
        }

        read_wallet(&backup_path)
    }

    /// List available backups
    pub fn list_backups(&self) -> Vec<usize> {
        (0..self.config.max_backups)
            .filter(|i| self.backup_path(*i).exists())
            .collect()
    }
}

fn read_wallet(path: &Path) -> Result<WalletFile, StorageError> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(required_signs: usize) -> WalletFile {
        let mut wallet = WalletFile::new("thebestcoin_testnet", required_signs, "blob".to_string());
        wallet.cosigners.push(CosignerRecord {
            index: CosignerIndex::new(0).unwrap(),
            public: "EQQ8FQ".to_string(),
            private: None,
        });
        wallet.addresses.push(AddressRecord {
            change: Change::Receive,
            index: 0,
            address: "cPgjwc8B2s8aLmgU4hTbuHppZwW4A6AVet".to_string(),
            redeem_script: "52ae".to_string(),
        });
        wallet
    }

    fn storage(dir: &tempfile::TempDir, max_backups: usize) -> Storage {
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            max_backups,
            ..Default::default()
        };
        Storage::new(config).unwrap()
    }

    #[test]
    fn test_save_load_wallet() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage(&temp_dir, 5);
        let wallet = wallet(2);

        storage.save(&wallet).unwrap();
        assert!(storage.exists());
        assert_eq!(storage.load().unwrap(), wallet);

        let raw = fs::read_to_string(storage.wallet_path()).unwrap();
        assert!(raw.contains("\"change\": \"receive\""));
        assert!(!raw.contains("\"private\""));
    }

    #[test]
    fn test_missing_wallet() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage(&temp_dir, 5);
        assert!(matches!(storage.load(), Err(StorageError::InvalidData(_))));
    }

    #[test]
    fn test_backup_rotation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage(&temp_dir, 3);

        for m in 1..=5 {
            storage.save(&wallet(m)).unwrap();
        }

        assert_eq!(storage.list_backups(), vec![0, 1, 2]);
        assert_eq!(storage.restore_backup(0).unwrap().required_signs, 4);
        assert_eq!(storage.restore_backup(2).unwrap().required_signs, 2);
        assert_eq!(storage.load().unwrap().required_signs, 5);
    }

    #[test]
    fn test_backups_disabled() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage(&temp_dir, 0);
        storage.save(&wallet(1)).unwrap();
        storage.save(&wallet(2)).unwrap();
        assert!(storage.list_backups().is_empty());

        storage.delete().unwrap();
        assert!(!storage.exists());
    }
}
