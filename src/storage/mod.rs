//! Storage module for wallet persistence

pub mod persistence;

pub use persistence::{
    AddressRecord, CosignerRecord, Storage, StorageConfig, StorageError, WalletFile,
};
