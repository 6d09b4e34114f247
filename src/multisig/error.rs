//! Error taxonomy for multisig coordination
//!
//! Lower layers keep their own error enums. Everything that crosses into the
//! multisig API is translated here so callers match on one set of variants.

use thiserror::Error;

use crate::core::{ScriptError, TransactionError};
use crate::crypto::{Base58Error, Bip32Error, KeyError};
use crate::network::NetworkError;

/// Errors related to multisig operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultisigError {
    #[error("Invalid cosigner index: {0}")]
    InvalidCosignerIndex(String),
    #[error("Import error: {0}")]
    ImportError(String),
    #[error("Invalid checksum in key")]
    ChecksumError,
    #[error("Key format not found: {0}")]
    KeyFormatNotFound(String),
    #[error("{0} is not a valid network!")]
    NetworkNotFound(String),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Invalid script: {0}")]
    InvalidScript(String),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("No inputs staged for signing")]
    NoStagedInputs,
    #[error("{staged} inputs staged but the transaction has {available}")]
    TooManyStagedInputs { staged: usize, available: usize },
    #[error("Input {0} not found in transaction")]
    InputNotFound(usize),
    #[error("Signing session already signed")]
    SessionAlreadySigned,
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

impl From<Base58Error> for MultisigError {
    fn from(err: Base58Error) -> Self {
        match err {
            Base58Error::InvalidChecksum => MultisigError::ChecksumError,
            other => MultisigError::ImportError(other.to_string()),
        }
    }
}

impl From<Bip32Error> for MultisigError {
    fn from(err: Bip32Error) -> Self {
        match err {
            Bip32Error::Base58(inner) => inner.into(),
            Bip32Error::InvalidPath(path) => {
                MultisigError::InvalidParams(format!("Invalid derivation path: {}", path))
            }
            other => MultisigError::ImportError(other.to_string()),
        }
    }
}

impl From<KeyError> for MultisigError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::Base58Error(inner) => inner.into(),
            other => MultisigError::ImportError(other.to_string()),
        }
    }
}

impl From<NetworkError> for MultisigError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::NotFound(name) => MultisigError::NetworkNotFound(name),
            other => MultisigError::InvalidParams(other.to_string()),
        }
    }
}

impl From<ScriptError> for MultisigError {
    fn from(err: ScriptError) -> Self {
        MultisigError::InvalidScript(err.to_string())
    }
}

impl From<TransactionError> for MultisigError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::InputOutOfRange { index, .. } => MultisigError::InputNotFound(index),
            TransactionError::ScriptError(inner) => inner.into(),
            other => MultisigError::InvalidTransaction(other.to_string()),
        }
    }
}
