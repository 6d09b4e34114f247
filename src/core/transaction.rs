//! Bitcoin transaction handling
//!
//! Multisig inputs are signed in the legacy (pre-segwit) format. The wire
//! codec, txid and legacy signature hash come from `bitcoin`; this module
//! adds the error mapping signing sessions need and the
//! `decoderawtransaction` style JSON record they start from.

use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode;
use bitcoin::hashes::Hash;
use bitcoin::script::{Script, ScriptBuf};
use bitcoin::sighash::SighashCache;
use bitcoin::transaction::Version;
use bitcoin::{Amount, EcdsaSighashType, OutPoint, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::script::{script_from_asm, script_from_hex, MultisigScriptExt, ScriptError};

// =============================================================================
// Constants
// =============================================================================

/// Default transaction version
pub const TX_VERSION: i32 = 1;

/// Sequence number that disables locktime
pub const SEQUENCE_FINAL: u32 = 0xFFFFFFFF;

/// Satoshis per coin, used when reading decoded amounts
pub const COIN: u64 = 100_000_000;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Invalid hex: {0}")]
    InvalidHex(String),
    #[error("Failed to decode transaction: {0}")]
    Decode(String),
    #[error("Input {index} out of range ({count} inputs)")]
    InputOutOfRange { index: usize, count: usize },
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),
    #[error("Script error: {0}")]
    ScriptError(#[from] ScriptError),
}

// =============================================================================
// Codec and signature hash
// =============================================================================

/// Parse a consensus-serialized transaction from hex
pub fn transaction_from_hex(s: &str) -> Result<Transaction, TransactionError> {
    let bytes = hex::decode(s.trim()).map_err(|_| TransactionError::InvalidHex(s.to_string()))?;
    encode::deserialize(&bytes).map_err(|e| TransactionError::Decode(e.to_string()))
}

/// Consensus serialization as hex
pub fn transaction_to_hex(tx: &Transaction) -> String {
    encode::serialize_hex(tx)
}

/// Legacy signature hash of input `index` spending `script_code`
///
/// SINGLE without a matching output commits to the constant one, as
/// consensus does.
pub fn signature_hash(
    tx: &Transaction,
    index: usize,
    script_code: &Script,
    sighash_type: EcdsaSighashType,
) -> Result<[u8; 32], TransactionError> {
    if index >= tx.input.len() {
        return Err(TransactionError::InputOutOfRange {
            index,
            count: tx.input.len(),
        });
    }

    let hash = SighashCache::new(tx)
        .legacy_signature_hash(index, script_code, sighash_type.to_u32())
        .map_err(|_| TransactionError::InputOutOfRange {
            index,
            count: tx.input.len(),
        })?;
    Ok(hash.to_byte_array())
}

// =============================================================================
// Decoded Transaction Record
// =============================================================================

/// A `decoderawtransaction` style record, extended with multisig metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecodedTransaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    #[serde(default = "default_version")]
    pub version: i32,
    #[serde(default)]
    pub locktime: u32,
    pub vin: Vec<DecodedInput>,
    pub vout: Vec<DecodedOutput>,
}

/// One input of a [`DecodedTransaction`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecodedInput {
    pub txid: String,
    pub vout: u32,
    #[serde(rename = "scriptSig", default)]
    pub script_sig: DecodedScript,
    #[serde(default = "default_sequence")]
    pub sequence: u32,
    /// Hex redeem script of the multisig output being spent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeem_script: Option<String>,
    /// HD path of the spent address, ending in `/change/index`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hdpm_key_path: Option<String>,
}

/// One output of a [`DecodedTransaction`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecodedOutput {
    /// Amount in coins
    pub value: f64,
    #[serde(default)]
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pubkey: DecodedScript,
}

/// Script text as `decodescript` prints it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DecodedScript {
    #[serde(default)]
    pub asm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
}

fn default_version() -> i32 {
    TX_VERSION
}

fn default_sequence() -> u32 {
    SEQUENCE_FINAL
}

impl DecodedScript {
    /// Script bytes, preferring `hex` over `asm`
    pub fn to_script(&self) -> Result<ScriptBuf, ScriptError> {
        match self.hex.as_deref() {
            Some(hex) if !hex.is_empty() => script_from_hex(hex),
            _ => script_from_asm(&self.asm),
        }
    }

    pub fn from_script(script: &Script) -> Self {
        Self {
            asm: script.to_decoded_asm(),
            hex: Some(script.to_hex_string()),
        }
    }
}

impl DecodedTransaction {
    /// Build the transaction the record describes
    pub fn to_transaction(&self) -> Result<Transaction, TransactionError> {
        let input = self
            .vin
            .iter()
            .map(|input| {
                let txid = Txid::from_str(&input.txid)
                    .map_err(|_| TransactionError::InvalidHex(input.txid.clone()))?;
                Ok(TxIn {
                    previous_output: OutPoint::new(txid, input.vout),
                    script_sig: input.script_sig.to_script()?,
                    sequence: Sequence(input.sequence),
                    witness: Witness::default(),
                })
            })
            .collect::<Result<Vec<_>, TransactionError>>()?;

        let output = self
            .vout
            .iter()
            .map(|output| {
                Ok(TxOut {
                    value: Amount::from_sat(coins_to_sats(output.value)?),
                    script_pubkey: output.script_pubkey.to_script()?,
                })
            })
            .collect::<Result<Vec<_>, TransactionError>>()?;

        Ok(Transaction {
            version: Version(self.version),
            lock_time: LockTime::from_consensus(self.locktime),
            input,
            output,
        })
    }

    /// Describe `tx` as a record without multisig metadata
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self {
            txid: Some(tx.compute_txid().to_string()),
            version: tx.version.0,
            locktime: tx.lock_time.to_consensus_u32(),
            vin: tx
                .input
                .iter()
                .map(|input| DecodedInput {
                    txid: input.previous_output.txid.to_string(),
                    vout: input.previous_output.vout,
                    script_sig: DecodedScript::from_script(&input.script_sig),
                    sequence: input.sequence.0,
                    redeem_script: None,
                    hdpm_key_path: None,
                })
                .collect(),
            vout: tx
                .output
                .iter()
                .enumerate()
                .map(|(n, output)| DecodedOutput {
                    value: output.value.to_sat() as f64 / COIN as f64,
                    n: n as u32,
                    script_pubkey: DecodedScript::from_script(&output.script_pubkey),
                })
                .collect(),
        }
    }

    /// Copy script-sigs from a signed `tx` so the next cosigner can continue
    ///
    /// Multisig metadata on the inputs is kept.
    pub fn apply_script_sigs(&mut self, tx: &Transaction) -> Result<(), TransactionError> {
        if tx.input.len() != self.vin.len() {
            return Err(TransactionError::InvalidTransaction(format!(
                "expected {} inputs, got {}",
                self.vin.len(),
                tx.input.len()
            )));
        }

        for (decoded, input) in self.vin.iter_mut().zip(&tx.input) {
            decoded.script_sig = DecodedScript::from_script(&input.script_sig);
        }
        self.txid = Some(tx.compute_txid().to_string());
        Ok(())
    }
}

/// Convert a decoded coin amount to satoshis
pub fn coins_to_sats(value: f64) -> Result<u64, TransactionError> {
    let sats = (value * COIN as f64).round();
    if !sats.is_finite() || sats < 0.0 || sats > u64::MAX as f64 {
        return Err(TransactionError::InvalidAmount(value));
    }
    Ok(sats as u64)
}
