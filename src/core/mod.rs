//! Core Bitcoin components
//!
//! This module contains the script and transaction pieces multisig signing
//! is built on, layered over the `bitcoin` crate:
//! - Script system (multisig redeem scripts, P2SH, asm, script-sig merging)
//! - Transactions (hex codec, legacy signature hashes, decoded JSON records)

pub mod script;
pub mod transaction;

pub use script::{
    add_signature_to_multisig_script_sig, multisig_script, multisig_signatures,
    p2sh_multisig_script_sig, script_from_asm, script_from_hex, sighash_byte,
    sighash_from_asm_suffix, sort_multisig_signatures, MultisigScriptExt, ScriptError,
    MAX_PUBKEYS_PER_MULTISIG, MAX_SCRIPT_ELEMENT_SIZE,
};
pub use transaction::{
    coins_to_sats, signature_hash, transaction_from_hex, transaction_to_hex, DecodedInput,
    DecodedOutput, DecodedScript, DecodedTransaction, TransactionError, COIN, SEQUENCE_FINAL,
    TX_VERSION,
};
