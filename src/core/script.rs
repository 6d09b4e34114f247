//! Bitcoin script handling for P2SH multisig
//!
//! Builds and parses the scripts a multisig wallet needs on top of
//! `bitcoin::ScriptBuf`: the M-of-N redeem script, its P2SH address under a
//! configurable network, and the `OP_0 <sig>... <redeem>` script-sig that
//! spends it. Script-sigs from other cosigners are merged and re-ordered here
//! so signatures line up with the redeem script's keys.

use std::collections::BTreeMap;

use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::{OP_CHECKMULTISIG, OP_CLTV, OP_CSV, OP_PUSHNUM_1, OP_PUSHNUM_NEG1};
use bitcoin::opcodes::{self, Class, ClassifyContext, Opcode};
use bitcoin::script::{self, Builder, Instruction, PushBytes, Script, ScriptBuf};
use bitcoin::EcdsaSighashType;
use secp256k1::PublicKey;
use thiserror::Error;

use crate::crypto::{encode_check, verify_signature};
use crate::network::Network;

/// Most public keys a CHECKMULTISIG accepts
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Largest single push allowed by consensus
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

// =============================================================================
// Script Errors
// =============================================================================

/// Script-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Malformed script: {0}")]
    Malformed(String),
    #[error("Push of {0} bytes exceeds the element size limit")]
    PushTooLarge(usize),
    #[error("Not a multisig script")]
    NotMultisig,
    #[error("Invalid multisig parameters: {0}-of-{1}")]
    InvalidMultisig(usize, usize),
    #[error("Invalid public key in script")]
    InvalidPublicKey,
    #[error("Invalid hex: {0}")]
    InvalidHex(String),
    #[error("Unknown asm token: {0}")]
    UnknownToken(String),
    #[error("Script-sig contains non-push opcode {0:#04x}")]
    NotPushOnly(u8),
    #[error("Script-sig spends a different redeem script")]
    RedeemScriptMismatch,
    #[error("Signature does not match any key in the redeem script")]
    UnknownSigner,
}

impl From<script::Error> for ScriptError {
    fn from(err: script::Error) -> Self {
        ScriptError::Malformed(err.to_string())
    }
}

// =============================================================================
// Multisig scripts
// =============================================================================

/// Multisig and P2SH views of a script
pub trait MultisigScriptExt {
    /// Threshold and keys of a CHECKMULTISIG script
    fn parse_multisig(&self) -> Result<(usize, Vec<PublicKey>), ScriptError>;

    /// P2SH address of this script on `network`
    fn to_p2sh_address(&self, network: &Network) -> String;

    /// Human-readable asm in `decodescript` style
    fn to_decoded_asm(&self) -> String;
}

impl MultisigScriptExt for Script {
    fn parse_multisig(&self) -> Result<(usize, Vec<PublicKey>), ScriptError> {
        let instructions = self.instructions().collect::<Result<Vec<_>, _>>()?;
        let (last, rest) = instructions.split_last().ok_or(ScriptError::NotMultisig)?;
        if *last != Instruction::Op(OP_CHECKMULTISIG) || rest.len() < 3 {
            return Err(ScriptError::NotMultisig);
        }

        let required = rest[0].script_num().ok_or(ScriptError::NotMultisig)?;
        let total = rest[rest.len() - 1]
            .script_num()
            .ok_or(ScriptError::NotMultisig)?;

        let keys = rest[1..rest.len() - 1]
            .iter()
            .map(|instruction| match instruction {
                Instruction::PushBytes(data) => PublicKey::from_slice(data.as_bytes())
                    .map_err(|_| ScriptError::InvalidPublicKey),
                Instruction::Op(_) => Err(ScriptError::NotMultisig),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if total < 0 || required < 1 || total as usize != keys.len() || required > total {
            return Err(ScriptError::InvalidMultisig(
                required.max(0) as usize,
                keys.len(),
            ));
        }

        Ok((required as usize, keys))
    }

    fn to_p2sh_address(&self, network: &Network) -> String {
        let mut payload = vec![network.p2sh_version];
        payload.extend_from_slice(&self.script_hash().to_byte_array());
        encode_check(&payload)
    }

    fn to_decoded_asm(&self) -> String {
        let mut tokens = Vec::new();
        for instruction in self.instructions() {
            let token = match instruction {
                Ok(Instruction::PushBytes(data)) if data.len() <= 4 => {
                    match script::read_scriptint_non_minimal(data.as_bytes()) {
                        Ok(n) => n.to_string(),
                        Err(_) => hex::encode(data.as_bytes()),
                    }
                }
                Ok(Instruction::PushBytes(data)) => hex::encode(data.as_bytes()),
                Ok(Instruction::Op(op)) => opcode_asm(op),
                Err(_) => {
                    tokens.push("[error]".to_string());
                    break;
                }
            };
            tokens.push(token);
        }
        tokens.join(" ")
    }
}

/// Standard M-of-N CHECKMULTISIG script over `keys` in the given order
pub fn multisig_script(required: usize, keys: &[PublicKey]) -> Result<ScriptBuf, ScriptError> {
    if required == 0 || required > keys.len() || keys.len() > MAX_PUBKEYS_PER_MULTISIG {
        return Err(ScriptError::InvalidMultisig(required, keys.len()));
    }

    let mut builder = Builder::new().push_int(required as i64);
    for key in keys {
        builder = builder.push_key(&bitcoin::PublicKey::new(*key));
    }
    Ok(builder
        .push_int(keys.len() as i64)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script())
}

/// Script from hex, surrounding whitespace ignored
pub fn script_from_hex(s: &str) -> Result<ScriptBuf, ScriptError> {
    ScriptBuf::from_hex(s.trim()).map_err(|_| ScriptError::InvalidHex(s.to_string()))
}

/// Parse `decodescript` style asm
///
/// Accepts opcode names, decimal numbers (as `bitcoind` prints small
/// pushes) and hex pushes, optionally suffixed with a sighash type such
/// as `[ALL]`.
pub fn script_from_asm(asm: &str) -> Result<ScriptBuf, ScriptError> {
    let mut builder = Builder::new();

    for token in asm.split_whitespace() {
        if let Some(op) = opcode_from_name(token) {
            builder = builder.push_opcode(op);
            continue;
        }

        if token.len() <= 10 {
            if let Ok(n) = token.parse::<i64>() {
                builder = builder.push_int(n);
                continue;
            }
        }

        let (data, sighash) = match token.split_once('[') {
            Some((data, suffix)) => {
                let name = suffix
                    .strip_suffix(']')
                    .ok_or_else(|| ScriptError::UnknownToken(token.to_string()))?;
                let sighash = sighash_from_asm_suffix(name)
                    .ok_or_else(|| ScriptError::UnknownToken(token.to_string()))?;
                (data, Some(sighash))
            }
            None => (token, None),
        };

        let mut bytes =
            hex::decode(data).map_err(|_| ScriptError::UnknownToken(token.to_string()))?;
        if let Some(sighash) = sighash {
            bytes.push(sighash_byte(sighash));
        }
        if bytes.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(ScriptError::PushTooLarge(bytes.len()));
        }
        builder = builder.push_slice(push_bytes(&bytes)?);
    }

    Ok(builder.into_script())
}

/// The byte appended to a DER signature
pub fn sighash_byte(sighash_type: EcdsaSighashType) -> u8 {
    sighash_type.to_u32() as u8
}

/// Parse the `[ALL]` style suffix `decodescript` appends to signatures
pub fn sighash_from_asm_suffix(name: &str) -> Option<EcdsaSighashType> {
    match name {
        "ALL" => Some(EcdsaSighashType::All),
        "NONE" => Some(EcdsaSighashType::None),
        "SINGLE" => Some(EcdsaSighashType::Single),
        "ALL|ANYONECANPAY" => Some(EcdsaSighashType::AllPlusAnyoneCanPay),
        "NONE|ANYONECANPAY" => Some(EcdsaSighashType::NonePlusAnyoneCanPay),
        "SINGLE|ANYONECANPAY" => Some(EcdsaSighashType::SinglePlusAnyoneCanPay),
        _ => None,
    }
}

fn push_bytes(data: &[u8]) -> Result<&PushBytes, ScriptError> {
    <&PushBytes>::try_from(data).map_err(|_| ScriptError::PushTooLarge(data.len()))
}

fn opcode_asm(op: Opcode) -> String {
    match op.classify(ClassifyContext::Legacy) {
        Class::PushNum(n) => n.to_string(),
        _ if op == OP_CLTV => "OP_CHECKLOCKTIMEVERIFY".to_string(),
        _ if op == OP_CSV => "OP_CHECKSEQUENCEVERIFY".to_string(),
        _ => op.to_string(),
    }
}

fn opcode_from_name(name: &str) -> Option<Opcode> {
    match name {
        "OP_0" | "OP_FALSE" => return Some(opcodes::OP_0),
        "OP_1NEGATE" => return Some(OP_PUSHNUM_NEG1),
        "OP_TRUE" => return Some(OP_PUSHNUM_1),
        "OP_CHECKLOCKTIMEVERIFY" | "OP_NOP2" => return Some(OP_CLTV),
        "OP_CHECKSEQUENCEVERIFY" | "OP_NOP3" => return Some(OP_CSV),
        _ => {}
    }
    if let Some(n) = name.strip_prefix("OP_").and_then(|n| n.parse::<u8>().ok()) {
        if (1..=16).contains(&n) {
            return Some(Opcode::from(OP_PUSHNUM_1.to_u8() + n - 1));
        }
    }
    // raw push opcodes below OP_PUSHNUM_NEG1 need data and have no asm name
    (OP_PUSHNUM_NEG1.to_u8()..=u8::MAX)
        .map(Opcode::from)
        .find(|op| op.to_string() == name)
}

// =============================================================================
// P2SH multisig script-sigs
// =============================================================================

/// Signatures already present in a P2SH multisig script-sig
///
/// Accepts an empty script, `OP_0 <sig>... <redeem>`, placeholder forms
/// with `OP_0` in place of missing signatures, and bare signature lists.
/// A trailing redeem script must match `redeem_script`.
pub fn multisig_signatures(
    script_sig: &Script,
    redeem_script: &Script,
) -> Result<Vec<Vec<u8>>, ScriptError> {
    let mut pushes = Vec::new();
    for instruction in script_sig.instructions() {
        match instruction? {
            Instruction::PushBytes(data) => pushes.push(data.as_bytes()),
            Instruction::Op(op) => return Err(ScriptError::NotPushOnly(op.to_u8())),
        }
    }

    if let Some(last) = pushes.last() {
        if *last == redeem_script.as_bytes() {
            pushes.pop();
        } else if Script::from_bytes(last).parse_multisig().is_ok() {
            return Err(ScriptError::RedeemScriptMismatch);
        }
    }

    Ok(pushes
        .into_iter()
        .filter(|data| !data.is_empty())
        .map(<[u8]>::to_vec)
        .collect())
}

/// `OP_0 <sig>... <redeem>`
pub fn p2sh_multisig_script_sig(
    signatures: &[Vec<u8>],
    redeem_script: &Script,
) -> Result<ScriptBuf, ScriptError> {
    let mut builder = Builder::new().push_opcode(opcodes::OP_0);
    for signature in signatures {
        builder = builder.push_slice(push_bytes(signature)?);
    }
    Ok(builder
        .push_slice(push_bytes(redeem_script.as_bytes())?)
        .into_script())
}

/// Order signatures by the position of the key that produced them
///
/// Each signature (DER plus sighash byte) is matched to a redeem-script key by
/// verifying it against `sighash`. Signatures no key verifies are dropped.
/// A later signature from the same key replaces an earlier one, and at most
/// `required` signatures are kept.
pub fn sort_multisig_signatures(
    signatures: &[Vec<u8>],
    redeem_script: &Script,
    sighash: &[u8; 32],
) -> Result<Vec<Vec<u8>>, ScriptError> {
    let (required, keys) = redeem_script.parse_multisig()?;

    let mut by_key: BTreeMap<usize, Vec<u8>> = BTreeMap::new();
    for signature in signatures {
        match signer_position(signature, &keys, sighash) {
            Some(position) => {
                by_key.insert(position, signature.clone());
            }
            None => log::warn!("Dropping signature that matches no redeem script key"),
        }
    }

    if by_key.len() > required {
        log::warn!(
            "Keeping {} of {} signatures for a {}-of-{} script",
            required,
            by_key.len(),
            required,
            keys.len()
        );
    }

    Ok(by_key.into_values().take(required).collect())
}

/// Add `signature` to a multisig script-sig and re-sort by redeem-script key order
pub fn add_signature_to_multisig_script_sig(
    signature: &[u8],
    script_sig: &Script,
    redeem_script: &Script,
    sighash: &[u8; 32],
) -> Result<ScriptBuf, ScriptError> {
    let (_, keys) = redeem_script.parse_multisig()?;
    if signer_position(signature, &keys, sighash).is_none() {
        return Err(ScriptError::UnknownSigner);
    }

    let mut signatures = multisig_signatures(script_sig, redeem_script)?;
    signatures.push(signature.to_vec());

    let sorted = sort_multisig_signatures(&signatures, redeem_script, sighash)?;
    p2sh_multisig_script_sig(&sorted, redeem_script)
}

fn signer_position(signature: &[u8], keys: &[PublicKey], sighash: &[u8; 32]) -> Option<usize> {
    // last byte is the sighash type
    let (_, der) = signature.split_last()?;
    keys.iter()
        .position(|key| verify_signature(key, sighash, der).unwrap_or(false))
}
