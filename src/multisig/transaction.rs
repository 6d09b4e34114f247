//! Multisig transaction signing sessions
//!
//! A [`TransactionSigner`] co-signs the P2SH multisig inputs of one
//! transaction for one cosigner. Sessions are two-phase: inputs are staged
//! with the private key derived for them, then every staged input is signed
//! and merged into whatever signatures other cosigners already added.

use std::collections::HashSet;

use bitcoin::{EcdsaSighashType, ScriptBuf, Transaction};

use crate::core::{
    add_signature_to_multisig_script_sig, script_from_hex, sighash_byte, signature_hash,
    transaction_to_hex, DecodedTransaction, ScriptError,
};
use crate::crypto::KeyPair;
use crate::network::{Network, NetworkRegistry};

use super::error::MultisigError;
use super::master::Master;
use super::node::{Change, CosignerIndex};

/// A multisig input described by a decoded transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigInput {
    /// Position of the input in the transaction
    pub index: usize,
    pub redeem_script: ScriptBuf,
    /// HD path of the spent address, ending in `/change/index`
    pub key_path: String,
}

/// An input ready to sign
#[derive(Debug, Clone)]
struct StagedInput {
    index: usize,
    redeem_script: ScriptBuf,
    key: KeyPair,
}

/// Lifecycle of a signing session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Inputs may be staged
    Setup,
    /// Signatures were added; the session is spent
    Signed,
}

/// One cosigner's signing pass over one transaction
#[derive(Debug)]
pub struct TransactionSigner {
    transaction: Transaction,
    master: Master,
    network: Network,
    staged: Vec<StagedInput>,
    state: SessionState,
}

impl TransactionSigner {
    pub fn new(transaction: Transaction, master: Master, network: &Network) -> Self {
        Self {
            transaction,
            master,
            network: network.clone(),
            staged: Vec::new(),
            state: SessionState::Setup,
        }
    }

    /// Split a decoded record into the transaction and its multisig inputs
    ///
    /// Inputs carrying both `redeem_script` and `hdpm_key_path` are multisig
    /// inputs; the rest are left untouched.
    pub fn translate(
        decoded: &DecodedTransaction,
    ) -> Result<(Transaction, Vec<MultisigInput>), MultisigError> {
        let transaction = decoded.to_transaction()?;

        let inputs = decoded
            .vin
            .iter()
            .enumerate()
            .filter_map(|(index, input)| {
                match (&input.redeem_script, &input.hdpm_key_path) {
                    (Some(redeem_script), Some(key_path)) => Some((index, redeem_script, key_path)),
                    _ => None,
                }
            })
            .map(|(index, redeem_script, key_path)| {
                Ok(MultisigInput {
                    index,
                    redeem_script: script_from_hex(redeem_script)?,
                    key_path: key_path.clone(),
                })
            })
            .collect::<Result<Vec<_>, MultisigError>>()?;

        Ok((transaction, inputs))
    }

    /// Translate `decoded`, import the cosigner's master and stage its inputs
    pub fn load<I>(
        decoded: &DecodedTransaction,
        cosigner_master_key: &str,
        cosigner_index: I,
        network: &Network,
        registry: &NetworkRegistry,
    ) -> Result<Self, MultisigError>
    where
        I: TryInto<CosignerIndex, Error = MultisigError>,
    {
        let (transaction, inputs) = Self::translate(decoded)?;
        let master = Master::from_bip32(cosigner_index, cosigner_master_key, registry)?;

        let mut signer = Self::new(transaction, master, network);
        signer.setup_inputs(&inputs)?;
        Ok(signer)
    }

    /// Derive the signing key for each multisig input
    ///
    /// Replaces anything staged earlier. Fails without staging anything when
    /// an input index repeats or one of the inputs cannot be derived.
    pub fn setup_inputs(&mut self, inputs: &[MultisigInput]) -> Result<(), MultisigError> {
        if self.state == SessionState::Signed {
            return Err(MultisigError::SessionAlreadySigned);
        }

        let mut seen = HashSet::new();
        if let Some(repeated) = inputs.iter().find(|input| !seen.insert(input.index)) {
            return Err(MultisigError::InvalidParams(format!(
                "input {} staged more than once",
                repeated.index
            )));
        }

        let staged = inputs
            .iter()
            .map(|input| {
                let (change, index) = parse_key_path(&input.key_path)?;
                let node = self.master.node_for(change, index)?;
                let key = node.key_pair().ok_or_else(|| {
                    MultisigError::ImportError(format!(
                        "cosigner {} master has no private key",
                        self.master.cosigner_index()
                    ))
                })?;

                log::debug!(
                    "Staged input {} with key {}/{}",
                    input.index,
                    change,
                    index
                );
                Ok(StagedInput {
                    index: input.index,
                    redeem_script: input.redeem_script.clone(),
                    key,
                })
            })
            .collect::<Result<Vec<_>, MultisigError>>()?;

        self.staged = staged;
        Ok(())
    }

    /// Sign every staged input and return the transaction hex
    ///
    /// New signatures are merged with existing ones and ordered to match the
    /// redeem script's keys. The transaction is only updated when every input
    /// signs successfully.
    pub fn sign_inputs(&mut self) -> Result<String, MultisigError> {
        if self.state == SessionState::Signed {
            return Err(MultisigError::SessionAlreadySigned);
        }
        if self.staged.is_empty() {
            return Err(MultisigError::NoStagedInputs);
        }

        let available = self.transaction.input.len();
        if self.staged.len() > available {
            return Err(MultisigError::TooManyStagedInputs {
                staged: self.staged.len(),
                available,
            });
        }
        if let Some(missing) = self.staged.iter().find(|input| input.index >= available) {
            return Err(MultisigError::InputNotFound(missing.index));
        }

        let mut order: Vec<&StagedInput> = self.staged.iter().collect();
        order.sort_by_key(|input| input.index);

        let mut script_sigs = Vec::with_capacity(order.len());
        for input in order {
            let sighash = signature_hash(
                &self.transaction,
                input.index,
                &input.redeem_script,
                EcdsaSighashType::All,
            )?;

            let mut signature = input.key.sign(&sighash);
            signature.push(sighash_byte(EcdsaSighashType::All));

            let current = &self.transaction.input[input.index].script_sig;
            let script_sig = add_signature_to_multisig_script_sig(
                &signature,
                current,
                &input.redeem_script,
                &sighash,
            )
            .map_err(|err| match err {
                ScriptError::UnknownSigner => MultisigError::SigningFailed(format!(
                    "key for input {} is not in its redeem script",
                    input.index
                )),
                other => other.into(),
            })?;

            script_sigs.push((input.index, script_sig));
        }

        for (index, script_sig) in script_sigs {
            self.transaction.input[index].script_sig = script_sig;
        }
        self.state = SessionState::Signed;

        log::info!(
            "Cosigner {} signed {} input(s) on {}",
            self.master.cosigner_index(),
            self.staged.len(),
            self.network.name
        );
        Ok(transaction_to_hex(&self.transaction))
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    pub fn cosigner_index(&self) -> CosignerIndex {
        self.master.cosigner_index()
    }

    pub fn network(&self) -> &Network {
        &self.network
    }
}

/// Trailing `change/index` of an HD path
fn parse_key_path(path: &str) -> Result<(Change, u32), MultisigError> {
    let invalid = || MultisigError::InvalidParams(format!("Invalid key path: {}", path));

    let mut parts = path.trim().rsplit('/');
    let index = parts
        .next()
        .and_then(|part| part.parse::<u32>().ok())
        .ok_or_else(invalid)?;
    let change = parts
        .next()
        .ok_or_else(invalid)?
        .parse::<Change>()
        .map_err(|_| invalid())?;

    Ok((change, index))
}
