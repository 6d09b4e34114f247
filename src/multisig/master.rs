//! Cosigner master keys
//!
//! A [`Master`] is the `m/45` node of one cosigner. It is either seeded from
//! fresh entropy or imported from an extended key, and derives the per-address
//! nodes the group is built from.

use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::{PublicKey, SecretKey};

use super::error::MultisigError;
use super::node::{bip45_path, Change, CosignerIndex, Node, BIP45_PURPOSE};
use crate::crypto::{
    Bip32Error, DerivationPath, ExtendedKey, ExtendedPrivKey, HdKey, KeyKind,
};
use crate::network::{Network, NetworkRegistry};

/// Bytes of entropy drawn when seeding a new master
pub const SEED_LEN: usize = 32;

/// The BIP45 master node of one cosigner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Master {
    cosigner_index: CosignerIndex,
    node: Node,
    network: Network,
}

impl Master {
    /// Seed a new private master for `cosigner_index`
    pub fn seed<I>(cosigner_index: I, network: &Network) -> Result<Self, MultisigError>
    where
        I: TryInto<CosignerIndex, Error = MultisigError>,
    {
        let cosigner_index = cosigner_index.try_into()?;

        let mut seed = [0u8; SEED_LEN];
        OsRng.fill_bytes(&mut seed);
        let master = Self::seeded(cosigner_index, &seed, network);
        seed.fill(0);
        master
    }

    /// Deterministic master from seed bytes, positioned at `m/45`
    pub fn from_seed<I>(
        cosigner_index: I,
        seed: &[u8],
        network: &Network,
    ) -> Result<Self, MultisigError>
    where
        I: TryInto<CosignerIndex, Error = MultisigError>,
    {
        Self::seeded(cosigner_index.try_into()?, seed, network)
    }

    fn seeded(
        cosigner_index: CosignerIndex,
        seed: &[u8],
        network: &Network,
    ) -> Result<Self, MultisigError> {
        let root = ExtendedPrivKey::from_seed(seed)?;
        let key = root.derive_path(&DerivationPath::new(vec![BIP45_PURPOSE], false))?;

        log::info!(
            "Seeded master for cosigner {} on {}",
            cosigner_index,
            network.name
        );
        Ok(Self {
            cosigner_index,
            node: Node::with_coordinates(key, cosigner_index, None, None),
            network: network.clone(),
        })
    }

    /// Import a cosigner's extended key
    ///
    /// The network is detected from the key's version bytes.
    pub fn from_bip32<I>(
        cosigner_index: I,
        cosigner_master_key: &str,
        registry: &NetworkRegistry,
    ) -> Result<Self, MultisigError>
    where
        I: TryInto<CosignerIndex, Error = MultisigError>,
    {
        let cosigner_index = cosigner_index.try_into()?;
        let (key, network) = ExtendedKey::decode(cosigner_master_key, registry)?;

        log::debug!(
            "Imported {} master for cosigner {} on {}",
            key.kind(),
            cosigner_index,
            network.name
        );
        Ok(Self {
            cosigner_index,
            node: Node::with_coordinates(key, cosigner_index, None, None),
            network: network.clone(),
        })
    }

    /// Promote a node that already carries a cosigner index
    pub fn from_node(node: Node, network: &Network) -> Result<Self, MultisigError> {
        let cosigner_index = node.cosigner_index().ok_or_else(|| {
            MultisigError::InvalidCosignerIndex("node has no cosigner index".to_string())
        })?;

        Ok(Self {
            cosigner_index,
            node,
            network: network.clone(),
        })
    }

    pub fn cosigner_index(&self) -> CosignerIndex {
        self.cosigner_index
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn into_node(self) -> Node {
        self.node
    }

    pub fn is_private(&self) -> bool {
        self.node.is_private()
    }

    pub fn public_key_hex(&self) -> String {
        self.node.public_key_hex()
    }

    /// Extended key export under the master's own network
    pub fn export(&self, kind: KeyKind) -> Result<String, MultisigError> {
        Ok(self.node.to_bip32(kind, &self.network)?)
    }

    /// Node at `45/{cosigner}/{change}/{index}` below this master
    ///
    /// Public-only masters yield public nodes.
    pub fn node_for(&self, change: Change, index: u32) -> Result<Node, MultisigError> {
        let path = bip45_path(self.cosigner_index, change, index, !self.is_private())?;
        let key = self.node.derive_path(&path)?;

        log::debug!(
            "Derived {} for cosigner {}",
            path,
            self.cosigner_index
        );
        Ok(Node::with_coordinates(
            key,
            self.cosigner_index,
            Some(change),
            Some(index),
        ))
    }
}

impl HdKey for Master {
    fn public_key(&self) -> PublicKey {
        self.node.public_key()
    }

    fn private_key(&self) -> Option<&SecretKey> {
        self.node.private_key()
    }

    fn to_bip32(&self, kind: KeyKind, network: &Network) -> Result<String, Bip32Error> {
        self.node.to_bip32(kind, network)
    }

    fn derive_path(&self, path: &DerivationPath) -> Result<ExtendedKey, Bip32Error> {
        self.node.derive_path(path)
    }
}
