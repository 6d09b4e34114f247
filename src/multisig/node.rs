//! HD nodes and BIP45 coordinates
//!
//! A [`Node`] wraps one extended key and remembers where in the BIP45 tree it
//! was derived. [`CosignerIndex`] and [`Change`] are the validated coordinates
//! of that tree.

use std::fmt;
use std::str::FromStr;

use secp256k1::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};

use super::error::MultisigError;
use crate::crypto::{
    public_key_to_address, Bip32Error, DerivationPath, ExtendedKey, HdKey, KeyKind, KeyPair,
    HARDENED_OFFSET,
};
use crate::network::{Network, NetworkRegistry};

/// Exclusive upper bound on cosigner indices, and on group size
pub const MAX_COSIGNER: u32 = 20;

/// BIP45 purpose level
pub const BIP45_PURPOSE: u32 = 45;

// =============================================================================
// Cosigner index
// =============================================================================

/// Position of a cosigner within a group, in `0..MAX_COSIGNER`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct CosignerIndex(u32);

impl CosignerIndex {
    pub fn new(index: u32) -> Result<Self, MultisigError> {
        if index >= MAX_COSIGNER {
            return Err(MultisigError::InvalidCosignerIndex(index.to_string()));
        }
        Ok(Self(index))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CosignerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<CosignerIndex> for u32 {
    fn from(index: CosignerIndex) -> Self {
        index.0
    }
}

impl TryFrom<u32> for CosignerIndex {
    type Error = MultisigError;

    fn try_from(index: u32) -> Result<Self, Self::Error> {
        Self::new(index)
    }
}

impl TryFrom<i32> for CosignerIndex {
    type Error = MultisigError;

    fn try_from(index: i32) -> Result<Self, Self::Error> {
        u32::try_from(index)
            .map_err(|_| MultisigError::InvalidCosignerIndex(index.to_string()))
            .and_then(Self::new)
    }
}

impl TryFrom<i64> for CosignerIndex {
    type Error = MultisigError;

    fn try_from(index: i64) -> Result<Self, Self::Error> {
        u32::try_from(index)
            .map_err(|_| MultisigError::InvalidCosignerIndex(index.to_string()))
            .and_then(Self::new)
    }
}

impl TryFrom<usize> for CosignerIndex {
    type Error = MultisigError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        u32::try_from(index)
            .map_err(|_| MultisigError::InvalidCosignerIndex(index.to_string()))
            .and_then(Self::new)
    }
}

impl TryFrom<&str> for CosignerIndex {
    type Error = MultisigError;

    fn try_from(index: &str) -> Result<Self, Self::Error> {
        index.parse()
    }
}

impl FromStr for CosignerIndex {
    type Err = MultisigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map_err(|_| MultisigError::InvalidCosignerIndex(s.to_string()))
            .and_then(Self::new)
    }
}

// =============================================================================
// Change
// =============================================================================

/// BIP45 change level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    /// Deposit addresses
    #[default]
    Receive = 0,
    /// Change addresses
    Change = 1,
}

impl Change {
    pub fn value(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl From<bool> for Change {
    fn from(is_change: bool) -> Self {
        if is_change {
            Change::Change
        } else {
            Change::Receive
        }
    }
}

impl TryFrom<u32> for Change {
    type Error = MultisigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Change::Receive),
            1 => Ok(Change::Change),
            other => Err(MultisigError::InvalidParams(format!(
                "change must be 0 or 1, got {}",
                other
            ))),
        }
    }
}

impl FromStr for Change {
    type Err = MultisigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" | "receive" => Ok(Change::Receive),
            "1" | "change" => Ok(Change::Change),
            other => Err(MultisigError::InvalidParams(format!(
                "change must be 0 or 1, got {}",
                other
            ))),
        }
    }
}

/// `45/{cosigner}/{change}/{index}` relative to a cosigner's master key
pub(crate) fn bip45_path(
    cosigner_index: CosignerIndex,
    change: Change,
    index: u32,
    force_public: bool,
) -> Result<DerivationPath, MultisigError> {
    if index >= HARDENED_OFFSET {
        return Err(MultisigError::InvalidParams(format!(
            "address index {} out of range",
            index
        )));
    }

    Ok(DerivationPath::new(
        vec![BIP45_PURPOSE, cosigner_index.value(), change.value(), index],
        force_public,
    ))
}

// =============================================================================
// Node
// =============================================================================

/// One HD key and, when known, its BIP45 coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    key: ExtendedKey,
    cosigner_index: Option<CosignerIndex>,
    change: Option<Change>,
    index: Option<u32>,
}

impl Node {
    pub fn new(key: impl Into<ExtendedKey>) -> Self {
        Self {
            key: key.into(),
            cosigner_index: None,
            change: None,
            index: None,
        }
    }

    pub(crate) fn with_coordinates(
        key: ExtendedKey,
        cosigner_index: CosignerIndex,
        change: Option<Change>,
        index: Option<u32>,
    ) -> Self {
        Self {
            key,
            cosigner_index: Some(cosigner_index),
            change,
            index,
        }
    }

    /// Import a base58check extended key, returning the network it belongs to
    pub fn from_bip32(
        encoded: &str,
        registry: &NetworkRegistry,
    ) -> Result<(Self, Network), MultisigError> {
        let (key, network) = ExtendedKey::decode(encoded, registry)?;
        Ok((Self::new(key), network.clone()))
    }

    pub fn extended_key(&self) -> &ExtendedKey {
        &self.key
    }

    pub fn is_private(&self) -> bool {
        self.key.is_private()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.public_key().serialize())
    }

    /// P2PKH address of this node's key
    pub fn to_address(&self, network: &Network) -> String {
        public_key_to_address(&self.key.public_key(), network)
    }

    /// Compressed WIF of the private key
    pub fn to_wif(&self, network: &Network) -> Result<String, MultisigError> {
        self.key_pair()
            .map(|pair| pair.to_wif(network))
            .ok_or_else(|| MultisigError::ImportError(Bip32Error::NoPrivateKey.to_string()))
    }

    /// Signing key pair, when private material is present
    pub fn key_pair(&self) -> Option<KeyPair> {
        self.key.private_key().map(|secret| KeyPair::from_secret_key(*secret))
    }

    pub fn cosigner_index(&self) -> Option<CosignerIndex> {
        self.cosigner_index
    }

    pub fn change(&self) -> Option<Change> {
        self.change
    }

    pub fn index(&self) -> Option<u32> {
        self.index
    }

    pub fn depth(&self) -> u8 {
        self.key.depth()
    }
}

impl HdKey for Node {
    fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    fn private_key(&self) -> Option<&SecretKey> {
        self.key.private_key()
    }

    fn to_bip32(&self, kind: KeyKind, network: &Network) -> Result<String, Bip32Error> {
        self.key.to_bip32(kind, network)
    }

    fn derive_path(&self, path: &DerivationPath) -> Result<ExtendedKey, Bip32Error> {
        self.key.derive_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const K0_PRIV: &str = "EQQ8svTXQEEKbZ3WMbCHDKHvyCbDYzYmyNhLDJCKxo99rews4SfpiwNcXtJAk9zA4ayAUkwWDWaTg7x1k93ApgWE4mj1cFSzM2h7a168YMWtK5EL";
    const K0_PUB: &str = "EQQ8FQdegbPHJQV65Co3cjSaKDWHkcxMjVpP7Be4s7arc7N6ic955bidDZ7jbEboHm276YtdxZsMCtmpKijgSVAtgfD1ataV1YxY2rENT2ULMqMW";

    #[test]
    fn test_cosigner_index_bounds() {
        assert_eq!(CosignerIndex::try_from(0i32).unwrap().value(), 0);
        assert_eq!(CosignerIndex::try_from(19usize).unwrap().value(), 19);
        assert!(matches!(
            CosignerIndex::try_from(-1i32),
            Err(MultisigError::InvalidCosignerIndex(_))
        ));
        assert!(matches!(
            CosignerIndex::try_from(20u32),
            Err(MultisigError::InvalidCosignerIndex(_))
        ));
        assert!(matches!(
            CosignerIndex::try_from(-5i64),
            Err(MultisigError::InvalidCosignerIndex(_))
        ));
    }

    #[test]
    fn test_cosigner_index_from_text() {
        assert_eq!(CosignerIndex::try_from("3").unwrap().value(), 3);
        assert!(matches!(
            CosignerIndex::try_from("one"),
            Err(MultisigError::InvalidCosignerIndex(_))
        ));
        assert!(matches!(
            "1.5".parse::<CosignerIndex>(),
            Err(MultisigError::InvalidCosignerIndex(_))
        ));
    }

    #[test]
    fn test_cosigner_index_serde() {
        let index: CosignerIndex = serde_json::from_str("7").unwrap();
        assert_eq!(serde_json::to_string(&index).unwrap(), "7");
        assert!(serde_json::from_str::<CosignerIndex>("25").is_err());
    }

    #[test]
    fn test_change_parsing() {
        assert_eq!("0".parse::<Change>().unwrap(), Change::Receive);
        assert_eq!("change".parse::<Change>().unwrap(), Change::Change);
        assert_eq!(Change::try_from(1u32).unwrap(), Change::Change);
        assert!(matches!(
            Change::try_from(2u32),
            Err(MultisigError::InvalidParams(_))
        ));
        assert_eq!(Change::from(true), Change::Change);
    }

    #[test]
    fn test_bip45_path() {
        let cosigner = CosignerIndex::new(2).unwrap();
        let path = bip45_path(cosigner, Change::Change, 7, true).unwrap();
        assert_eq!(path.to_string(), "M/45/2/1/7");

        assert!(matches!(
            bip45_path(cosigner, Change::Receive, HARDENED_OFFSET, false),
            Err(MultisigError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_node_import_and_export() {
        let registry = NetworkRegistry::default();
        let (node, network) = Node::from_bip32(K0_PRIV, &registry).unwrap();
        assert_eq!(network.name, "thebestcoin_testnet");
        assert!(node.is_private());
        assert_eq!(
            node.public_key_hex(),
            "02e44fd5679fd7ca2e97bc3817dc32ecd1255a2d742148c7ce8d34400e0506a8a3"
        );
        assert_eq!(node.to_bip32(KeyKind::Public, &network).unwrap(), K0_PUB);
        assert_eq!(
            node.to_bip32(KeyKind::Private, &Network::bitcoin()).unwrap(),
            "xprv9u6fXfzfA4LGMtFra4BQUY2gsUCXgp9uyRiZTbk2EtwLEcfHmUfhCzxEAUc6geQE699Rwmoo4EEvv81fxWqQmPKTHegZWKbo5hmJETbfDfn"
        );
    }

    #[test]
    fn test_public_node_has_no_wif() {
        let registry = NetworkRegistry::default();
        let (node, network) = Node::from_bip32(K0_PUB, &registry).unwrap();
        assert!(!node.is_private());
        assert!(node.key_pair().is_none());
        assert!(matches!(
            node.to_wif(&network),
            Err(MultisigError::ImportError(_))
        ));

        let err: MultisigError = node
            .to_bip32(KeyKind::Private, &network)
            .unwrap_err()
            .into();
        assert!(matches!(err, MultisigError::ImportError(_)));
    }

    #[test]
    fn test_debug_hides_private_key() {
        let registry = NetworkRegistry::default();
        let (node, _) = Node::from_bip32(K0_PRIV, &registry).unwrap();
        let secret = hex::encode(node.private_key().unwrap().secret_bytes());
        assert!(!format!("{:?}", node).contains(&secret));
    }
}
