//! BIP32 hierarchical-deterministic keys
//!
//! Extended private and public keys over `bitcoin::bip32`, child derivation
//! along slash-separated paths, and the 78-byte serialization whose version
//! bytes come from the [`Network`] the key is exported for. The `bitcoin`
//! codec only knows the bitcoin mainnet and testnet versions, so a
//! network's own version bytes are swapped in around it.

use std::fmt;
use std::str::FromStr;

use bitcoin::bip32::{self, ChildNumber, Xpriv, Xpub};
use bitcoin::NetworkKind;
use secp256k1::{PublicKey, SecretKey, SECP256K1};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::base58::{decode_check, encode_check, Base58Error};
use super::hash::hash160;
use crate::network::{Network, NetworkRegistry};

// =============================================================================
// Constants
// =============================================================================

/// First hardened child index
pub const HARDENED_OFFSET: u32 = 1 << 31;

/// Length of a serialized extended key before the checksum
pub const EXTENDED_KEY_LEN: usize = 78;

/// Accepted seed lengths in bytes
pub const MIN_SEED_LEN: usize = 16;
pub const MAX_SEED_LEN: usize = 64;

/// Versions the `bitcoin` codec reads and writes (xprv / xpub)
const CODEC_PRIVATE_VERSION: [u8; 4] = [0x04, 0x88, 0xad, 0xe4];
const CODEC_PUBLIC_VERSION: [u8; 4] = [0x04, 0x88, 0xb2, 0x1e];

// =============================================================================
// Errors
// =============================================================================

/// Errors from extended key handling
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Bip32Error {
    #[error("Base58 error: {0}")]
    Base58(#[from] Base58Error),
    #[error("BIP32 derivation error: {0}")]
    Derivation(#[from] bip32::Error),
    #[error("Invalid extended key length: {0} bytes")]
    InvalidLength(usize),
    #[error("Invalid version bytes: {0}")]
    UnknownVersion(String),
    #[error("Invalid key data: {0}")]
    InvalidKeyData(String),
    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),
    #[error("Cannot derive hardened child {0} from a public key")]
    HardenedFromPublic(u32),
    #[error("Private key not available")]
    NoPrivateKey,
}

/// Which half of a key pair an extended key carries or is exported as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Private,
    Public,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Private => write!(f, "private"),
            KeyKind::Public => write!(f, "public"),
        }
    }
}

// =============================================================================
// Derivation paths
// =============================================================================

/// A path such as `m/45/0/1` applied relative to the key it is derived from
///
/// A leading `M` asks for the public half of the result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DerivationPath {
    pub force_public: bool,
    pub children: Vec<u32>,
}

impl DerivationPath {
    pub fn new(children: Vec<u32>, force_public: bool) -> Self {
        Self {
            force_public,
            children,
        }
    }

    fn child_numbers(&self) -> Vec<ChildNumber> {
        self.children.iter().copied().map(ChildNumber::from).collect()
    }
}

impl FromStr for DerivationPath {
    type Err = Bip32Error;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let mut parts = path.trim().split('/');
        let force_public = match parts.next() {
            Some("m") => false,
            Some("M") => true,
            _ => return Err(Bip32Error::InvalidPath(path.to_string())),
        };

        let children = parts
            .map(|part| {
                let part = part.trim();
                let hardened_marker = |c: char| matches!(c, '\'' | 'h' | 'H' | 'p');
                let (digits, hardened) = match part.strip_suffix(hardened_marker) {
                    Some(digits) => (digits, true),
                    None => (part, false),
                };
                let index: u32 = digits
                    .parse()
                    .map_err(|_| Bip32Error::InvalidPath(path.to_string()))?;
                if index >= HARDENED_OFFSET {
                    return Err(Bip32Error::InvalidPath(path.to_string()));
                }
                Ok(if hardened { index + HARDENED_OFFSET } else { index })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            force_public,
            children,
        })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if self.force_public { "M" } else { "m" })?;
        for child in &self.children {
            if *child >= HARDENED_OFFSET {
                write!(f, "/{}'", child - HARDENED_OFFSET)?;
            } else {
                write!(f, "/{}", child)?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Capability interface
// =============================================================================

/// What every HD key can do, whether or not it holds private material
pub trait HdKey {
    /// Compressed-capable public key
    fn public_key(&self) -> PublicKey;

    /// Private key, when present
    fn private_key(&self) -> Option<&SecretKey>;

    /// Base58check export with `network` version bytes
    fn to_bip32(&self, kind: KeyKind, network: &Network) -> Result<String, Bip32Error>;

    /// Derive every child of `path` in turn
    fn derive_path(&self, path: &DerivationPath) -> Result<ExtendedKey, Bip32Error>;
}

/// First four bytes of HASH160 of the compressed public key
pub fn fingerprint(public_key: &PublicKey) -> [u8; 4] {
    let hash = hash160(&public_key.serialize());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn encode_with_version(mut data: [u8; EXTENDED_KEY_LEN], version: [u8; 4]) -> String {
    data[..4].copy_from_slice(&version);
    encode_check(&data)
}

// =============================================================================
// Extended private key
// =============================================================================

/// Extended private key
#[derive(Clone, PartialEq, Eq)]
pub struct ExtendedPrivKey(Xpriv);

impl fmt::Debug for ExtendedPrivKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedPrivKey")
            .field("depth", &self.0.depth)
            .field("child_number", &self.child_number())
            .field("public_key", &hex::encode(self.public_key().serialize()))
            .finish_non_exhaustive()
    }
}

impl ExtendedPrivKey {
    /// Root key of the tree grown from `seed`
    pub fn from_seed(seed: &[u8]) -> Result<Self, Bip32Error> {
        if !(MIN_SEED_LEN..=MAX_SEED_LEN).contains(&seed.len()) {
            return Err(Bip32Error::InvalidKeyData(format!(
                "seed must be {}-{} bytes, got {}",
                MIN_SEED_LEN,
                MAX_SEED_LEN,
                seed.len()
            )));
        }

        Ok(Self(Xpriv::new_master(NetworkKind::Main, seed)?))
    }

    /// Derive one child; indices at or above [`HARDENED_OFFSET`] are hardened
    pub fn derive_child(&self, child: u32) -> Result<Self, Bip32Error> {
        let key = self.0.derive_priv(SECP256K1, &[ChildNumber::from(child)])?;
        Ok(Self(key))
    }

    /// The public half, keeping the tree position
    pub fn to_public(&self) -> ExtendedPubKey {
        ExtendedPubKey(Xpub::from_priv(SECP256K1, &self.0))
    }

    pub fn depth(&self) -> u8 {
        self.0.depth
    }

    pub fn child_number(&self) -> u32 {
        u32::from(self.0.child_number)
    }
}

impl HdKey for ExtendedPrivKey {
    fn public_key(&self) -> PublicKey {
        PublicKey::from_secret_key(SECP256K1, &self.0.private_key)
    }

    fn private_key(&self) -> Option<&SecretKey> {
        Some(&self.0.private_key)
    }

    fn to_bip32(&self, kind: KeyKind, network: &Network) -> Result<String, Bip32Error> {
        match kind {
            KeyKind::Private => Ok(encode_with_version(
                self.0.encode(),
                network.extended_privkey_version,
            )),
            KeyKind::Public => self.to_public().to_bip32(kind, network),
        }
    }

    fn derive_path(&self, path: &DerivationPath) -> Result<ExtendedKey, Bip32Error> {
        let key = Self(self.0.derive_priv(SECP256K1, &path.child_numbers())?);

        Ok(if path.force_public {
            ExtendedKey::Public(key.to_public())
        } else {
            ExtendedKey::Private(key)
        })
    }
}

// =============================================================================
// Extended public key
// =============================================================================

/// Extended public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedPubKey(Xpub);

impl ExtendedPubKey {
    /// Derive one non-hardened child
    pub fn derive_child(&self, child: u32) -> Result<Self, Bip32Error> {
        if child >= HARDENED_OFFSET {
            return Err(Bip32Error::HardenedFromPublic(child - HARDENED_OFFSET));
        }
        let key = self.0.derive_pub(SECP256K1, &[ChildNumber::from(child)])?;
        Ok(Self(key))
    }

    pub fn depth(&self) -> u8 {
        self.0.depth
    }

    pub fn child_number(&self) -> u32 {
        u32::from(self.0.child_number)
    }
}

impl HdKey for ExtendedPubKey {
    fn public_key(&self) -> PublicKey {
        self.0.public_key
    }

    fn private_key(&self) -> Option<&SecretKey> {
        None
    }

    fn to_bip32(&self, kind: KeyKind, network: &Network) -> Result<String, Bip32Error> {
        match kind {
            KeyKind::Private => Err(Bip32Error::NoPrivateKey),
            KeyKind::Public => Ok(encode_with_version(
                self.0.encode(),
                network.extended_pubkey_version,
            )),
        }
    }

    fn derive_path(&self, path: &DerivationPath) -> Result<ExtendedKey, Bip32Error> {
        if let Some(hardened) = path.children.iter().find(|c| **c >= HARDENED_OFFSET) {
            return Err(Bip32Error::HardenedFromPublic(hardened - HARDENED_OFFSET));
        }
        let key = self.0.derive_pub(SECP256K1, &path.child_numbers())?;
        Ok(ExtendedKey::Public(Self(key)))
    }
}

// =============================================================================
// Either kind
// =============================================================================

/// An extended key of either kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendedKey {
    Private(ExtendedPrivKey),
    Public(ExtendedPubKey),
}

impl From<ExtendedPrivKey> for ExtendedKey {
    fn from(key: ExtendedPrivKey) -> Self {
        ExtendedKey::Private(key)
    }
}

impl From<ExtendedPubKey> for ExtendedKey {
    fn from(key: ExtendedPubKey) -> Self {
        ExtendedKey::Public(key)
    }
}

impl ExtendedKey {
    /// Import a base58check extended key
    ///
    /// The version bytes must belong to a network in `registry`; that
    /// network is returned alongside the key.
    pub fn decode<'r>(
        encoded: &str,
        registry: &'r NetworkRegistry,
    ) -> Result<(Self, &'r Network), Bip32Error> {
        let mut data = decode_check(encoded.trim())?;
        if data.len() != EXTENDED_KEY_LEN {
            return Err(Bip32Error::InvalidLength(data.len()));
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&data[0..4]);
        let (network, kind) = registry
            .find_by_extended_version(version)
            .ok_or_else(|| Bip32Error::UnknownVersion(hex::encode(version)))?;

        // depth 0 with a parent fingerprint or child number
        if data[4] == 0 && data[5..13].iter().any(|b| *b != 0) {
            return Err(Bip32Error::InvalidKeyData(
                "root key with a parent".to_string(),
            ));
        }

        let key = match kind {
            KeyKind::Private => {
                if data[45] != 0 {
                    return Err(Bip32Error::InvalidKeyData(
                        "private key must start with 0x00".to_string(),
                    ));
                }
                data[..4].copy_from_slice(&CODEC_PRIVATE_VERSION);
                let key = Xpriv::decode(&data)
                    .map_err(|e| Bip32Error::InvalidKeyData(e.to_string()))?;
                ExtendedKey::Private(ExtendedPrivKey(key))
            }
            KeyKind::Public => {
                data[..4].copy_from_slice(&CODEC_PUBLIC_VERSION);
                let key = Xpub::decode(&data)
                    .map_err(|e| Bip32Error::InvalidKeyData(e.to_string()))?;
                ExtendedKey::Public(ExtendedPubKey(key))
            }
        };

        log::debug!(
            "Imported {} extended key at depth {} for {}",
            kind,
            key.depth(),
            network.name
        );
        Ok((key, network))
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            ExtendedKey::Private(_) => KeyKind::Private,
            ExtendedKey::Public(_) => KeyKind::Public,
        }
    }

    pub fn is_private(&self) -> bool {
        self.kind() == KeyKind::Private
    }

    /// The public half, keeping the tree position
    pub fn to_public(&self) -> ExtendedPubKey {
        match self {
            ExtendedKey::Private(key) => key.to_public(),
            ExtendedKey::Public(key) => key.clone(),
        }
    }

    pub fn depth(&self) -> u8 {
        match self {
            ExtendedKey::Private(key) => key.depth(),
            ExtendedKey::Public(key) => key.depth(),
        }
    }
}

impl HdKey for ExtendedKey {
    fn public_key(&self) -> PublicKey {
        match self {
            ExtendedKey::Private(key) => key.public_key(),
            ExtendedKey::Public(key) => key.public_key(),
        }
    }

    fn private_key(&self) -> Option<&SecretKey> {
        match self {
            ExtendedKey::Private(key) => key.private_key(),
            ExtendedKey::Public(key) => key.private_key(),
        }
    }

    fn to_bip32(&self, kind: KeyKind, network: &Network) -> Result<String, Bip32Error> {
        match self {
            ExtendedKey::Private(key) => key.to_bip32(kind, network),
            ExtendedKey::Public(key) => key.to_bip32(kind, network),
        }
    }

    fn derive_path(&self, path: &DerivationPath) -> Result<ExtendedKey, Bip32Error> {
        match self {
            ExtendedKey::Private(key) => key.derive_path(path),
            ExtendedKey::Public(key) => key.derive_path(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // BIP32 test vector 1
    const SEED: &str = "000102030405060708090a0b0c0d0e0f";
    const M_XPRV: &str = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi";
    const M_XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";
    const M_0H_XPUB: &str = "xpub68Gmy5EdvgibQVfPdqkBBCHxA5htiqg55crXYuXoQRKfDBFA1WEjWgP6LHhwBZeNK1VTsfTFUHCdrfp1bgwQ9xv5ski8PX9rL2dZXvgGDnw";
    const M_0H_1_XPRV: &str = "xprv9wTYmMFdV23N2TdNG573QoEsfRrWKQgWeibmLntzniatZvR9BmLnvSxqu53Kw1UmYPxLgboyZQaXwTCg8MSY3H2EU4pWcQDnRnrVA1xe8fs";
    const M_0H_1_XPUB: &str = "xpub6ASuArnXKPbfEwhqN6e3mwBcDTgzisQN1wXN9BJcM47sSikHjJf3UFHKkNAWbWMiGj7Wf5uMash7SyYq527Hqck2AxYysAA7xmALppuCkwQ";

    fn root() -> ExtendedPrivKey {
        ExtendedPrivKey::from_seed(&hex::decode(SEED).unwrap()).unwrap()
    }

    #[test]
    fn test_master_from_seed() {
        let btc = Network::bitcoin();
        let master = root();
        assert_eq!(master.to_bip32(KeyKind::Private, &btc).unwrap(), M_XPRV);
        assert_eq!(master.to_bip32(KeyKind::Public, &btc).unwrap(), M_XPUB);
        assert_eq!(hex::encode(fingerprint(&master.public_key())), "3442193e");
    }

    #[test]
    fn test_private_derivation() {
        let btc = Network::bitcoin();
        let path: DerivationPath = "m/0'/1".parse().unwrap();
        let child = root().derive_path(&path).unwrap();

        assert!(child.is_private());
        assert_eq!(child.depth(), 2);
        assert_eq!(child.to_bip32(KeyKind::Private, &btc).unwrap(), M_0H_1_XPRV);
        assert_eq!(child.to_bip32(KeyKind::Public, &btc).unwrap(), M_0H_1_XPUB);
    }

    #[test]
    fn test_public_derivation_matches_private() {
        let registry = NetworkRegistry::new();
        let (parent, _) = ExtendedKey::decode(M_0H_XPUB, &registry).unwrap();
        assert!(!parent.is_private());

        let child = parent.derive_path(&"M/1".parse().unwrap()).unwrap();
        assert_eq!(
            child.to_bip32(KeyKind::Public, &Network::bitcoin()).unwrap(),
            M_0H_1_XPUB
        );
    }

    #[test]
    fn test_force_public_path() {
        let child = root().derive_path(&"M/0'/1".parse().unwrap()).unwrap();
        assert!(!child.is_private());
        assert!(child.private_key().is_none());
    }

    #[test]
    fn test_hardened_from_public() {
        let public = ExtendedKey::Public(root().to_public());
        let result = public.derive_path(&"M/0'".parse().unwrap());
        assert_eq!(result, Err(Bip32Error::HardenedFromPublic(0)));
    }

    #[test]
    fn test_decode_round_trip() {
        let registry = NetworkRegistry::new();
        let (key, network) = ExtendedKey::decode(M_0H_1_XPRV, &registry).unwrap();
        assert_eq!(network.name, "bitcoin");
        assert_eq!(key.kind(), KeyKind::Private);
        assert_eq!(key.to_bip32(KeyKind::Private, network).unwrap(), M_0H_1_XPRV);
    }

    #[test]
    fn test_export_under_other_network() {
        let registry = NetworkRegistry::new();
        let net = registry.get("thebestcoin_testnet").unwrap();
        let exported = root().to_bip32(KeyKind::Public, net).unwrap();

        let (key, detected) = ExtendedKey::decode(&exported, &registry).unwrap();
        assert_eq!(detected.name, "thebestcoin_testnet");
        assert_eq!(key.public_key(), root().public_key());
    }

    #[test]
    fn test_decode_unknown_version() {
        let registry = NetworkRegistry::new();
        let v09 = "2upJFjNqWrgw8TrMVP99DtxD1d9yAegYazqm9RCfXKj4fD7PViE79i3jiLzJBn16Z6VQojihrQXH2cLB3GmKyaM5wRVhuPvQ8FwMNKQLkUsEBXKM";
        assert_eq!(
            ExtendedKey::decode(v09, &registry),
            Err(Bip32Error::UnknownVersion("09000000".to_string()))
        );
    }

    #[test]
    fn test_decode_bad_checksum() {
        let registry = NetworkRegistry::new();
        let mut tampered = M_XPUB.to_string();
        tampered.pop();
        tampered.push('9');
        assert_eq!(
            ExtendedKey::decode(&tampered, &registry),
            Err(Bip32Error::Base58(Base58Error::InvalidChecksum))
        );
    }

    #[test]
    fn test_decode_wrong_length() {
        let registry = NetworkRegistry::new();
        let short = "Deb7pNXSbX7qSvc2e43XLxrU4Wbif71fzakq2ecQpZSkGDbATEXFMJkjpWRoU35iW2c2NLwpiVX4P6znmdjrqB6a14AmaiEQc6D2M1aKjAXWns";
        assert_eq!(
            ExtendedKey::decode(short, &registry),
            Err(Bip32Error::InvalidLength(77))
        );
    }

    #[test]
    fn test_private_export_of_public_key() {
        let public = root().to_public();
        assert_eq!(
            public.to_bip32(KeyKind::Private, &Network::bitcoin()),
            Err(Bip32Error::NoPrivateKey)
        );
    }

    #[test]
    fn test_path_parsing() {
        let path: DerivationPath = "m/45/0h/1p/2'".parse().unwrap();
        assert!(!path.force_public);
        assert_eq!(
            path.children,
            vec![45, HARDENED_OFFSET, 1 + HARDENED_OFFSET, 2 + HARDENED_OFFSET]
        );
        assert_eq!(path.to_string(), "m/45/0'/1'/2'");

        let root_only: DerivationPath = "M".parse().unwrap();
        assert!(root_only.force_public);
        assert!(root_only.children.is_empty());

        assert!("45/0".parse::<DerivationPath>().is_err());
        assert!("m/x".parse::<DerivationPath>().is_err());
        assert!("m/2147483648".parse::<DerivationPath>().is_err());
    }

    #[test]
    fn test_seed_length_bounds() {
        assert!(ExtendedPrivKey::from_seed(&[0u8; 15]).is_err());
        assert!(ExtendedPrivKey::from_seed(&[0u8; 65]).is_err());
        assert!(ExtendedPrivKey::from_seed(&[7u8; 32]).is_ok());
    }

    #[test]
    fn test_debug_hides_secret() {
        let master = root();
        let secret = hex::encode(master.private_key().unwrap().secret_bytes());
        assert!(!format!("{:?}", master).contains(&secret));
    }
}
