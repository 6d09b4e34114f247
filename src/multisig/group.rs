//! BIP45 multisig groups
//!
//! A [`Bip45Node`] aggregates one public key per cosigner with a signing
//! threshold. Keys are always ordered by their compressed bytes before a
//! redeem script or serialized blob is produced, so every cosigner computes
//! the same address from the same key set regardless of input order.
//!
//! The serialized form is base58check over the ASCII payload
//! `network;required_signs;[index:]key;...` with keys in sorted order.

use std::collections::BTreeMap;
use std::collections::HashSet;

use bitcoin::ScriptBuf;
use secp256k1::PublicKey;

use super::error::MultisigError;
use super::master::Master;
use super::node::{bip45_path, Change, CosignerIndex, MAX_COSIGNER};
use crate::core::{multisig_script, MultisigScriptExt};
use crate::crypto::base58::is_base58;
use crate::crypto::{decode_check, encode_check, ExtendedKey, HdKey, KeyKind};
use crate::network::{Network, NetworkRegistry};

/// Separator between payload fields
const FIELD_SEPARATOR: &str = ";";

/// Separator between a cosigner index tag and its key
const TAG_SEPARATOR: char = ':';

/// Length of a compressed public key in hex
const RAW_KEY_HEX_LEN: usize = 66;

// =============================================================================
// Cosigner keys
// =============================================================================

/// A cosigner's contribution to a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CosignerKey {
    /// Compressed public key, fixed at one address
    Raw(PublicKey),
    /// Extended key the group can derive from
    Extended(ExtendedKey),
}

impl CosignerKey {
    /// Classify and import a key string
    ///
    /// 66 hex characters are a raw compressed key; any other base58 string is
    /// imported as an extended key.
    pub fn parse(key: &str, registry: &NetworkRegistry) -> Result<Self, MultisigError> {
        let key = key.trim();

        if key.len() == RAW_KEY_HEX_LEN && key.bytes().all(|b| b.is_ascii_hexdigit()) {
            let bytes =
                hex::decode(key).map_err(|_| MultisigError::KeyFormatNotFound(key.to_string()))?;
            return PublicKey::from_slice(&bytes)
                .map(CosignerKey::Raw)
                .map_err(|_| MultisigError::KeyFormatNotFound(key.to_string()));
        }

        if is_base58(key) {
            let (extended, _) = ExtendedKey::decode(key, registry)?;
            return Ok(CosignerKey::Extended(extended));
        }

        Err(MultisigError::KeyFormatNotFound(key.to_string()))
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            CosignerKey::Raw(key) => *key,
            CosignerKey::Extended(key) => key.public_key(),
        }
    }

    pub fn is_extended(&self) -> bool {
        matches!(self, CosignerKey::Extended(_))
    }

    /// Text form written into a serialized group, never private
    fn encode(&self, network: &Network) -> Result<String, MultisigError> {
        match self {
            CosignerKey::Raw(key) => Ok(hex::encode(key.serialize())),
            CosignerKey::Extended(key) => Ok(key.to_bip32(KeyKind::Public, network)?),
        }
    }
}

impl From<PublicKey> for CosignerKey {
    fn from(key: PublicKey) -> Self {
        CosignerKey::Raw(key)
    }
}

impl From<ExtendedKey> for CosignerKey {
    fn from(key: ExtendedKey) -> Self {
        CosignerKey::Extended(key)
    }
}

// =============================================================================
// Multisig group
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct Cached {
    network: Network,
    address: String,
    redeem_script: ScriptBuf,
}

/// An M-of-N group of BIP45 cosigners
#[derive(Debug, Clone)]
pub struct Bip45Node {
    required_signs: usize,
    keys: BTreeMap<CosignerIndex, CosignerKey>,
    /// Whether serialization writes `index:` tags
    tagged: bool,
    network: Network,
    cache: Option<Cached>,
}

impl Bip45Node {
    /// Group from keys tagged with their cosigner index
    pub fn new<I>(required_signs: usize, keys: I, network: &Network) -> Result<Self, MultisigError>
    where
        I: IntoIterator<Item = (CosignerIndex, CosignerKey)>,
    {
        let mut map = BTreeMap::new();
        for (index, key) in keys {
            if map.insert(index, key).is_some() {
                return Err(MultisigError::InvalidCosignerIndex(format!(
                    "duplicate cosigner index {}",
                    index
                )));
            }
        }

        Self::build(required_signs, map, true, network)
    }

    /// Group from untagged keys
    ///
    /// Cosigner indices are assigned by sorted key position, which is how
    /// BIP45 lets cosigners agree on them without coordination.
    pub fn from_keys<I>(
        required_signs: usize,
        keys: I,
        network: &Network,
    ) -> Result<Self, MultisigError>
    where
        I: IntoIterator<Item = CosignerKey>,
    {
        let mut keys: Vec<CosignerKey> = keys.into_iter().collect();
        if keys.len() > MAX_COSIGNER as usize {
            return Err(gap_limit());
        }
        keys.sort_by_key(|key| key.public_key().serialize());

        let map = keys
            .into_iter()
            .enumerate()
            .map(|(position, key)| Ok((CosignerIndex::try_from(position)?, key)))
            .collect::<Result<BTreeMap<_, _>, MultisigError>>()?;

        Self::build(required_signs, map, false, network)
    }

    /// Group from the public halves of cosigner masters
    pub fn from_masters(
        required_signs: usize,
        masters: &[Master],
        network: &Network,
    ) -> Result<Self, MultisigError> {
        let keys = masters.iter().map(|master| {
            let public = ExtendedKey::Public(master.node().extended_key().to_public());
            (master.cosigner_index(), CosignerKey::Extended(public))
        });
        Self::new(required_signs, keys, network)
    }

    /// Parse a serialized group
    pub fn from_bip45(blob: &str, registry: &NetworkRegistry) -> Result<Self, MultisigError> {
        let payload = decode_check(blob.trim())?;
        let text = String::from_utf8(payload)
            .map_err(|_| MultisigError::ImportError("group payload is not text".to_string()))?;

        let mut fields = text.split(FIELD_SEPARATOR);
        let network_name = fields.next().unwrap_or_default();
        let network = registry.get(network_name)?.clone();

        let required_signs = fields
            .next()
            .filter(|m| is_canonical_decimal(m))
            .and_then(|m| m.parse::<usize>().ok())
            .ok_or_else(|| MultisigError::InvalidParams("Invalid m-of-n number".to_string()))?;

        let mut tagged = Vec::new();
        let mut untagged = Vec::new();
        for field in fields {
            match field.split_once(TAG_SEPARATOR) {
                Some((index, key)) => {
                    if !is_canonical_decimal(index) {
                        return Err(MultisigError::InvalidCosignerIndex(index.to_string()));
                    }
                    tagged.push((index.parse::<CosignerIndex>()?, CosignerKey::parse(key, registry)?))
                }
                None => untagged.push(CosignerKey::parse(field, registry)?),
            }
        }

        log::debug!(
            "Parsed {}-of-{} group for {}",
            required_signs,
            tagged.len() + untagged.len(),
            network.name
        );

        match (tagged.is_empty(), untagged.is_empty()) {
            (true, _) => Self::from_keys(required_signs, untagged, &network),
            (false, true) => Self::new(required_signs, tagged, &network),
            (false, false) => Err(MultisigError::ImportError(
                "group mixes tagged and untagged keys".to_string(),
            )),
        }
    }

    fn build(
        required_signs: usize,
        keys: BTreeMap<CosignerIndex, CosignerKey>,
        tagged: bool,
        network: &Network,
    ) -> Result<Self, MultisigError> {
        let mut seen = HashSet::new();
        if !keys.values().all(|key| seen.insert(key.public_key().serialize())) {
            return Err(MultisigError::InvalidParams(
                "Duplicate public key".to_string(),
            ));
        }

        let group = Self {
            required_signs,
            keys,
            tagged,
            network: network.clone(),
            cache: None,
        };
        group.validate()?;
        Ok(group)
    }

    fn validate(&self) -> Result<(), MultisigError> {
        let key_count = self.keys.len();
        let limit = MAX_COSIGNER as usize;

        if self.required_signs == 0 || self.required_signs > limit || key_count > limit {
            return Err(gap_limit());
        }
        if key_count < self.required_signs {
            return Err(MultisigError::InvalidParams(
                "Invalid m-of-n number".to_string(),
            ));
        }
        Ok(())
    }

    /// Cosigner indices and keys ordered by compressed key bytes
    fn sorted(&self) -> Vec<(CosignerIndex, &CosignerKey, PublicKey)> {
        let mut sorted: Vec<_> = self
            .keys
            .iter()
            .map(|(index, key)| (*index, key, key.public_key()))
            .collect();
        sorted.sort_by_key(|(_, _, public)| public.serialize());
        sorted
    }

    fn build_redeem_script(&self) -> Result<ScriptBuf, MultisigError> {
        let keys: Vec<PublicKey> = self.sorted().into_iter().map(|(_, _, key)| key).collect();
        Ok(multisig_script(self.required_signs, &keys)?)
    }

    /// P2SH address of the group on `network`
    ///
    /// Binds the group to `network`. The result is cached until the network
    /// changes in any parameter, not only its name.
    pub fn to_address(&mut self, network: &Network) -> Result<String, MultisigError> {
        self.validate()?;

        if let Some(cached) = &self.cache {
            if cached.network == *network {
                log::debug!("Address cache hit for {}", network.name);
                return Ok(cached.address.clone());
            }
        }

        self.network = network.clone();
        let redeem_script = self.build_redeem_script()?;
        let address = redeem_script.to_p2sh_address(network);
        self.cache = Some(Cached {
            network: network.clone(),
            address: address.clone(),
            redeem_script,
        });
        Ok(address)
    }

    /// Redeem script of the group
    pub fn redeem_script(&self, network: &Network) -> Result<ScriptBuf, MultisigError> {
        self.validate()?;

        match &self.cache {
            Some(cached) if cached.network == *network => Ok(cached.redeem_script.clone()),
            _ => self.build_redeem_script(),
        }
    }

    /// Serialize the group for `network`
    pub fn to_bip45(&self, network: &Network) -> Result<String, MultisigError> {
        self.validate()?;

        let mut fields = vec![network.name.clone(), self.required_signs.to_string()];
        for (index, key, _) in self.sorted() {
            let encoded = key.encode(network)?;
            fields.push(if self.tagged {
                format!("{}{}{}", index, TAG_SEPARATOR, encoded)
            } else {
                encoded
            });
        }

        let payload = fields.join(FIELD_SEPARATOR);
        Ok(encode_check(payload.as_bytes()))
    }

    /// Address using the group's own network
    pub fn address(&mut self) -> Result<String, MultisigError> {
        let network = self.network.clone();
        self.to_address(&network)
    }

    /// Serialized form using the group's own network
    pub fn bip45(&self) -> Result<String, MultisigError> {
        self.to_bip45(&self.network)
    }

    /// The group one level down at `(change, index)`
    ///
    /// Every cosigner derives along its own `45/{cosigner}/{change}/{index}`
    /// path; the resulting public keys form a new group with the same
    /// threshold, indices and network.
    pub fn node_for(&self, change: Change, index: u32) -> Result<Self, MultisigError> {
        let mut derived = BTreeMap::new();
        for (cosigner_index, key) in &self.keys {
            let extended = match key {
                CosignerKey::Extended(extended) => extended,
                CosignerKey::Raw(_) => {
                    return Err(MultisigError::InvalidParams(format!(
                        "cosigner {} has no extended key to derive from",
                        cosigner_index
                    )))
                }
            };

            let path = bip45_path(*cosigner_index, change, index, true)?;
            let child = extended.derive_path(&path)?;
            derived.insert(*cosigner_index, CosignerKey::Raw(child.public_key()));
        }

        log::debug!(
            "Derived {} group at {}/{}",
            self.description(),
            change,
            index
        );
        Self::build(self.required_signs, derived, self.tagged, &self.network)
    }

    pub fn required_signs(&self) -> usize {
        self.required_signs
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn set_network(&mut self, network: &Network) {
        if self.network != *network {
            self.cache = None;
        }
        self.network = network.clone();
    }

    pub fn is_tagged(&self) -> bool {
        self.tagged
    }

    /// Compressed public keys in hex, in redeem-script order
    pub fn public_keys_hex(&self) -> Vec<String> {
        self.sorted()
            .into_iter()
            .map(|(_, _, key)| hex::encode(key.serialize()))
            .collect()
    }

    /// Cosigner indices in redeem-script order
    pub fn cosigner_indices(&self) -> Vec<CosignerIndex> {
        self.sorted()
            .into_iter()
            .map(|(index, _, _)| index)
            .collect()
    }

    pub fn key(&self, index: CosignerIndex) -> Option<&CosignerKey> {
        self.keys.get(&index)
    }

    /// Get a human-readable description (e.g., "2-of-3")
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.required_signs, self.keys.len())
    }
}

fn gap_limit() -> MultisigError {
    MultisigError::InvalidParams("Address gap limit".to_string())
}

/// Plain decimal digits with no sign or leading zero, so every number has
/// exactly one spelling in a serialized group
fn is_canonical_decimal(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) && (s == "0" || !s.starts_with('0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    const K0_PRIV: &str = "EQQ8svTXQEEKbZ3WMbCHDKHvyCbDYzYmyNhLDJCKxo99rews4SfpiwNcXtJAk9zA4ayAUkwWDWaTg7x1k93ApgWE4mj1cFSzM2h7a168YMWtK5EL";
    const K0_PUB: &str = "EQQ8FQdegbPHJQV65Co3cjSaKDWHkcxMjVpP7Be4s7arc7N6ic955bidDZ7jbEboHm276YtdxZsMCtmpKijgSVAtgfD1ataV1YxY2rENT2ULMqMW";
    const K1_PUB: &str = "EQQ8FQemaGkPmahWfCHDFTMwsWCYaxNyJcUFtSKAbnc3ySVegGgionScLXkVG8Zirp8fXSywiMzn1DLwkV19CJKkjeikaZGv6DyV9JoH7g7idUM4";
    const K2_PUB: &str = "EQQ8FQdZkvRyJ7gVNTWBN1szP8YjrQUyD6wUrNrBjBhHR5mYQorg2GhgaMrmZy8FavBWpP5pzkQXLmAsCjvfYkciLBH9RXzzn62gpgVphHif9pvG";

    // cosigner nodes at 45/i/0/1 below K0 and K1
    const NODE0: &str = "0329753adb1e3e79dad360a1ff91e94c3871f2852af6e80cf97274e0c2cae7aea0";
    const NODE1: &str = "026f4a3cbe7bc62427a5ab1fc939674d1b7dfa4de0e1b41f5f3705f10499ceb07d";

    const ADDRESS_2OF2: &str = "cDt8j8qTSDmLgqXBvAqGyotSXiKpChiFEf";
    const REDEEM_2OF2: &str = "5221026f4a3cbe7bc62427a5ab1fc939674d1b7dfa4de0e1b41f5f3705f10499ceb07d210329753adb1e3e79dad360a1ff91e94c3871f2852af6e80cf97274e0c2cae7aea052ae";
    const UNTAGGED_BLOB: &str = "oVyvtw3qzSwskwn9txvNnYKH7Nn36GfjUFUHqRCamu8fxCFpXoa5NU5UmkuJWu2hfHywwH59WPw7gFhFjaxZ214NTLkRVyRZKPFJivDyBf3yFJ7cJiUtWwCMb1edBrA7K5UvvVAH8n8biDDPXHj1QDEqCzDsEyC83Y3rtErcbBKYS91NzkrUHsDwW38VfcFuji9hKYp1KToro9WQdUWB7hHvG";
    const TAGGED_BLOB: &str = "6FH6bFAVfMs75yFQttCzPs513w166JZ6XKXJutLY5d7yK6DpPMv9SCBUBRN24tSuNfYutoAia5ChGDsgZ4jNCeG1DJAeXptBPxaBpfLoJTSW6bMDgsMMQ2HSit1vKAXvkpcFKapUgcR1hiMt6nxcmydAGp4qCyURfKTyixnkKWgTxr2RXpHba6yYg3Mv4F64FxB8GAMeWuS4pZBjaSj7Tu6Gw29ftNv";
    const MASTERS_BLOB: &str = "2DhbqvYUoAPXA3Cp34dGRS8Mdvjauqx3zXf4KyGPnKZtr8bQNtkdTPgyWM7mYsAWo7hHFJw33ftzjqn6Nzs1VzfVmG1cUmgnPGyviU7S3aReR82MJX8Mn9v7fxZQLNEvaC4LvQeUgAB7EwLF8cV5xxAZ1cYZVBdVD3ieNNWESGLC7yGdLYVJyjJPnRBBNtrxjmV1UWQRywpVUbELvugosFBTidWfMUBAxzofhhL6xbfpeVBgHdvFoqHACy1dz5kux5VVK6naUy2PShMey2XDyqGWN4keqkhbEirdTUcNZDSG3e9hVUBMCbjyfxy3t9j5yh8PkWph5ip6oNBvcJzGCSZ9HLjif";

    fn net() -> Network {
        Network::thebestcoin_testnet()
    }

    fn raw(hex_key: &str) -> CosignerKey {
        CosignerKey::parse(hex_key, &NetworkRegistry::default()).unwrap()
    }

    fn index(i: u32) -> CosignerIndex {
        CosignerIndex::new(i).unwrap()
    }

    fn master_group(keys: &[&str]) -> Bip45Node {
        let registry = NetworkRegistry::default();
        let masters: Vec<Master> = keys
            .iter()
            .enumerate()
            .map(|(i, key)| Master::from_bip32(i, key, &registry).unwrap())
            .collect();
        Bip45Node::from_masters(2, &masters, &net()).unwrap()
    }

    #[test]
    fn test_address_from_raw_keys() {
        let mut group = Bip45Node::from_keys(2, vec![raw(NODE0), raw(NODE1)], &net()).unwrap();
        assert_eq!(group.to_address(&net()).unwrap(), ADDRESS_2OF2);
        assert_eq!(group.redeem_script(&net()).unwrap().to_hex_string(), REDEEM_2OF2);
        assert_eq!(group.description(), "2-of-2");
    }

    #[test]
    fn test_sort_invariance() {
        let mut a = Bip45Node::from_keys(2, vec![raw(NODE0), raw(NODE1)], &net()).unwrap();
        let mut b = Bip45Node::from_keys(2, vec![raw(NODE1), raw(NODE0)], &net()).unwrap();
        assert_eq!(a.to_address(&net()).unwrap(), b.to_address(&net()).unwrap());
        assert_eq!(a.to_bip45(&net()).unwrap(), b.to_bip45(&net()).unwrap());
        assert_eq!(a.public_keys_hex(), vec![NODE1.to_string(), NODE0.to_string()]);
    }

    #[test]
    fn test_untagged_indices_follow_sort_order() {
        let group = Bip45Node::from_keys(2, vec![raw(NODE0), raw(NODE1)], &net()).unwrap();
        assert_eq!(group.cosigner_indices(), vec![index(0), index(1)]);
        assert_eq!(group.key(index(0)), Some(&raw(NODE1)));
    }

    #[test]
    fn test_serialized_untagged() {
        let group = Bip45Node::from_keys(2, vec![raw(NODE0), raw(NODE1)], &net()).unwrap();
        assert_eq!(group.to_bip45(&net()).unwrap(), UNTAGGED_BLOB);
    }

    #[test]
    fn test_serialized_tagged() {
        let group = Bip45Node::new(
            2,
            vec![(index(0), raw(NODE0)), (index(1), raw(NODE1))],
            &net(),
        )
        .unwrap();
        assert_eq!(group.bip45().unwrap(), TAGGED_BLOB);
        assert_eq!(group.cosigner_indices(), vec![index(1), index(0)]);
    }

    #[test]
    fn test_round_trip() {
        let registry = NetworkRegistry::default();
        for blob in [UNTAGGED_BLOB, TAGGED_BLOB, MASTERS_BLOB] {
            let group = Bip45Node::from_bip45(blob, &registry).unwrap();
            assert_eq!(group.network().name, "thebestcoin_testnet");
            assert_eq!(group.to_bip45(&net()).unwrap(), blob);
        }

        let mut original = Bip45Node::from_keys(2, vec![raw(NODE0), raw(NODE1)], &net()).unwrap();
        let mut parsed = Bip45Node::from_bip45(UNTAGGED_BLOB, &registry).unwrap();
        assert_eq!(
            parsed.to_address(&net()).unwrap(),
            original.to_address(&net()).unwrap()
        );
        assert_eq!(
            parsed.redeem_script(&net()).unwrap(),
            original.redeem_script(&net()).unwrap()
        );
        assert_eq!(parsed.required_signs(), 2);
    }

    #[test]
    fn test_master_group() {
        let mut group = master_group(&[K0_PUB, K1_PUB]);
        assert!(group.is_tagged());
        assert_eq!(group.bip45().unwrap(), MASTERS_BLOB);
        assert_eq!(
            group.redeem_script(&net()).unwrap().to_hex_string(),
            "522102e44fd5679fd7ca2e97bc3817dc32ecd1255a2d742148c7ce8d34400e0506a8a321036e400cec6cdf35b34db6d629185c6ee91a75a9c03c828ccbe76e0117fe87713452ae"
        );
        assert_eq!(group.address().unwrap(), "cAkBqJVFm4iiMkHZBMP6qDR3k3vV99r43S");
    }

    #[test]
    fn test_private_master_serializes_public() {
        let private = master_group(&[K0_PRIV, K1_PUB]);
        let public = master_group(&[K0_PUB, K1_PUB]);
        assert_eq!(private.bip45().unwrap(), public.bip45().unwrap());
    }

    #[test]
    fn test_node_for_matches_cosigner_nodes() {
        let group = master_group(&[K0_PUB, K1_PUB]);

        let mut derived = group.node_for(Change::Receive, 1).unwrap();
        assert_eq!(derived.address().unwrap(), ADDRESS_2OF2);
        assert_eq!(derived.cosigner_indices(), vec![index(1), index(0)]);
        assert_eq!(derived.required_signs(), 2);
        assert!(derived.is_tagged());

        let mut change = group.node_for(Change::Change, 1).unwrap();
        assert_eq!(change.address().unwrap(), "c5YuFVQXizuhghWLgkSXW6Jzj423sgiwVQ");

        let mut first = group.node_for(Change::Receive, 0).unwrap();
        assert_eq!(first.address().unwrap(), "cPgjwc8B2s8aLmgU4hTbuHppZwW4A6AVet");
    }

    #[test]
    fn test_node_for_two_of_three() {
        let registry = NetworkRegistry::default();
        let masters: Vec<Master> = [K0_PUB, K1_PUB, K2_PUB]
            .iter()
            .enumerate()
            .map(|(i, key)| Master::from_bip32(i, key, &registry).unwrap())
            .collect();
        let group = Bip45Node::from_masters(2, &masters, &net()).unwrap();

        let mut derived = group.node_for(Change::Receive, 1).unwrap();
        assert_eq!(derived.description(), "2-of-3");
        assert_eq!(derived.address().unwrap(), "cAKPaA4BC143fEbRfmmGsc664zJMyYBMFJ");

        let mut derived = group.node_for(Change::Change, 1).unwrap();
        assert_eq!(derived.address().unwrap(), "cNMQu2mkA4iKrAUgEhieCm6RFrkmvz4BPd");
    }

    #[test]
    fn test_node_for_requires_extended_keys() {
        let group = Bip45Node::from_keys(2, vec![raw(NODE0), raw(NODE1)], &net()).unwrap();
        assert!(matches!(
            group.node_for(Change::Receive, 0),
            Err(MultisigError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_threshold_bounds() {
        let keys = || vec![raw(NODE0), raw(NODE1)];
        assert_eq!(
            Bip45Node::from_keys(0, keys(), &net()).unwrap_err(),
            MultisigError::InvalidParams("Address gap limit".to_string())
        );
        assert_eq!(
            Bip45Node::from_keys(3, keys(), &net()).unwrap_err(),
            MultisigError::InvalidParams("Invalid m-of-n number".to_string())
        );
        assert!(Bip45Node::from_keys(1, keys(), &net()).is_ok());
    }

    #[test]
    fn test_key_count_limit() {
        let keys: Vec<CosignerKey> = (0..21)
            .map(|_| CosignerKey::Raw(KeyPair::generate().public_key))
            .collect();
        assert_eq!(
            Bip45Node::from_keys(2, keys.clone(), &net()).unwrap_err(),
            MultisigError::InvalidParams("Address gap limit".to_string())
        );

        let mut group = Bip45Node::from_keys(20, keys[..20].to_vec(), &net()).unwrap();
        assert!(group.to_address(&net()).is_ok());
    }

    #[test]
    fn test_duplicates_rejected() {
        assert!(matches!(
            Bip45Node::from_keys(2, vec![raw(NODE0), raw(NODE0)], &net()),
            Err(MultisigError::InvalidParams(_))
        ));
        assert!(matches!(
            Bip45Node::new(2, vec![(index(0), raw(NODE0)), (index(0), raw(NODE1))], &net()),
            Err(MultisigError::InvalidCosignerIndex(_))
        ));
    }

    #[test]
    fn test_key_parsing_errors() {
        let registry = NetworkRegistry::default();

        assert!(matches!(
            CosignerKey::parse("not a key!", &registry),
            Err(MultisigError::KeyFormatNotFound(_))
        ));

        // right length, not a curve point
        let off_curve = format!("05{}", "00".repeat(32));
        assert!(matches!(
            CosignerKey::parse(&off_curve, &registry),
            Err(MultisigError::KeyFormatNotFound(_))
        ));

        let mut corrupted = K1_PUB.to_string();
        corrupted.pop();
        corrupted.push('X');
        assert_eq!(
            CosignerKey::parse(&corrupted, &registry),
            Err(MultisigError::ChecksumError)
        );

        // well-formed base58check, wrong length for an extended key
        assert!(matches!(
            CosignerKey::parse("1111111111111111111114oLvT2", &registry),
            Err(MultisigError::ImportError(_))
        ));
    }

    #[test]
    fn test_from_bip45_errors() {
        let registry = NetworkRegistry::default();

        let mut corrupted = TAGGED_BLOB.to_string();
        corrupted.pop();
        corrupted.push('1');
        assert_eq!(
            Bip45Node::from_bip45(&corrupted, &registry).unwrap_err(),
            MultisigError::ChecksumError
        );

        let unknown = encode_check(format!("dogecoin;2;{};{}", NODE1, NODE0).as_bytes());
        assert_eq!(
            Bip45Node::from_bip45(&unknown, &registry).unwrap_err(),
            MultisigError::NetworkNotFound("dogecoin".to_string())
        );

        let mixed = encode_check(
            format!("thebestcoin_testnet;2;0:{};{}", NODE1, NODE0).as_bytes(),
        );
        assert!(matches!(
            Bip45Node::from_bip45(&mixed, &registry),
            Err(MultisigError::ImportError(_))
        ));

        let bad_tag = encode_check(
            format!("thebestcoin_testnet;2;0:{};0:{}", NODE1, NODE0).as_bytes(),
        );
        assert!(matches!(
            Bip45Node::from_bip45(&bad_tag, &registry),
            Err(MultisigError::InvalidCosignerIndex(_))
        ));

        let bad_threshold = encode_check(
            format!("thebestcoin_testnet;0;{};{}", NODE1, NODE0).as_bytes(),
        );
        assert!(matches!(
            Bip45Node::from_bip45(&bad_threshold, &registry),
            Err(MultisigError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_address_cache_follows_network() {
        let mut group = Bip45Node::from_keys(2, vec![raw(NODE0), raw(NODE1)], &net()).unwrap();
        assert_eq!(group.to_address(&net()).unwrap(), ADDRESS_2OF2);
        assert_eq!(group.to_address(&net()).unwrap(), ADDRESS_2OF2);

        let bitcoin = Network::bitcoin();
        assert_eq!(
            group.to_address(&bitcoin).unwrap(),
            "3EAfzEPqDRmVdJ65umX9DXZvvMCTyw2EaB"
        );
        assert_eq!(group.network().name, "bitcoin");

        group.set_network(&net());
        assert_eq!(group.address().unwrap(), ADDRESS_2OF2);
    }

    #[test]
    fn test_address_cache_compares_whole_network() {
        let mut group = Bip45Node::from_keys(2, vec![raw(NODE0), raw(NODE1)], &net()).unwrap();
        assert_eq!(
            group.to_address(&Network::bitcoin()).unwrap(),
            "3EAfzEPqDRmVdJ65umX9DXZvvMCTyw2EaB"
        );

        // same name as the cached network, different version bytes
        let renamed = Network {
            name: "bitcoin".to_string(),
            ..net()
        };
        assert_eq!(renamed.p2sh_version, 0x57);
        assert_eq!(group.to_address(&renamed).unwrap(), ADDRESS_2OF2);
        assert_eq!(
            group.redeem_script(&renamed).unwrap().to_hex_string(),
            REDEEM_2OF2
        );
    }

    #[test]
    fn test_from_bip45_rejects_non_canonical_numbers() {
        let registry = NetworkRegistry::default();
        let blob = |payload: String| encode_check(payload.as_bytes());

        for m in ["+2", "02", " 2", ""] {
            let encoded = blob(format!("thebestcoin_testnet;{};{};{}", m, NODE1, NODE0));
            assert_eq!(
                Bip45Node::from_bip45(&encoded, &registry).unwrap_err(),
                MultisigError::InvalidParams("Invalid m-of-n number".to_string())
            );
        }

        for tag in ["00", "+1", "01", "-0", ""] {
            let encoded = blob(format!(
                "thebestcoin_testnet;2;{}:{};1:{}",
                tag, NODE1, NODE0
            ));
            assert!(matches!(
                Bip45Node::from_bip45(&encoded, &registry),
                Err(MultisigError::InvalidCosignerIndex(_))
            ));
        }

        let canonical = blob(format!("thebestcoin_testnet;2;0:{};1:{}", NODE1, NODE0));
        assert!(Bip45Node::from_bip45(&canonical, &registry).is_ok());
    }

    #[test]
    fn test_canonical_decimal() {
        assert!(is_canonical_decimal("0"));
        assert!(is_canonical_decimal("19"));
        assert!(!is_canonical_decimal("00"));
        assert!(!is_canonical_decimal("+2"));
        assert!(!is_canonical_decimal("1_0"));
    }

    #[test]
    fn test_serialization_uses_requested_network() {
        let registry = NetworkRegistry::default();
        let group = master_group(&[K0_PUB, K1_PUB]);
        let blob = group.to_bip45(&Network::bitcoin()).unwrap();

        let parsed = Bip45Node::from_bip45(&blob, &registry).unwrap();
        assert_eq!(parsed.network().name, "bitcoin");
        match parsed.key(index(0)) {
            Some(CosignerKey::Extended(key)) => assert!(key
                .to_bip32(KeyKind::Public, &Network::bitcoin())
                .unwrap()
                .starts_with("xpub")),
            other => panic!("unexpected key {:?}", other),
        }
    }
}
