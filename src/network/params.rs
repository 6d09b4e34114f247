//! Chain parameters
//!
//! Version bytes and prefixes that the key and address encoders need for one
//! chain. Version bytes serialize as hex strings so configuration files read
//! the same way block explorers print them.

use serde::{Deserialize, Serialize};

/// Chain parameters for one named network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Registry name, also written into serialized group keys
    pub name: String,
    /// P2PKH address version byte
    #[serde(with = "hex_u8")]
    pub address_version: u8,
    /// P2SH address version byte
    #[serde(with = "hex_u8")]
    pub p2sh_version: u8,
    /// Leading character of P2SH addresses
    pub p2sh_char: char,
    /// WIF version byte
    #[serde(with = "hex_u8")]
    pub privkey_version: u8,
    /// Suffix marking a WIF key as compressed
    #[serde(with = "hex_u8")]
    pub privkey_compression_flag: u8,
    /// BIP32 extended private key version
    #[serde(with = "hex_u32")]
    pub extended_privkey_version: [u8; 4],
    /// BIP32 extended public key version
    #[serde(with = "hex_u32")]
    pub extended_pubkey_version: [u8; 4],
    /// Leading characters of compressed WIF keys
    pub compressed_wif_chars: Vec<char>,
    /// Leading characters of uncompressed WIF keys
    pub uncompressed_wif_chars: Vec<char>,
    /// P2P protocol version
    pub protocol_version: u32,
}

impl Network {
    /// Bitcoin mainnet
    pub fn bitcoin() -> Self {
        Self {
            name: "bitcoin".to_string(),
            address_version: 0x00,
            p2sh_version: 0x05,
            p2sh_char: '3',
            privkey_version: 0x80,
            privkey_compression_flag: 0x01,
            extended_privkey_version: [0x04, 0x88, 0xad, 0xe4],
            extended_pubkey_version: [0x04, 0x88, 0xb2, 0x1e],
            compressed_wif_chars: vec!['K', 'L'],
            uncompressed_wif_chars: vec!['5'],
            protocol_version: 70001,
        }
    }

    /// Bitcoin testnet3
    pub fn testnet() -> Self {
        Self {
            name: "testnet".to_string(),
            address_version: 0x6f,
            p2sh_version: 0xc4,
            p2sh_char: '2',
            privkey_version: 0xef,
            privkey_compression_flag: 0x01,
            extended_privkey_version: [0x04, 0x35, 0x83, 0x94],
            extended_pubkey_version: [0x04, 0x35, 0x87, 0xcf],
            compressed_wif_chars: vec!['c'],
            uncompressed_wif_chars: vec!['9'],
            protocol_version: 70001,
        }
    }

    /// Bitcoin regtest, sharing testnet encodings
    pub fn regtest() -> Self {
        Self {
            name: "regtest".to_string(),
            ..Self::testnet()
        }
    }

    /// TheBestCoin mainnet
    pub fn thebestcoin() -> Self {
        Self {
            name: "thebestcoin".to_string(),
            address_version: 0x0f,
            p2sh_version: 0x12,
            p2sh_char: '8',
            privkey_version: 0x60,
            privkey_compression_flag: 0x01,
            extended_privkey_version: [0x05, 0xad, 0xc3, 0xa6],
            extended_pubkey_version: [0x05, 0xad, 0xb5, 0x2c],
            compressed_wif_chars: vec!['c'],
            uncompressed_wif_chars: vec!['G'],
            protocol_version: 70015,
        }
    }

    /// TheBestCoin testnet
    pub fn thebestcoin_testnet() -> Self {
        Self {
            name: "thebestcoin_testnet".to_string(),
            address_version: 0x55,
            p2sh_version: 0x57,
            p2sh_char: 'c',
            privkey_version: 0x1a,
            privkey_compression_flag: 0x01,
            extended_privkey_version: [0x3f, 0x23, 0x26, 0x3a],
            extended_pubkey_version: [0x3f, 0x23, 0x25, 0x3b],
            compressed_wif_chars: vec!['c'],
            uncompressed_wif_chars: vec!['B'],
            protocol_version: 70015,
        }
    }

    /// Copy of these parameters registered under another name
    pub fn renamed(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }

    /// Every network available without configuration
    pub fn builtin() -> Vec<Self> {
        let testnet = Self::testnet();
        vec![
            Self::bitcoin(),
            testnet.renamed("bitcoin_testnet"),
            testnet,
            Self::regtest(),
            Self::thebestcoin(),
            Self::thebestcoin_testnet(),
        ]
    }
}

mod hex_u8 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u8, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode([*value]))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        match bytes.as_slice() {
            [byte] => Ok(*byte),
            _ => Err(D::Error::custom(format!("expected one hex byte, got {:?}", s))),
        }
    }
}

mod hex_u32 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8; 4], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 4], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        <[u8; 4]>::try_from(bytes.as_slice())
            .map_err(|_| D::Error::custom(format!("expected four hex bytes, got {:?}", s)))
    }
}
