//! Cryptographic utilities
//!
//! This module provides:
//! - SHA-256 and HASH160 hashing
//! - Base58check encoding
//! - ECDSA key management (secp256k1) with WIF and P2PKH encodings
//! - BIP32 extended keys and derivation paths over `bitcoin::bip32`

pub mod base58;
pub mod bip32;
pub mod hash;
pub mod keys;

pub use base58::{decode_check, encode_check, Base58Error};
pub use bip32::{
    Bip32Error, DerivationPath, ExtendedKey, ExtendedPrivKey, ExtendedPubKey, HdKey, KeyKind,
    HARDENED_OFFSET,
};
pub use hash::{double_sha256, double_sha256_hex, hash160, sha256};
pub use keys::{
    public_key_from_hex, public_key_to_address, sign_digest, verify_signature, KeyError, KeyPair,
};
