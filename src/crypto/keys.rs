//! ECDSA key management
//!
//! Provides key pairs on the secp256k1 curve, network-aware WIF and P2PKH
//! encodings, and DER signatures as they appear in Bitcoin script-sigs.

use std::fmt;

use rand::rngs::OsRng;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

use super::base58::{decode_check, encode_check, Base58Error};
use super::hash::hash160;
use crate::network::Network;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid WIF: {0}")]
    InvalidWif(String),
    #[error("Base58 error: {0}")]
    Base58Error(#[from] Base58Error),
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Import a WIF private key encoded for `network`
    pub fn from_wif(wif: &str, network: &Network) -> Result<Self, KeyError> {
        let payload = decode_check(wif)?;

        let (version, rest) = payload
            .split_first()
            .ok_or_else(|| KeyError::InvalidWif("empty payload".to_string()))?;
        if *version != network.privkey_version {
            return Err(KeyError::InvalidWif(format!(
                "version {:02x} does not belong to {}",
                version, network.name
            )));
        }

        let key_bytes = match rest.len() {
            32 => rest,
            33 if rest[32] == network.privkey_compression_flag => &rest[..32],
            len => return Err(KeyError::InvalidWif(format!("unexpected length {}", len))),
        };

        let secret_key =
            SecretKey::from_slice(key_bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Export the private key as compressed WIF for `network`
    pub fn to_wif(&self, network: &Network) -> String {
        let mut payload = Vec::with_capacity(34);
        payload.push(network.privkey_version);
        payload.extend_from_slice(&self.secret_key.secret_bytes());
        payload.push(network.privkey_compression_flag);
        encode_check(&payload)
    }

    /// Get the public key as a hex string (compressed format)
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// P2PKH address of the compressed public key on `network`
    pub fn address(&self, network: &Network) -> String {
        public_key_to_address(&self.public_key, network)
    }

    /// Sign a 32-byte digest, returning a DER signature
    pub fn sign(&self, digest: &[u8; 32]) -> Vec<u8> {
        sign_digest(&self.secret_key, digest)
    }

    /// Verify a DER signature against this key pair's public key
    pub fn verify(&self, digest: &[u8; 32], signature: &[u8]) -> Result<bool, KeyError> {
        verify_signature(&self.public_key, digest, signature)
    }
}

/// Convert a public key to a P2PKH address
pub fn public_key_to_address(public_key: &PublicKey, network: &Network) -> String {
    let mut payload = vec![network.address_version];
    payload.extend_from_slice(&hash160(&public_key.serialize()));
    encode_check(&payload)
}

/// Parse a public key from hex string
pub fn public_key_from_hex(hex_key: &str) -> Result<PublicKey, KeyError> {
    let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPublicKey)?;
    PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

/// Sign a digest with a secret key (RFC6979 nonce, low-S, DER encoded)
pub fn sign_digest(secret_key: &SecretKey, digest: &[u8; 32]) -> Vec<u8> {
    let secp = Secp256k1::new();
    let message = Message::from_digest(*digest);
    let signature = secp.sign_ecdsa(&message, secret_key);
    signature.serialize_der().to_vec()
}

/// Verify a DER signature against a public key
///
/// High-S signatures produced by other software are normalized first, so the
/// check answers "did this key sign this digest" rather than enforcing
/// relay policy.
pub fn verify_signature(
    public_key: &PublicKey,
    digest: &[u8; 32],
    signature: &[u8],
) -> Result<bool, KeyError> {
    let secp = Secp256k1::new();
    let message = Message::from_digest(*digest);

    let mut sig = Signature::from_der_lax(signature).map_err(|_| KeyError::InvalidSignature)?;
    sig.normalize_s();

    Ok(secp.verify_ecdsa(&message, &sig, public_key).is_ok())
}
