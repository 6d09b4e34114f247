//! Base58check encoding
//!
//! Thin layer over `bitcoin::base58` that keeps a bad checksum distinct from
//! a malformed string so callers can report the two differently.

use bitcoin::base58;
use thiserror::Error;

/// Errors from base58check decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Base58Error {
    #[error("Invalid base58 string: {0}")]
    InvalidEncoding(String),
    #[error("Base58 payload too short: {0} bytes")]
    TooShort(usize),
    #[error("Invalid checksum")]
    InvalidChecksum,
}

impl From<base58::Error> for Base58Error {
    fn from(err: base58::Error) -> Self {
        match err {
            base58::Error::IncorrectChecksum(_) => Base58Error::InvalidChecksum,
            base58::Error::TooShort(e) => Base58Error::TooShort(e.invalid_base58_length()),
            other => Base58Error::InvalidEncoding(other.to_string()),
        }
    }
}

/// Encode `payload` with a trailing checksum
pub fn encode_check(payload: &[u8]) -> String {
    base58::encode_check(payload)
}

/// Decode a base58check string, returning the payload without its checksum
pub fn decode_check(encoded: &str) -> Result<Vec<u8>, Base58Error> {
    Ok(base58::decode_check(encoded)?)
}

/// True when every character belongs to the base58 alphabet
pub fn is_base58(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() && !matches!(b, b'0' | b'O' | b'I' | b'l'))
}
