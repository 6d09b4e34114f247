//! Multisig Money Tree: BIP45 hierarchical deterministic multisig in Rust
//!
//! This crate provides the pieces cosigners need to run an M-of-N wallet:
//! - Named chain parameters with a registry and an explicit default
//! - BIP32 extended keys, WIF and P2PKH encodings (secp256k1)
//! - Cosigner masters and nodes along `m/45/{cosigner}/{change}/{index}`
//! - P2SH multisig groups and their compact serialized form
//! - Staged co-signing of legacy transactions
//! - JSON persistence of seeded groups
//!
//! # Example
//!
//! ```rust
//! use multisig_money_tree::multisig::{Bip45Node, CosignerKey};
//! use multisig_money_tree::network::NetworkRegistry;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = NetworkRegistry::default();
//! let keys = [
//!     "02756ae892ade64b6ae84294a6e7a8c58afeb37a1687fa56bac5793cd170ae5044",
//!     "02f02ea3debd18419d6612643f31dbcc425d906c81817047071152cb5a69d6fffa",
//! ]
//! .iter()
//! .map(|key| CosignerKey::parse(key, &registry))
//! .collect::<Result<Vec<_>, _>>()?;
//!
//! // 2-of-2 group on the default network
//! let mut group = Bip45Node::from_keys(2, keys, registry.current())?;
//! assert_eq!(group.address()?, "3LM3NxeSbP1CCggPv9jJsDTL19ZEsTcJ8X");
//!
//! // Hand the group to the other cosigner
//! let blob = group.bip45()?;
//! let shared = Bip45Node::from_bip45(&blob, &registry)?;
//! assert_eq!(shared.public_keys_hex(), group.public_keys_hex());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod core;
pub mod crypto;
pub mod multisig;
pub mod network;
pub mod storage;

// Re-export commonly used types
pub use bitcoin;
pub use core::{DecodedTransaction, MultisigScriptExt};
pub use crypto::{ExtendedKey, HdKey, KeyKind, KeyPair};
pub use multisig::{
    Bip45Node, Change, CosignerIndex, CosignerKey, Master, MultisigError, Node, TransactionSigner,
};
pub use network::{Network, NetworkRegistry};
pub use storage::{Storage, StorageConfig, WalletFile};
