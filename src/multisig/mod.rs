//! BIP45 multisig coordination
//!
//! Cosigners derive keys along `m/45/{cosigner}/{change}/{index}`, aggregate
//! their public keys into an M-of-N P2SH group, exchange the group as a
//! compact serialized blob, and co-sign spends across independent sessions.
//!
//! # Example
//!
//! ```ignore
//! use multisig_money_tree::multisig::{Bip45Node, Change, Master};
//! use multisig_money_tree::network::NetworkRegistry;
//!
//! let registry = NetworkRegistry::default();
//! let masters = vec![
//!     Master::from_bip32(0u32, cosigner0_xpub, &registry)?,
//!     Master::from_bip32(1u32, cosigner1_xpub, &registry)?,
//! ];
//!
//! // 2-of-2 group, shared with the other cosigner as a blob
//! let group = Bip45Node::from_masters(2, &masters, registry.current())?;
//! let blob = group.bip45()?;
//!
//! // First receive address of the group
//! let mut first = group.node_for(Change::Receive, 0)?;
//! println!("{}", first.address()?);
//! ```

pub mod error;
pub mod group;
pub mod master;
pub mod node;
pub mod transaction;

pub use error::MultisigError;
pub use group::{Bip45Node, CosignerKey};
pub use master::Master;
pub use node::{Change, CosignerIndex, Node, BIP45_PURPOSE, MAX_COSIGNER};
pub use transaction::{MultisigInput, SessionState, TransactionSigner};
