//! Chain parameters and the registry they are looked up in
//!
//! Every key, address and group-key encoding is parameterized by a
//! [`Network`]. The [`NetworkRegistry`] resolves names to parameters and
//! carries the default used when the caller does not pick one.

pub mod params;
pub mod registry;

pub use params::Network;
pub use registry::{NetworkError, NetworkRegistry, DEFAULT_NETWORK};
