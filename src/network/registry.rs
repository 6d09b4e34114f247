//! Network registry
//!
//! A lookup table of [`Network`] parameters plus an explicit default. The
//! registry is an ordinary value: callers pass the `&Network` they resolved
//! into every operation that depends on version bytes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

use super::params::Network;
use crate::crypto::bip32::KeyKind;

/// Name of the default network of a fresh registry
pub const DEFAULT_NETWORK: &str = "bitcoin";

/// Registry errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("{0} is not a valid network!")]
    NotFound(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid network configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

/// Named chain parameters with one explicit default
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    networks: BTreeMap<String, Network>,
    current: String,
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        let networks = Network::builtin()
            .into_iter()
            .map(|n| (n.name.clone(), n))
            .collect();

        Self {
            networks,
            current: DEFAULT_NETWORK.to_string(),
        }
    }
}

impl NetworkRegistry {
    /// Registry holding the built-in networks, defaulting to bitcoin
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in networks plus the JSON array of networks in `path`
    pub fn load_file(path: &Path) -> Result<Self, NetworkError> {
        let data = fs::read_to_string(path)?;
        let networks: Vec<Network> = serde_json::from_str(&data)?;

        let mut registry = Self::default();
        for network in networks {
            registry.register(network);
        }
        Ok(registry)
    }

    /// Add or replace a network
    pub fn register(&mut self, network: Network) {
        log::debug!("Registering network {}", network.name);
        self.networks.insert(network.name.clone(), network);
    }

    /// Look up a network by name
    pub fn get(&self, name: &str) -> Result<&Network, NetworkError> {
        self.networks
            .get(name)
            .ok_or_else(|| NetworkError::NotFound(name.to_string()))
    }

    /// Check whether a network is registered
    pub fn contains(&self, name: &str) -> bool {
        self.networks.contains_key(name)
    }

    /// Select the default network
    pub fn set_current(&mut self, name: &str) -> Result<&Network, NetworkError> {
        if !self.networks.contains_key(name) {
            return Err(NetworkError::NotFound(name.to_string()));
        }
        self.current = name.to_string();
        self.get(name)
    }

    /// The default network
    pub fn current(&self) -> &Network {
        // set_current only accepts registered names and nothing unregisters
        &self.networks[&self.current]
    }

    /// Registered network names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.networks.keys().map(String::as_str).collect()
    }

    /// All registered networks, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    /// Find the network whose extended key version matches `version`
    ///
    /// Aliases share version bytes; the default network wins a tie, then the
    /// first name in sorted order.
    pub fn find_by_extended_version(&self, version: [u8; 4]) -> Option<(&Network, KeyKind)> {
        let matches = |n: &Network| {
            if n.extended_privkey_version == version {
                Some(KeyKind::Private)
            } else if n.extended_pubkey_version == version {
                Some(KeyKind::Public)
            } else {
                None
            }
        };

        let current = self.current();
        if let Some(kind) = matches(current) {
            return Some((current, kind));
        }

        self.networks
            .values()
            .find_map(|n| matches(n).map(|kind| (n, kind)))
    }
}
