//! CLI commands for multisig cosigners
//!
//! Implements all command handlers for the CLI interface.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::DecodedTransaction;
use crate::crypto::KeyKind;
use crate::multisig::{Bip45Node, Change, Master, Node, TransactionSigner};
use crate::network::{Network, NetworkRegistry};
use crate::storage::{AddressRecord, CosignerRecord, Storage, StorageConfig, WalletFile};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
pub struct AppState {
    pub registry: NetworkRegistry,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Build the registry, optionally extended from a networks file, and
    /// select the default network
    pub fn new(
        data_dir: PathBuf,
        networks_file: Option<&Path>,
        network: Option<&str>,
    ) -> CliResult<Self> {
        let mut registry = match networks_file {
            Some(path) => NetworkRegistry::load_file(path)?,
            None => NetworkRegistry::default(),
        };

        if let Some(name) = network {
            registry.set_current(name)?;
        }

        Ok(Self { registry, data_dir })
    }

    /// The selected network
    pub fn network(&self) -> &Network {
        self.registry.current()
    }

    /// Storage rooted at the data directory
    pub fn storage(&self) -> CliResult<Storage> {
        let config = StorageConfig {
            data_dir: self.data_dir.clone(),
            ..Default::default()
        };
        Ok(Storage::new(config)?)
    }
}

/// List registered networks
pub fn cmd_networks(state: &AppState) -> CliResult<()> {
    let current = &state.network().name;

    println!("🌐 Networks:");
    for network in state.registry.iter() {
        let marker = if &network.name == current { "*" } else { " " };
        println!(
            "  {} {} (p2sh '{}', protocol {})",
            marker, network.name, network.p2sh_char, network.protocol_version
        );
    }

    Ok(())
}

/// Seed cosigner masters, build their group and save it
pub fn cmd_seed(state: &AppState, cosigners: u32, required: usize, count: u32) -> CliResult<()> {
    let network = state.network();

    println!(
        "🔑 Seeding {} cosigner master(s) on {}...",
        cosigners, network.name
    );
    let masters = (0..cosigners)
        .map(|index| Master::seed(index, network))
        .collect::<Result<Vec<_>, _>>()?;

    let group = Bip45Node::from_masters(required, &masters, network)?;
    let blob = group.to_bip45(network)?;

    let mut wallet = WalletFile::new(&network.name, required, blob.clone());
    for master in &masters {
        wallet.cosigners.push(CosignerRecord {
            index: master.cosigner_index(),
            public: master.export(KeyKind::Public)?,
            private: Some(master.export(KeyKind::Private)?),
        });
    }

    for index in 0..count {
        let mut node = group.node_for(Change::Receive, index)?;
        let address = node.to_address(network)?;
        let redeem_script = node.redeem_script(network)?.to_hex_string();
        wallet.addresses.push(AddressRecord {
            change: Change::Receive,
            index,
            address,
            redeem_script,
        });
    }

    let storage = state.storage()?;
    storage.save(&wallet)?;

    println!("✅ Group {}", group.description());
    println!("   BIP45: {}", blob);
    for cosigner in &wallet.cosigners {
        println!("   Cosigner {}: {}", cosigner.index, cosigner.public);
    }
    for record in &wallet.addresses {
        println!("   📬 {}/{}: {}", record.change.value(), record.index, record.address);
    }
    println!("💾 Saved to {}", storage.wallet_path().display());

    Ok(())
}

/// Describe a serialized group
pub fn cmd_inspect(state: &AppState, bip45: &str) -> CliResult<()> {
    let mut group = Bip45Node::from_bip45(bip45, &state.registry)?;
    let network = group.network().clone();

    println!("📋 Group {}", group.description());
    println!("   Network: {}", network.name);
    println!(
        "   Threshold: {} of {}",
        group.required_signs(),
        group.key_count()
    );
    for (index, key) in group.cosigner_indices().iter().zip(group.public_keys_hex()) {
        println!("   Cosigner {}: {}", index, key);
    }
    println!("   Redeem script: {}", group.redeem_script(&network)?.to_hex_string());
    println!("   Address: {}", group.to_address(&network)?);

    Ok(())
}

/// Derive a group address
pub fn cmd_address(state: &AppState, bip45: &str, change: bool, index: u32) -> CliResult<()> {
    let group = Bip45Node::from_bip45(bip45, &state.registry)?;
    let network = group.network().clone();
    let change = Change::from(change);

    let mut node = group.node_for(change, index)?;
    println!("📬 {}/{}: {}", change.value(), index, node.to_address(&network)?);
    println!("   Redeem script: {}", node.redeem_script(&network)?.to_hex_string());

    Ok(())
}

/// Derive one cosigner node
pub fn cmd_derive(
    state: &AppState,
    key: &str,
    cosigner: u32,
    change: bool,
    index: u32,
) -> CliResult<()> {
    let master = Master::from_bip32(cosigner, key, &state.registry)?;
    let network = master.network().clone();
    let node: Node = master.node_for(Change::from(change), index)?;

    println!(
        "🔑 m/45/{}/{}/{} on {}",
        master.cosigner_index(),
        Change::from(change).value(),
        index,
        network.name
    );
    println!("   Public key: {}", node.public_key_hex());
    println!("   Address: {}", node.to_address(&network));
    if node.is_private() {
        println!("   WIF: {}", node.to_wif(&network)?);
    }

    Ok(())
}

/// Sign the multisig inputs of a decoded transaction
pub fn cmd_sign(
    state: &AppState,
    tx_path: &Path,
    key: &str,
    cosigner: u32,
    out: Option<&Path>,
) -> CliResult<()> {
    let data = fs::read_to_string(tx_path)?;
    let mut decoded: DecodedTransaction = serde_json::from_str(&data)?;

    let mut signer =
        TransactionSigner::load(&decoded, key, cosigner, state.network(), &state.registry)?;
    println!(
        "✍️  Cosigner {} signing {} input(s)...",
        signer.cosigner_index(),
        signer.staged_count()
    );

    let hex = signer.sign_inputs()?;

    if let Some(out) = out {
        decoded.apply_script_sigs(signer.transaction())?;
        fs::write(out, serde_json::to_string_pretty(&decoded)?)?;
        println!("💾 Updated transaction written to {}", out.display());
    }

    println!("✅ Signed transaction:");
    println!("{}", hex);

    Ok(())
}
