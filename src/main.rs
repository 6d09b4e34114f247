//! Multisig Money Tree CLI Application
//!
//! A command-line interface for BIP45 multisig cosigners.

use clap::{Parser, Subcommand};
use multisig_money_tree::cli::{self, AppState};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "multisig-tree")]
#[command(version = "0.1.0")]
#[command(about = "BIP45 hierarchical deterministic M-of-N multisig", long_about = None)]
struct Cli {
    /// Data directory for wallet storage
    #[arg(short, long, default_value = ".multisig_data")]
    data_dir: PathBuf,

    /// Network to use (defaults to bitcoin)
    #[arg(short, long, global = true)]
    network: Option<String>,

    /// JSON file with additional network definitions
    #[arg(long, global = true)]
    networks: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered networks
    Networks,

    /// Seed cosigner masters and record their group
    Seed {
        /// Number of cosigners
        #[arg(long, default_value = "2")]
        cosigners: u32,

        /// Signatures required to spend
        #[arg(short, long, default_value = "2")]
        required: usize,

        /// Number of receive addresses to derive
        #[arg(short, long, default_value = "1")]
        count: u32,
    },

    /// Describe a serialized group
    Inspect {
        /// Serialized BIP45 group
        #[arg(short, long)]
        bip45: String,
    },

    /// Derive a group address
    Address {
        /// Serialized BIP45 group
        #[arg(short, long)]
        bip45: String,

        /// Derive on the change branch
        #[arg(long)]
        change: bool,

        /// Address index
        #[arg(short, long)]
        index: u32,
    },

    /// Derive a cosigner node from its master key
    Derive {
        /// Cosigner master key (extended private or public key)
        #[arg(short, long)]
        key: String,

        /// Cosigner index
        #[arg(long)]
        cosigner: u32,

        /// Derive on the change branch
        #[arg(long)]
        change: bool,

        /// Address index
        #[arg(short, long)]
        index: u32,
    },

    /// Sign the multisig inputs of a decoded transaction
    Sign {
        /// Decoded transaction JSON file
        #[arg(short, long)]
        tx: PathBuf,

        /// Cosigner master private key
        #[arg(short, long)]
        key: String,

        /// Cosigner index
        #[arg(long)]
        cosigner: u32,

        /// Write the transaction with updated script-sigs here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let state = AppState::new(
        cli.data_dir.clone(),
        cli.networks.as_deref(),
        cli.network.as_deref(),
    )?;

    // Process commands
    match cli.command {
        Commands::Networks => {
            cli::cmd_networks(&state)?;
        }

        Commands::Seed {
            cosigners,
            required,
            count,
        } => {
            cli::cmd_seed(&state, cosigners, required, count)?;
        }

        Commands::Inspect { bip45 } => {
            cli::cmd_inspect(&state, &bip45)?;
        }

        Commands::Address {
            bip45,
            change,
            index,
        } => {
            cli::cmd_address(&state, &bip45, change, index)?;
        }

        Commands::Derive {
            key,
            cosigner,
            change,
            index,
        } => {
            cli::cmd_derive(&state, &key, cosigner, change, index)?;
        }

        Commands::Sign {
            tx,
            key,
            cosigner,
            out,
        } => {
            cli::cmd_sign(&state, &tx, &key, cosigner, out.as_deref())?;
        }
    }

    Ok(())
}
