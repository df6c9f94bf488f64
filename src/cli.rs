//! # GKRCTL CLI
//!
//! Command-line interface for inspecting the Consul gossip keyring the
//! rotator manages.
//!
//! Connection settings come from the same `CONSUL_HTTP_ADDR`,
//! `CONSUL_HTTP_TOKEN(_FILE)` and `CONSUL_CACERT` variables as the sidecar.
//!
//! ## Usage
//!
//! ```bash
//! # Show installed keys per pool (fingerprints only)
//! gkrctl keyring list
//!
//! # Show the current Raft leader
//! gkrctl leader
//!
//! # Validate a key file offline and print its fingerprint
//! gkrctl fingerprint --file /consul/gossip/key
//!
//! # Check whether the key in a file reached every member
//! gkrctl propagation --key-file /consul/gossip/key
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gossip_key_rotator::config::{ConsulConfig, LogConfig};
use gossip_key_rotator::constants::DEFAULT_RPC_TIMEOUT_SECS;
use gossip_key_rotator::detector::{Fingerprint, KeyMaterial};
use gossip_key_rotator::keyring::{ConsulClient, KeyringClient, LeaderSource};
use gossip_key_rotator::observability::logging;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

/// Gossip key rotator CLI
#[derive(Parser)]
#[command(name = "gkrctl")]
#[command(about = "Inspect the Consul gossip keyring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Consul agent address (overrides CONSUL_HTTP_ADDR)
    #[arg(short, long, global = true)]
    address: Option<String>,

    /// Per-request timeout in seconds
    #[arg(short, long, global = true, default_value_t = DEFAULT_RPC_TIMEOUT_SECS)]
    timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Keyring operations
    Keyring {
        #[command(subcommand)]
        command: KeyringCommands,
    },
    /// Show the current Raft leader
    Leader,
    /// Validate a key file and print its fingerprint
    Fingerprint {
        /// Path of the gossip key file
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Report whether the key in a file is known to every member
    Propagation {
        /// Path of the gossip key file
        #[arg(short, long)]
        key_file: PathBuf,
    },
}

#[derive(Subcommand)]
enum KeyringCommands {
    /// List installed keys per gossip pool
    List {
        /// Print raw keys instead of fingerprints
        #[arg(long)]
        show_keys: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Must happen before any rustls client is built
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }
    if let Err(e) = logging::init_tracing(&LogConfig {
        level: "warn".to_string(),
        json: false,
    }) {
        eprintln!("{e}");
    }

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout.max(1));

    match cli.command {
        Commands::Fingerprint { file } => fingerprint_command(&file),
        Commands::Keyring {
            command: KeyringCommands::List { show_keys },
        } => {
            let client = client(cli.address, timeout)?;
            list_command(&client, show_keys).await
        }
        Commands::Leader => {
            let client = client(cli.address, timeout)?;
            leader_command(&client).await
        }
        Commands::Propagation { key_file } => {
            let client = client(cli.address, timeout)?;
            propagation_command(&client, &key_file).await
        }
    }
}

fn client(address: Option<String>, timeout: Duration) -> Result<ConsulClient> {
    let mut config = ConsulConfig::from_env().context("Invalid Consul configuration")?;
    if let Some(address) = address {
        config.address = address;
    }
    ConsulClient::new(&config, timeout)
}

fn read_key(path: &Path) -> Result<KeyMaterial> {
    let raw = std::fs::read(path)
        .with_context(|| format!("Failed to read key file {}", path.display()))?;
    KeyMaterial::from_bytes(&raw)
        .with_context(|| format!("Invalid gossip key in {}", path.display()))
}

/// Print the full fingerprint of a key file
fn fingerprint_command(path: &Path) -> Result<ExitCode> {
    let material = read_key(path)?;
    println!("{}", material.fingerprint().as_str());
    Ok(ExitCode::SUCCESS)
}

/// List keys per pool
async fn list_command(client: &ConsulClient, show_keys: bool) -> Result<ExitCode> {
    let snapshot = client
        .list()
        .await
        .context("Failed to list the gossip keyring")?;

    if snapshot.pools.is_empty() {
        println!("No gossip pools reported.");
        return Ok(ExitCode::SUCCESS);
    }

    for pool in &snapshot.pools {
        println!("\n{} ({} members)", pool.name(), pool.num_nodes);
        println!("{:<48} {:<10} {:<8}", "KEY", "MEMBERS", "PRIMARY");
        println!("{}", "-".repeat(68));
        for (key, count) in &pool.keys {
            let label = if show_keys {
                key.clone()
            } else {
                Fingerprint::of(key).short().to_string()
            };
            let primary = if pool.primary_keys.get(key).is_some_and(|n| *n > 0) {
                "*"
            } else {
                ""
            };
            println!(
                "{:<48} {:<10} {:<8}",
                label,
                format!("{count}/{}", pool.num_nodes),
                primary
            );
        }
    }

    match snapshot.sole_primary() {
        Some(_) => println!("\nAll pools agree on a single primary key."),
        None => println!("\nPools do not agree on a single primary key (rotation in progress?)."),
    }
    Ok(ExitCode::SUCCESS)
}

async fn leader_command(client: &ConsulClient) -> Result<ExitCode> {
    let leader = client
        .leader()
        .await
        .context("Failed to query the Raft leader")?;
    if leader.is_empty() {
        println!("No leader elected");
        return Ok(ExitCode::FAILURE);
    }
    println!("{leader}");
    Ok(ExitCode::SUCCESS)
}

/// Exit 0 only when every member of every pool reports the key
async fn propagation_command(client: &ConsulClient, key_file: &Path) -> Result<ExitCode> {
    let material = read_key(key_file)?;
    let snapshot = client
        .list()
        .await
        .context("Failed to list the gossip keyring")?;

    println!("Key: {}", material.fingerprint());
    for pool in &snapshot.pools {
        let count = pool.keys.get(material.key()).copied().unwrap_or(0);
        let status = if pool.is_propagated(material.key()) {
            "complete"
        } else {
            "pending"
        };
        println!("  {:<32} {count}/{} {status}", pool.name(), pool.num_nodes);
    }

    if snapshot.is_propagated(material.key()) {
        println!("Propagated to all {} members", snapshot.total_members());
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "Not propagated: {}/{} members report the key",
            snapshot.member_count(material.key()),
            snapshot.total_members()
        );
        Ok(ExitCode::FAILURE)
    }
}
