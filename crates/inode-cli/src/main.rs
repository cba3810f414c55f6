//! inode: information node command line client
//!
//! Commands:
//!   create <node-dir>        - provision a fresh node directory
//!   status <node-dir>        - report whether the node's daemon is running
//!   ping <node-dir>          - liveness round-trip against the daemon
//!   shutdown <node-dir>      - ask the daemon to terminate
//!   item <node-dir> ...      - item operations through the daemon

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;

use inode_client::{check_node_status, NodeClient, NodeStatus};
use inode_core::{NodeConfig, NodeLayout};
use inode_crypto::Identity;

#[derive(Parser, Debug)]
#[command(name = "inode", version, about = "information node client")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "INODE_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision a fresh node directory with a newly generated identity
    Create {
        /// Directory to turn into a node (created if missing)
        node: PathBuf,
        /// RSA key size for the node identity
        #[arg(long)]
        bits: Option<usize>,
        /// Encrypt the stored identity with this passphrase
        #[arg(long, env = "INODE_PASSPHRASE")]
        passphrase: Option<String>,
    },

    /// Report whether the node's daemon is running
    Status {
        node: PathBuf,
    },

    /// Liveness round-trip against the node's daemon
    Ping {
        node: PathBuf,
    },

    /// Ask the node's daemon to terminate
    Shutdown {
        node: PathBuf,
    },

    /// Item operations (require a running daemon)
    Item {
        node: PathBuf,
        #[command(subcommand)]
        action: ItemAction,
    },
}

#[derive(Subcommand, Debug)]
enum ItemAction {
    /// Create a new item; prints its assigned identifier
    Create {
        /// Suggested identifier (hashed into the final one)
        suggested: String,
        #[arg(long)]
        mime_type: Option<String>,
        #[arg(long)]
        classification: Option<String>,
    },
    /// Write one chunk, read from a file or stdin
    Write {
        identifier: String,
        chunk_no: u64,
        /// File to read the chunk payload from (stdin when omitted)
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Read one chunk to stdout
    Read {
        identifier: String,
        chunk_no: u64,
    },
    /// Print the item's chunk count
    Count {
        identifier: String,
    },
    /// Drop all chunks at or beyond the new count
    Crop {
        identifier: String,
        new_count: u64,
    },
    /// Make the item's contents immutable
    Finalize {
        identifier: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    match cli.command {
        Commands::Create {
            node,
            bits,
            passphrase,
        } => create_node(node, bits, passphrase),
        Commands::Status { node } => status(node).await,
        Commands::Ping { node } => {
            let mut client = NodeClient::connect(&node).await?;
            client.ping().await?;
            println!("pong");
            Ok(())
        }
        Commands::Shutdown { node } => {
            let mut client = NodeClient::connect(&node).await?;
            client.shutdown().await?;
            println!("shutdown acknowledged");
            Ok(())
        }
        Commands::Item { node, action } => item_command(node, action).await,
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Provision a node directory: `storage/`, `logs/`, and a fresh identity.
fn create_node(node: PathBuf, bits: Option<usize>, passphrase: Option<String>) -> Result<()> {
    let layout = NodeLayout::new(&node);
    layout.validate(true).map_err(|_| {
        anyhow::anyhow!(
            "{} already contains files, refusing to provision a node there",
            node.display()
        )
    })?;
    if layout.identity_file().exists() {
        bail!("{} is already a node", node.display());
    }

    std::fs::create_dir_all(layout.storage_dir())
        .with_context(|| format!("creating {}", layout.storage_dir().display()))?;
    std::fs::create_dir_all(layout.log_dir())?;

    let bits = bits.unwrap_or_else(|| NodeConfig::default().identity.generate_bits);
    eprintln!("generating {bits}-bit node identity (this can take a while)...");
    let identity = Identity::generate(bits)?;
    let passphrase = passphrase.map(SecretString::from);
    identity.save(layout.identity_file(), passphrase.as_ref())?;

    println!("node created at {}", node.display());
    Ok(())
}

async fn status(node: PathBuf) -> Result<()> {
    let ping_timeout =
        std::time::Duration::from_millis(NodeConfig::default().daemon.ping_timeout_ms);
    match check_node_status(&node, ping_timeout).await? {
        NodeStatus::Off => println!("off"),
        NodeStatus::Unreachable => println!("unreachable (process alive, daemon not answering)"),
        NodeStatus::Invalid => println!("invalid (unreadable pidfile, clean up manually)"),
        NodeStatus::On => {
            let mut client = NodeClient::connect(&node).await?;
            let status = client.status().await?;
            println!(
                "on (version {}, up {}s, {} items)",
                status["version"].as_str().unwrap_or("?"),
                status["uptime_secs"].as_u64().unwrap_or(0),
                status["item_count"].as_u64().unwrap_or(0),
            );
        }
    }
    Ok(())
}

async fn item_command(node: PathBuf, action: ItemAction) -> Result<()> {
    let mut client = NodeClient::connect(&node).await?;
    match action {
        ItemAction::Create {
            suggested,
            mime_type,
            classification,
        } => {
            let identifier = client
                .create_item(&suggested, mime_type.as_deref(), classification.as_deref())
                .await?;
            println!("{identifier}");
        }
        ItemAction::Write {
            identifier,
            chunk_no,
            file,
        } => {
            let data = match file {
                Some(path) => std::fs::read(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            client.set_chunk(&identifier, chunk_no, &data).await?;
        }
        ItemAction::Read {
            identifier,
            chunk_no,
        } => {
            let data = client.get_chunk(&identifier, chunk_no).await?;
            std::io::stdout().write_all(&data)?;
        }
        ItemAction::Count { identifier } => {
            println!("{}", client.chunk_count(&identifier).await?);
        }
        ItemAction::Crop {
            identifier,
            new_count,
        } => {
            client.crop_chunks(&identifier, new_count).await?;
        }
        ItemAction::Finalize { identifier } => {
            client.finalize_item(&identifier).await?;
        }
    }
    Ok(())
}
