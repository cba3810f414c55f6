//! inoded: per-user information node daemon
//!
//! Usage:
//!   inoded <node-dir> [--config <node-dir>/node.toml] [--log info] [--log-format text]
//!
//! Serves the node's control socket (`api_access.sock` inside the node
//! directory) until it receives SIGTERM or a `shutdown` request.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use inode_core::{NodeConfig, NodeLayout};
use inoded::daemon;

#[derive(Parser, Debug)]
#[command(name = "inoded", version, about = "information node daemon")]
struct Cli {
    /// Path to the node directory
    node: PathBuf,

    /// Path to node.toml (defaults to <node-dir>/node.toml)
    #[arg(long, short = 'c', env = "INODE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "INODE_LOG", default_value = "info")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "INODE_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Validate before logging init so a typo'd path doesn't get a logs/
    // directory created inside it.
    let layout = NodeLayout::new(&cli.node);
    layout.validate(false)?;
    init_logging(&cli.log, &cli.log_format, &layout)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        node = %cli.node.display(),
        "inoded starting"
    );

    let config_path = cli
        .config
        .unwrap_or_else(|| cli.node.join("node.toml"));
    let config = load_config(&config_path).await?;

    daemon::run(cli.node, config).await
}

async fn load_config(path: &PathBuf) -> Result<NodeConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))
    } else {
        tracing::debug!("no config at {}, using defaults", path.display());
        Ok(NodeConfig::default())
    }
}

/// Log to stderr and, when the node's `logs/` directory can be created, to
/// `logs/log-<date>.txt` as well.
fn init_logging(level: &str, format: &LogFormat, layout: &NodeLayout) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    std::fs::create_dir_all(layout.log_dir())
        .with_context(|| format!("creating log directory {}", layout.log_dir().display()))?;
    let log_path = layout.log_file_today();
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;
    match format {
        LogFormat::Json => {
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file));
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .with(file_layer)
                .init();
        }
        LogFormat::Text => {
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file));
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(file_layer)
                .init();
        }
    }
    Ok(())
}
