//! Daemon lifecycle: single-instance guard, PID file, control socket,
//! signal handling, and orderly teardown.
//!
//! Startup order matters: refuse to start while another daemon owns the
//! node, write our PID, bind the socket, then start accepting. Teardown
//! reverses it: stop accepting, unlink the socket, drain the worker, and
//! remove the PID file last so status probes never see a half-dead node
//! as "off".

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

use inode_client::{check_node_status, NodeStatus};
use inode_core::{NodeConfig, NodeLayout};
use inode_store::ItemStore;

use crate::{handler, worker};

pub async fn run(node_path: PathBuf, config: NodeConfig) -> Result<()> {
    let layout = NodeLayout::new(&node_path);
    layout.validate(false)?;

    let ping_timeout = Duration::from_millis(config.daemon.ping_timeout_ms);
    match check_node_status(&node_path, ping_timeout).await? {
        NodeStatus::Off => {}
        NodeStatus::On => bail!(
            "a daemon is already running for node {}",
            node_path.display()
        ),
        NodeStatus::Unreachable => bail!(
            "another process holds the pidfile of node {} but doesn't answer pings; \
             refusing to start",
            node_path.display()
        ),
        NodeStatus::Invalid => bail!(
            "the pidfile of node {} is unreadable; remove it manually if no daemon is running",
            node_path.display()
        ),
    }

    // Open the store before claiming the pidfile and socket, so a bad
    // store config doesn't leave either behind.
    let store = ItemStore::open(
        layout.storage_dir(),
        config.store.chunk_size,
        config.identity.min_bits,
    )?;

    let pid_file = layout.pid_file();
    std::fs::write(&pid_file, std::process::id().to_string())
        .with_context(|| format!("writing pidfile {}", pid_file.display()))?;

    // A previous daemon that died hard leaves the socket file behind.
    let socket_path = layout.api_socket();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)
            .with_context(|| format!("removing stale socket {}", socket_path.display()))?;
    }
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("binding control socket {}", socket_path.display()))?;
    info!(socket = %socket_path.display(), pid = std::process::id(), "node daemon listening");

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let (queue_tx, queue_rx) = mpsc::channel(config.daemon.worker_queue_depth);
    let store_worker = tokio::spawn(worker::run(store, queue_rx, shutdown_tx.subscribe()));

    // SIGTERM requests shutdown; SIGHUP is accepted and ignored so a casual
    // `killall -HUP` doesn't take the node down.
    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("registering SIGHUP handler")?;
    let signal_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                    let _ = signal_shutdown.send(());
                }
                _ = sighup.recv() => {
                    debug!("received SIGHUP, ignoring");
                }
            }
        }
    });

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    tokio::spawn(handler::handle_connection(
                        stream,
                        queue_tx.clone(),
                        shutdown_tx.clone(),
                    ));
                }
                Err(e) => {
                    error!("accept failed on control socket: {e}");
                    let _ = shutdown_tx.send(());
                    break;
                }
            },
        }
    }

    info!("node daemon shutting down");
    drop(listener);
    let _ = std::fs::remove_file(&socket_path);

    // Closing the queue lets the worker finish even if the broadcast was
    // missed; then wait for it to drain.
    drop(queue_tx);
    let _ = store_worker.await;

    let _ = std::fs::remove_file(&pid_file);
    info!("node daemon exited cleanly");
    Ok(())
}
