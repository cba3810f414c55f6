//! Node status detection.
//!
//! Detection protocol: look for the PID file; verify the process is alive;
//! if alive, require a pong over the control socket within the timeout.
//! A PID file pointing at a dead process is stale and gets removed.

use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::UnixStream;
use tracing::{debug, warn};

use inode_core::{proto, NodeLayout, NodeResult};

/// Observed daemon state of a node directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// No daemon running (no PID file, or a stale one that was removed).
    Off,
    /// Daemon alive and answering pings.
    On,
    /// A process with the recorded PID exists but doesn't answer pings.
    Unreachable,
    /// The PID file is unreadable or holds no usable PID; manual cleanup
    /// is needed before a daemon can be started.
    Invalid,
}

/// Probe the daemon state of the node at `node_path`.
pub async fn check_node_status(
    node_path: impl AsRef<Path>,
    ping_timeout: Duration,
) -> NodeResult<NodeStatus> {
    let layout = NodeLayout::new(node_path.as_ref());
    let pid_file = layout.pid_file();

    if !pid_file.exists() {
        return Ok(NodeStatus::Off);
    }

    let contents = match std::fs::read_to_string(&pid_file) {
        Ok(c) => c,
        Err(e) => {
            warn!(pidfile = %pid_file.display(), "failed to read pidfile: {e}");
            return Ok(NodeStatus::Invalid);
        }
    };
    let pid: i32 = match contents.trim().parse() {
        Ok(pid) if pid >= 1 => pid,
        _ => {
            warn!(pidfile = %pid_file.display(), "pidfile has invalid contents");
            return Ok(NodeStatus::Invalid);
        }
    };

    if !process_alive(pid) {
        warn!(pid, "removing stale node pidfile");
        std::fs::remove_file(&pid_file)?;
        return Ok(NodeStatus::Off);
    }

    // Process exists; confirm the daemon actually answers.
    match ping_socket(&layout, ping_timeout).await {
        Ok(()) => Ok(NodeStatus::On),
        Err(e) => {
            debug!(pid, "daemon process alive but not answering: {e}");
            Ok(NodeStatus::Unreachable)
        }
    }
}

/// OS-level liveness probe: signal 0 delivers nothing but reports whether
/// the process exists. EPERM still means "exists".
fn process_alive(pid: i32) -> bool {
    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

async fn ping_socket(layout: &NodeLayout, timeout: Duration) -> anyhow::Result<()> {
    let fut = async {
        let mut stream = UnixStream::connect(layout.api_socket()).await?;
        proto::write_message(&mut stream, &json!({ "action": "ping" })).await?;
        let response = proto::read_message(&mut stream)
            .await?
            .ok_or_else(|| anyhow::anyhow!("connection closed before pong"))?;
        match response.get("action").and_then(Value::as_str) {
            Some("pong") => Ok(()),
            _ => Err(anyhow::anyhow!("unexpected ping response: {response}")),
        }
    };
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| anyhow::anyhow!("ping timed out"))?
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_no_pidfile_is_off() {
        let dir = tempfile::tempdir().unwrap();
        let status = check_node_status(dir.path(), TIMEOUT).await.unwrap();
        assert_eq!(status, NodeStatus::Off);
    }

    #[tokio::test]
    async fn test_garbage_pidfile_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pidfile"), "not a pid").unwrap();
        let status = check_node_status(dir.path(), TIMEOUT).await.unwrap();
        assert_eq!(status, NodeStatus::Invalid);
        // invalid pidfiles are left in place for manual inspection
        assert!(dir.path().join("pidfile").exists());
    }

    #[tokio::test]
    async fn test_negative_pid_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pidfile"), "-5").unwrap();
        let status = check_node_status(dir.path(), TIMEOUT).await.unwrap();
        assert_eq!(status, NodeStatus::Invalid);
    }

    #[tokio::test]
    async fn test_stale_pidfile_removed_and_off() {
        let dir = tempfile::tempdir().unwrap();
        // far above any realistic pid_max, so no such process exists
        std::fs::write(dir.path().join("pidfile"), "999999999").unwrap();
        let status = check_node_status(dir.path(), TIMEOUT).await.unwrap();
        assert_eq!(status, NodeStatus::Off);
        assert!(!dir.path().join("pidfile").exists());
    }

    #[tokio::test]
    async fn test_alive_pid_without_socket_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        // our own pid is definitely alive, but no daemon socket exists
        std::fs::write(dir.path().join("pidfile"), std::process::id().to_string()).unwrap();
        let status = check_node_status(dir.path(), TIMEOUT).await.unwrap();
        assert_eq!(status, NodeStatus::Unreachable);
    }
}
