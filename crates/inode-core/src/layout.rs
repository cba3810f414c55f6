//! On-disk layout of a node directory.
//!
//! A node is a directory holding `storage/` (item data), `identity.secret`
//! (the node's own RSA identity), `pidfile`, `api_access.sock` (control
//! socket) and `logs/log-<date>.txt`.

use std::path::{Path, PathBuf};

use crate::{NodeError, NodeResult};

pub const STORAGE_DIR: &str = "storage";
pub const IDENTITY_FILE: &str = "identity.secret";
pub const PID_FILE: &str = "pidfile";
pub const API_SOCKET: &str = "api_access.sock";
pub const LOG_DIR: &str = "logs";

/// Path helpers for a node directory.
#[derive(Debug, Clone)]
pub struct NodeLayout {
    root: PathBuf,
}

impl NodeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.root.join(STORAGE_DIR)
    }

    pub fn identity_file(&self) -> PathBuf {
        self.root.join(IDENTITY_FILE)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.root.join(PID_FILE)
    }

    pub fn api_socket(&self) -> PathBuf {
        self.root.join(API_SOCKET)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join(LOG_DIR)
    }

    /// Log file for the given day, `logs/log-YYYY-MM-DD.txt`.
    pub fn log_file(&self, date: chrono::NaiveDate) -> PathBuf {
        self.log_dir().join(format!("log-{}.txt", date.format("%Y-%m-%d")))
    }

    pub fn log_file_today(&self) -> PathBuf {
        self.log_file(chrono::Local::now().date_naive())
    }

    /// Check that the root points at a valid node directory.
    ///
    /// With `allow_new`, a missing or empty directory passes (the caller
    /// intends to create the node there).
    pub fn validate(&self, allow_new: bool) -> NodeResult<()> {
        if !self.root.exists() {
            if allow_new {
                return Ok(());
            }
            return Err(NodeError::Format(format!(
                "node folder doesn't exist: {}",
                self.root.display()
            )));
        }
        if !self.root.is_dir() {
            return Err(NodeError::Format(format!(
                "node path is not a directory: {}",
                self.root.display()
            )));
        }

        let empty = self.root.read_dir()?.next().is_none();
        if empty {
            if allow_new {
                return Ok(());
            }
            return Err(NodeError::Format(format!(
                "node folder is empty, not a valid node: {}",
                self.root.display()
            )));
        }

        if !self.storage_dir().exists() || !self.identity_file().exists() {
            return Err(NodeError::Format(format!(
                "folder is not a valid information node: {}",
                self.root.display()
            )));
        }
        Ok(())
    }
}
