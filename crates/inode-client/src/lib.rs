//! inode-client: talk to a running node daemon over its control socket,
//! and probe whether a node daemon is running at all.

pub mod client;
pub mod status;

pub use client::NodeClient;
pub use status::{check_node_status, NodeStatus};
