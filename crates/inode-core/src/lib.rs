pub mod config;
pub mod error;
pub mod layout;
pub mod proto;

pub use config::NodeConfig;
pub use error::{NodeError, NodeResult};
pub use layout::NodeLayout;
