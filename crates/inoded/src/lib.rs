//! Daemon internals, exported for the integration tests.

pub mod daemon;
pub mod handler;
pub mod worker;
