//! inode-store: the versioned item store behind a node's `storage/` dir.
//!
//! On-disk layout, one directory per item, one subdirectory per content
//! version:
//!
//! ```text
//! storage/
//!   <identifier>/
//!     v1/
//!       meta.json        item metadata (type, timestamps, finalized flag)
//!       chunk_00000000   chunk payloads (ciphertext when encryption is bound)
//!       chunk_00000001
//!       enc/             key files of the bound encryption strategy
//!     v2/
//!       ...
//! ```
//!
//! Finalized versions are immutable; writes go to a new content version.
//! The daemon's single store worker is the only mutator of this tree.

pub mod chunk;
pub mod item;
pub mod manager;
pub mod store;

pub use chunk::{Chunk, ChunkData};
pub use item::{Item, ItemMeta};
pub use manager::ChunkManager;
pub use store::{ItemStore, StrategySpec};

/// Canonical chunk size: 100 KiB. A multiple of the 16-byte cipher block,
/// so every chunk starts at a seekable stream offset.
pub const DEFAULT_CHUNK_SIZE: usize = 100 * 1024;
