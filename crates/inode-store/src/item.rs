//! A logical, identified piece of user data plus its per-version metadata.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};
use uuid::Uuid;

use inode_core::{NodeError, NodeResult};
use inode_crypto::{EncryptionKind, EncryptionStrategy, Identity};

use crate::manager::ChunkManager;

/// Metadata persisted as `meta.json` in each version directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemMeta {
    pub identifier: String,
    pub mime_type: String,
    pub classification: String,
    pub content_version: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub contents_finalized: bool,
    pub chunk_count: u64,
    pub encryption: Option<EncryptionKind>,
}

impl ItemMeta {
    pub fn new(identifier: String, mime_type: String, classification: String) -> Self {
        let now = Utc::now();
        Self {
            identifier,
            mime_type,
            classification,
            content_version: 1,
            created_at: now,
            modified_at: now,
            contents_finalized: false,
            chunk_count: 0,
            encryption: None,
        }
    }
}

/// Derive a collision-resistant identifier from a caller-suggested one:
/// `uuid4-hex + "-" + sha224(suggested)`.
pub fn derive_identifier(suggested: &str) -> String {
    let digest = Sha224::digest(suggested.as_bytes());
    let hash_hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{}-{hash_hex}", Uuid::new_v4().simple())
}

/// One content version of an item, with its chunk manager.
///
/// Prior versions are independently addressable items sharing the same
/// logical identifier; once finalized a version never changes.
#[derive(Debug)]
pub struct Item {
    meta: ItemMeta,
    chunks: ChunkManager,
}

impl Item {
    pub fn new(meta: ItemMeta, chunks: ChunkManager) -> Self {
        Self { meta, chunks }
    }

    pub fn meta(&self) -> &ItemMeta {
        &self.meta
    }

    pub fn identifier(&self) -> &str {
        &self.meta.identifier
    }

    pub fn content_version(&self) -> u64 {
        self.meta.content_version
    }

    pub fn chunk_count(&self) -> u64 {
        self.chunks.chunk_count()
    }

    pub fn is_finalized(&self) -> bool {
        self.chunks.is_finalized()
    }

    pub fn set_chunk(&mut self, no: u64, data: &[u8]) -> NodeResult<()> {
        self.chunks.set_chunk(no, data)?;
        self.meta.chunk_count = self.chunks.chunk_count();
        self.meta.modified_at = Utc::now();
        Ok(())
    }

    pub fn get_chunk(&mut self, no: u64) -> NodeResult<Vec<u8>> {
        self.chunks.get_chunk(no)
    }

    pub fn crop_chunks(&mut self, new_count: u64) -> NodeResult<()> {
        self.chunks.crop_chunks(new_count)?;
        self.meta.chunk_count = self.chunks.chunk_count();
        self.meta.modified_at = Utc::now();
        Ok(())
    }

    /// Make this content version immutable.
    pub fn finalize(&mut self) {
        self.chunks.finalize();
        self.meta.contents_finalized = true;
        self.meta.modified_at = Utc::now();
    }

    /// Unlock password-based encryption for reading or modifying contents.
    pub fn unlock_with_password(&mut self, passphrase: &SecretString) -> NodeResult<()> {
        match self.chunks.strategy_mut() {
            Some(EncryptionStrategy::Password(p)) => p.unlock(passphrase),
            Some(_) => Err(NodeError::State(
                "item is not password-encrypted".into(),
            )),
            None => Err(NodeError::State("item is not encrypted".into())),
        }
    }

    /// Supply a private identity to unlock target-node encryption.
    pub fn unlock_with_identity(&mut self, identity: Identity) -> NodeResult<()> {
        match self.chunks.strategy_mut() {
            Some(EncryptionStrategy::TargetNode(t)) => t.set_decryption_key(identity),
            Some(_) => Err(NodeError::State(
                "item is not target-node-encrypted".into(),
            )),
            None => Err(NodeError::State("item is not encrypted".into())),
        }
    }

    /// Forget resident key material for a password-encrypted item.
    pub fn lock(&mut self) {
        if let Some(EncryptionStrategy::Password(p)) = self.chunks.strategy_mut() {
            p.lock();
        }
    }

    pub(crate) fn meta_mut(&mut self) -> &mut ItemMeta {
        &mut self.meta
    }

    pub(crate) fn chunks_mut(&mut self) -> &mut ChunkManager {
        &mut self.chunks
    }
}
