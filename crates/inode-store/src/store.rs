//! The item store rooted at a node's `storage/` directory.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use tracing::debug;

use inode_core::{NodeError, NodeResult};
use inode_crypto::stream::BLOCK_LEN;
use inode_crypto::{
    EncryptionStrategy, Identity, PasswordEncryption, TargetNodeEncryption,
};

use crate::item::{derive_identifier, Item, ItemMeta};
use crate::manager::ChunkManager;

const META_FILE: &str = "meta.json";
const ENC_DIR: &str = "enc";

/// Requested encryption for a new item version.
pub enum StrategySpec {
    None,
    Password {
        passphrase: SecretString,
        bits: usize,
    },
    TargetNode {
        peer: Identity,
    },
}

/// Versioned item storage. The daemon's store worker holds the only
/// instance, which keeps on-disk mutation single-writer without locks.
#[derive(Debug)]
pub struct ItemStore {
    root: PathBuf,
    chunk_size: usize,
    min_identity_bits: usize,
}

impl ItemStore {
    /// Open the store. The chunk size must be a positive multiple of the
    /// cipher block, otherwise every encrypted chunk beyond the first
    /// would start at an unseekable stream offset.
    pub fn open(
        root: impl Into<PathBuf>,
        chunk_size: usize,
        min_identity_bits: usize,
    ) -> NodeResult<Self> {
        if chunk_size == 0 || chunk_size % BLOCK_LEN != 0 {
            return Err(NodeError::Format(format!(
                "chunk size {chunk_size} is not a positive multiple of the \
                 {BLOCK_LEN}-byte cipher block"
            )));
        }
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            chunk_size,
            min_identity_bits,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn item_dir(&self, identifier: &str) -> PathBuf {
        self.root.join(identifier)
    }

    fn version_dir(&self, identifier: &str, version: u64) -> PathBuf {
        self.item_dir(identifier).join(format!("v{version}"))
    }

    /// Create a new item at content version 1.
    pub fn create_item(
        &self,
        suggested_identifier: &str,
        mime_type: &str,
        classification: &str,
        spec: StrategySpec,
    ) -> NodeResult<Item> {
        let identifier = derive_identifier(suggested_identifier);
        let mut meta = ItemMeta::new(
            identifier.clone(),
            mime_type.to_string(),
            classification.to_string(),
        );
        let dir = self.version_dir(&identifier, meta.content_version);
        std::fs::create_dir_all(&dir)?;

        let strategy = self.build_strategy(&dir, spec)?;
        meta.encryption = strategy.as_ref().map(EncryptionStrategy::kind);

        let chunks = ChunkManager::new(dir.clone(), self.chunk_size, strategy);
        write_meta(&dir, &meta)?;
        debug!(identifier = %meta.identifier, "item created");
        Ok(Item::new(meta, chunks))
    }

    fn build_strategy(
        &self,
        version_dir: &Path,
        spec: StrategySpec,
    ) -> NodeResult<Option<EncryptionStrategy>> {
        let enc_dir = version_dir.join(ENC_DIR);
        match spec {
            StrategySpec::None => Ok(None),
            StrategySpec::Password { passphrase, bits } => {
                let enc = PasswordEncryption::create(enc_dir, &passphrase, bits)?;
                Ok(Some(EncryptionStrategy::Password(enc)))
            }
            StrategySpec::TargetNode { peer } => {
                let enc = TargetNodeEncryption::create(enc_dir, peer, self.min_identity_bits)?;
                Ok(Some(EncryptionStrategy::TargetNode(enc)))
            }
        }
    }

    /// Highest content version present for an item.
    pub fn latest_version(&self, identifier: &str) -> NodeResult<u64> {
        let dir = self.item_dir(identifier);
        let mut latest = None;
        // only a missing directory means "no such item"; other read_dir
        // failures (permissions, disk faults) propagate as I/O errors
        let entries = std::fs::read_dir(&dir).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NodeError::Format(format!("no such item: {identifier}"))
            } else {
                NodeError::Io(e)
            }
        })?;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(version) = name
                .to_str()
                .and_then(|n| n.strip_prefix('v'))
                .and_then(|n| n.parse::<u64>().ok())
            {
                latest = Some(latest.map_or(version, |l: u64| l.max(version)));
            }
        }
        latest.ok_or_else(|| {
            NodeError::Format(format!("item {identifier} has no content versions"))
        })
    }

    /// Open an item version from disk. Encrypted items come back locked
    /// (password) or without a decryption key (target-node).
    pub fn open_item(&self, identifier: &str, version: Option<u64>) -> NodeResult<Item> {
        let version = match version {
            Some(v) => v,
            None => self.latest_version(identifier)?,
        };
        let dir = self.version_dir(identifier, version);
        let meta = read_meta(&dir)?;

        let strategy = match meta.encryption {
            Some(kind) => Some(EncryptionStrategy::load(
                kind,
                dir.join(ENC_DIR),
                self.min_identity_bits,
            )?),
            None => None,
        };
        let chunks = ChunkManager::open(
            dir,
            self.chunk_size,
            meta.chunk_count,
            meta.contents_finalized,
            strategy,
        );
        Ok(Item::new(meta, chunks))
    }

    /// Flush an item's chunks and metadata to disk.
    pub fn save_item(&self, item: &mut Item) -> NodeResult<()> {
        item.chunks_mut().transfer_all_to_disk()?;
        let dir = self.version_dir(item.identifier(), item.content_version());
        write_meta(&dir, item.meta())?;
        Ok(())
    }

    /// Start the next content version of an item. The previous version is
    /// left untouched (append-only history).
    pub fn next_version(&self, item: &Item, spec: StrategySpec) -> NodeResult<Item> {
        let version = item.content_version() + 1;
        let dir = self.version_dir(item.identifier(), version);
        std::fs::create_dir_all(&dir)?;

        let strategy = self.build_strategy(&dir, spec)?;
        let mut meta = item.meta().clone();
        meta.content_version = version;
        meta.contents_finalized = false;
        meta.chunk_count = 0;
        meta.modified_at = chrono::Utc::now();
        meta.encryption = strategy.as_ref().map(EncryptionStrategy::kind);

        let chunks = ChunkManager::new(dir.clone(), self.chunk_size, strategy);
        write_meta(&dir, &meta)?;
        Ok(Item::new(meta, chunks))
    }

    /// Identifiers of all stored items.
    pub fn list_items(&self) -> NodeResult<Vec<String>> {
        let mut items = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    items.push(name.to_string());
                }
            }
        }
        items.sort();
        Ok(items)
    }
}

fn write_meta(dir: &Path, meta: &ItemMeta) -> NodeResult<()> {
    let json = serde_json::to_vec_pretty(meta)
        .map_err(|e| NodeError::Format(format!("serializing item metadata: {e}")))?;
    std::fs::write(dir.join(META_FILE), json)?;
    Ok(())
}

fn read_meta(dir: &Path) -> NodeResult<ItemMeta> {
    let bytes = std::fs::read(dir.join(META_FILE))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| NodeError::Format(format!("parsing item metadata: {e}")))
}
