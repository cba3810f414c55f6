//! Per item-version chunk aggregate.
//!
//! The manager applies the bound encryption strategy transparently: chunk
//! payloads are encrypted on write and decrypted on read at the stream
//! offset `chunk_no * chunk_size`, so individual chunks stay independently
//! addressable.

use std::collections::BTreeMap;
use std::path::PathBuf;

use inode_core::{NodeError, NodeResult};
use inode_crypto::EncryptionStrategy;

use crate::chunk::Chunk;

pub struct ChunkManager {
    dir: PathBuf,
    chunk_size: usize,
    chunk_count: u64,
    finalized: bool,
    chunks: BTreeMap<u64, Chunk>,
    strategy: Option<EncryptionStrategy>,
}

impl std::fmt::Debug for ChunkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkManager")
            .field("dir", &self.dir)
            .field("chunk_count", &self.chunk_count)
            .field("finalized", &self.finalized)
            .field("encrypted", &self.strategy.is_some())
            .finish()
    }
}

impl ChunkManager {
    /// Manager for a fresh, empty item version.
    pub fn new(dir: PathBuf, chunk_size: usize, strategy: Option<EncryptionStrategy>) -> Self {
        Self {
            dir,
            chunk_size,
            chunk_count: 0,
            finalized: false,
            chunks: BTreeMap::new(),
            strategy,
        }
    }

    /// Manager for an item version reopened from disk. All chunks start
    /// evicted and are loaded lazily.
    pub fn open(
        dir: PathBuf,
        chunk_size: usize,
        chunk_count: u64,
        finalized: bool,
        strategy: Option<EncryptionStrategy>,
    ) -> Self {
        let mut chunks = BTreeMap::new();
        for no in 0..chunk_count {
            let path = chunk_path(&dir, no);
            chunks.insert(no, Chunk::evicted(no, path));
        }
        Self {
            dir,
            chunk_size,
            chunk_count,
            finalized,
            chunks,
            strategy,
        }
    }

    pub fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn strategy(&self) -> Option<&EncryptionStrategy> {
        self.strategy.as_ref()
    }

    pub fn strategy_mut(&mut self) -> Option<&mut EncryptionStrategy> {
        self.strategy.as_mut()
    }

    fn reject_if_finalized(&self) -> NodeResult<()> {
        if self.finalized {
            return Err(NodeError::Finalized);
        }
        Ok(())
    }

    /// Store a chunk payload, encrypting it if a strategy is bound.
    ///
    /// Writing past the current end extends the chunk count to
    /// `max(chunk_count, no + 1)`.
    pub fn set_chunk(&mut self, no: u64, data: &[u8]) -> NodeResult<()> {
        self.reject_if_finalized()?;
        if data.len() > self.chunk_size {
            return Err(NodeError::Size {
                actual: data.len(),
                limit: self.chunk_size,
            });
        }

        let payload = match &mut self.strategy {
            Some(strategy) => strategy.encrypt_at(no * self.chunk_size as u64, data)?,
            None => data.to_vec(),
        };

        self.chunk_count = self.chunk_count.max(no + 1);
        match self.chunks.get_mut(&no) {
            Some(chunk) => chunk.set_data(payload),
            None => {
                let path = chunk_path(&self.dir, no);
                self.chunks.insert(no, Chunk::new(no, path, payload));
            }
        }
        Ok(())
    }

    /// Read a chunk payload back, reading from disk and decrypting as
    /// needed. Reads stay permitted after finalize and leave evicted
    /// chunks evicted, so read traffic never grows resident memory.
    pub fn get_chunk(&mut self, no: u64) -> NodeResult<Vec<u8>> {
        if no >= self.chunk_count {
            return Err(NodeError::Range {
                index: no,
                count: self.chunk_count,
            });
        }

        let chunk = self.chunks.entry(no).or_insert_with(|| {
            let path = chunk_path(&self.dir, no);
            Chunk::evicted(no, path)
        });
        let payload = chunk.read_payload()?;

        match &mut self.strategy {
            Some(strategy) => strategy.decrypt_at(no * self.chunk_size as u64, &payload),
            None => Ok(payload),
        }
    }

    /// Discard all chunks at indices >= `new_count`.
    pub fn crop_chunks(&mut self, new_count: u64) -> NodeResult<()> {
        self.reject_if_finalized()?;
        let dropped: Vec<u64> = self.chunks.range(new_count..).map(|(no, _)| *no).collect();
        for no in dropped {
            if let Some(mut chunk) = self.chunks.remove(&no) {
                chunk.delete()?;
            }
        }
        self.chunk_count = self.chunk_count.min(new_count);
        Ok(())
    }

    /// Make this version immutable. Further writes must go to a new
    /// content version.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    /// Flush every resident chunk payload to its chunk file.
    pub fn transfer_all_to_disk(&mut self) -> NodeResult<()> {
        for chunk in self.chunks.values_mut() {
            chunk.transfer_to_disk()?;
        }
        Ok(())
    }
}

fn chunk_path(dir: &std::path::Path, no: u64) -> PathBuf {
    dir.join(format!("chunk_{no:08}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_manager(dir: &std::path::Path) -> ChunkManager {
        ChunkManager::new(dir.to_path_buf(), crate::DEFAULT_CHUNK_SIZE, None)
    }

    #[test]
    fn test_chunk_count_tracks_highest_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = plain_manager(dir.path());

        mgr.set_chunk(0, b"a").unwrap();
        mgr.set_chunk(1, b"b").unwrap();
        mgr.set_chunk(2, b"c").unwrap();
        assert_eq!(mgr.chunk_count(), 3);

        // rewriting an existing chunk doesn't change the count
        mgr.set_chunk(1, b"bb").unwrap();
        assert_eq!(mgr.chunk_count(), 3);

        // sparse write extends to highest index + 1
        mgr.set_chunk(9, b"j").unwrap();
        assert_eq!(mgr.chunk_count(), 10);
    }

    #[test]
    fn test_get_chunk_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = plain_manager(dir.path());
        mgr.set_chunk(0, b"a").unwrap();
        mgr.set_chunk(1, b"b").unwrap();
        mgr.set_chunk(2, b"c").unwrap();

        match mgr.get_chunk(3) {
            Err(NodeError::Range { index: 3, count: 3 }) => {}
            other => panic!("expected range error, got {other:?}"),
        }
    }

    #[test]
    fn test_oversized_chunk_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = plain_manager(dir.path());
        let too_big = vec![0u8; crate::DEFAULT_CHUNK_SIZE + 1];
        assert!(matches!(
            mgr.set_chunk(0, &too_big),
            Err(NodeError::Size { .. })
        ));
    }

    #[test]
    fn test_finalize_blocks_writes_allows_reads() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = plain_manager(dir.path());
        mgr.set_chunk(0, b"hello").unwrap();
        mgr.finalize();

        assert!(matches!(mgr.set_chunk(0, b"x"), Err(NodeError::Finalized)));
        assert!(matches!(mgr.set_chunk(1, b"x"), Err(NodeError::Finalized)));
        assert!(matches!(mgr.crop_chunks(0), Err(NodeError::Finalized)));
        assert_eq!(mgr.get_chunk(0).unwrap(), b"hello");
    }

    #[test]
    fn test_crop_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = plain_manager(dir.path());
        for no in 0..5 {
            mgr.set_chunk(no, &[no as u8]).unwrap();
        }
        mgr.transfer_all_to_disk().unwrap();

        mgr.crop_chunks(2).unwrap();
        assert_eq!(mgr.chunk_count(), 2);
        assert_eq!(mgr.get_chunk(1).unwrap(), vec![1u8]);
        assert!(mgr.get_chunk(2).is_err());
        assert!(!dir.path().join("chunk_00000004").exists());
    }

    #[test]
    fn test_reads_leave_chunks_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = plain_manager(dir.path());
        mgr.set_chunk(0, b"cold read").unwrap();
        mgr.transfer_all_to_disk().unwrap();
        assert!(mgr.chunks.get(&0).unwrap().on_disk());

        // repeated reads must not pull the payload into memory for good
        assert_eq!(mgr.get_chunk(0).unwrap(), b"cold read");
        assert_eq!(mgr.get_chunk(0).unwrap(), b"cold read");
        assert!(mgr.chunks.get(&0).unwrap().on_disk());
    }

    #[test]
    fn test_eviction_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = plain_manager(dir.path());
        mgr.set_chunk(0, b"evict me").unwrap();
        mgr.transfer_all_to_disk().unwrap();
        assert_eq!(mgr.get_chunk(0).unwrap(), b"evict me");
    }

    #[test]
    fn test_reopen_reads_chunks_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut mgr = plain_manager(dir.path());
            mgr.set_chunk(0, b"zero").unwrap();
            mgr.set_chunk(1, b"one").unwrap();
            mgr.transfer_all_to_disk().unwrap();
        }

        let mut reopened = ChunkManager::open(
            dir.path().to_path_buf(),
            crate::DEFAULT_CHUNK_SIZE,
            2,
            true,
            None,
        );
        assert_eq!(reopened.get_chunk(0).unwrap(), b"zero");
        assert_eq!(reopened.get_chunk(1).unwrap(), b"one");
        assert!(reopened.is_finalized());
    }
}
