//! A single fixed-size slice of an item version's content.

use std::path::PathBuf;

use inode_core::{NodeError, NodeResult};

/// Residency of a chunk's payload: either the bytes are in memory or they
/// have been evicted to the chunk file, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkData {
    Resident(Vec<u8>),
    Evicted,
}

/// One numbered chunk. The payload is the stored form (ciphertext when the
/// owning item has an encryption strategy bound).
#[derive(Debug)]
pub struct Chunk {
    no: u64,
    path: PathBuf,
    data: ChunkData,
}

impl Chunk {
    /// A freshly written chunk, resident in memory.
    pub fn new(no: u64, path: PathBuf, data: Vec<u8>) -> Self {
        Self {
            no,
            path,
            data: ChunkData::Resident(data),
        }
    }

    /// A chunk known only by its on-disk file (e.g. after reopening an
    /// item).
    pub fn evicted(no: u64, path: PathBuf) -> Self {
        Self {
            no,
            path,
            data: ChunkData::Evicted,
        }
    }

    pub fn no(&self) -> u64 {
        self.no
    }

    pub fn on_disk(&self) -> bool {
        matches!(self.data, ChunkData::Evicted)
    }

    /// Replace the payload. Clears the evicted state: the in-memory buffer
    /// is authoritative again until the next transfer to disk.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = ChunkData::Resident(data);
    }

    /// Write the payload to the chunk file and drop the in-memory buffer.
    /// Idempotent: an already evicted chunk is left untouched.
    pub fn transfer_to_disk(&mut self) -> NodeResult<()> {
        let data = match &self.data {
            ChunkData::Evicted => return Ok(()),
            ChunkData::Resident(data) => data,
        };
        std::fs::write(&self.path, data)?;
        self.data = ChunkData::Evicted;
        Ok(())
    }

    /// Load the payload back from the chunk file. Idempotent: a resident
    /// chunk is left untouched.
    pub fn transfer_from_disk(&mut self) -> NodeResult<()> {
        if let ChunkData::Resident(_) = self.data {
            return Ok(());
        }
        let data = std::fs::read(&self.path)?;
        self.data = ChunkData::Resident(data);
        Ok(())
    }

    /// The stored payload, without changing residency: resident data is
    /// cloned, evicted data is read straight from the chunk file. Reads
    /// therefore never pin a chunk in memory.
    pub fn read_payload(&self) -> NodeResult<Vec<u8>> {
        match &self.data {
            ChunkData::Resident(data) => Ok(data.clone()),
            ChunkData::Evicted => Ok(std::fs::read(&self.path)?),
        }
    }

    /// Remove the payload from memory and disk.
    pub fn delete(&mut self) -> NodeResult<()> {
        self.data = ChunkData::Evicted;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(NodeError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_residency_toggle_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk_00000000");
        let mut chunk = Chunk::new(0, path.clone(), b"payload bytes".to_vec());
        assert!(!chunk.on_disk());

        chunk.transfer_to_disk().unwrap();
        assert!(chunk.on_disk());
        assert!(path.exists());

        // idempotent both ways
        chunk.transfer_to_disk().unwrap();
        chunk.transfer_from_disk().unwrap();
        chunk.transfer_from_disk().unwrap();
        assert!(!chunk.on_disk());
        assert_eq!(chunk.read_payload().unwrap(), b"payload bytes");
    }

    #[test]
    fn test_read_payload_keeps_chunk_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk_00000000");
        let mut chunk = Chunk::new(0, path, b"cold data".to_vec());
        chunk.transfer_to_disk().unwrap();

        assert_eq!(chunk.read_payload().unwrap(), b"cold data");
        assert!(chunk.on_disk(), "a read must not make the chunk resident");
    }

    #[test]
    fn test_set_data_clears_evicted_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk_00000000");
        let mut chunk = Chunk::new(0, path, b"old".to_vec());
        chunk.transfer_to_disk().unwrap();

        chunk.set_data(b"new".to_vec());
        assert!(!chunk.on_disk());
        assert_eq!(chunk.read_payload().unwrap(), b"new");
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk_00000003");
        let mut chunk = Chunk::new(3, path.clone(), b"x".to_vec());
        chunk.transfer_to_disk().unwrap();
        assert!(path.exists());

        chunk.delete().unwrap();
        assert!(!path.exists());
        // deleting again is fine
        chunk.delete().unwrap();
    }
}
