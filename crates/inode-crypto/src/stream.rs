//! Seekable AES-256-CTR stream cipher.
//!
//! The counter is the full 16-byte block interpreted as a big-endian
//! integer (`u128`), seeded from 16 random bytes. The counter always holds
//! the *next* block to produce: seeking to block N means the next
//! `encrypt`/`decrypt` call emits keystream for block N. Overflow past
//! 2^128 blocks wraps, which is practically unreachable.
//!
//! One instance must be used for either encryption or decryption, never
//! both mid-stream: CTR is a plain XOR, so mixing the two on one keystream
//! silently produces garbage. This is a documented sharp edge, not a
//! guarded state.
//!
//! The cipher carries a 64-byte HMAC key for external authenticity checks;
//! it is sealed and unsealed together with the AES key but never used
//! internally (CTR alone does not authenticate).

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes256;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use inode_core::{NodeError, NodeResult};

use crate::identity::Identity;

pub const KEY_LEN: usize = 32;
pub const SEED_LEN: usize = 16;
pub const HMAC_KEY_LEN: usize = 64;
pub const BLOCK_LEN: usize = 16;

/// Sealed key-material layout: `seed(16) || key(32) || hmac_key(64)`.
pub const KEY_MATERIAL_LEN: usize = SEED_LEN + KEY_LEN + HMAC_KEY_LEN;

pub struct StreamCipher {
    aes: Aes256,
    key: Zeroizing<[u8; KEY_LEN]>,
    seed: [u8; SEED_LEN],
    hmac_key: Zeroizing<[u8; HMAC_KEY_LEN]>,
    /// Next keystream block to produce.
    counter: u128,
    keystream: Zeroizing<[u8; BLOCK_LEN]>,
    /// Bytes of the current keystream block already consumed.
    keystream_used: usize,
    offset: u64,
}

impl std::fmt::Debug for StreamCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCipher")
            .field("offset", &self.offset)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl StreamCipher {
    /// Generate a fresh cipher with random key, counter seed and HMAC key.
    pub fn generate() -> NodeResult<Self> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        let mut seed = [0u8; SEED_LEN];
        let mut hmac_key = Zeroizing::new([0u8; HMAC_KEY_LEN]);
        OsRng
            .try_fill_bytes(key.as_mut())
            .and_then(|_| OsRng.try_fill_bytes(&mut seed))
            .and_then(|_| OsRng.try_fill_bytes(hmac_key.as_mut()))
            .map_err(|e| NodeError::Crypto(format!("randomness source unavailable: {e}")))?;
        Ok(Self::from_parts(key, seed, hmac_key))
    }

    /// Reconstitute a cipher from known key material.
    pub fn from_parts(
        key: Zeroizing<[u8; KEY_LEN]>,
        seed: [u8; SEED_LEN],
        hmac_key: Zeroizing<[u8; HMAC_KEY_LEN]>,
    ) -> Self {
        let aes = Aes256::new(GenericArray::from_slice(key.as_ref()));
        let mut cipher = Self {
            aes,
            key,
            seed,
            hmac_key,
            counter: 0,
            keystream: Zeroizing::new([0u8; BLOCK_LEN]),
            keystream_used: BLOCK_LEN,
            offset: 0,
        };
        cipher.restart();
        cipher
    }

    /// Restart the keystream from the seed.
    fn restart(&mut self) {
        // The counter pre-increments before producing, so the first block
        // of keystream is E(seed + 1).
        self.counter = u128::from_be_bytes(self.seed).wrapping_add(1);
        self.keystream_used = BLOCK_LEN;
        self.offset = 0;
    }

    fn next_keystream_block(&mut self) {
        let mut block = GenericArray::clone_from_slice(&self.counter.to_be_bytes());
        self.aes.encrypt_block(&mut block);
        self.keystream.copy_from_slice(&block);
        self.counter = self.counter.wrapping_add(1);
        self.keystream_used = 0;
    }

    fn apply(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        for byte in out.iter_mut() {
            if self.keystream_used == BLOCK_LEN {
                self.next_keystream_block();
            }
            *byte ^= self.keystream[self.keystream_used];
            self.keystream_used += 1;
        }
        self.offset += data.len() as u64;
        out
    }

    /// Encrypt a buffer, advancing the stream offset. Length-preserving.
    pub fn encrypt(&mut self, data: &[u8]) -> Vec<u8> {
        self.apply(data)
    }

    /// Decrypt a buffer, advancing the stream offset. Length-preserving.
    pub fn decrypt(&mut self, data: &[u8]) -> Vec<u8> {
        self.apply(data)
    }

    /// Whether non-zero seeks are supported.
    pub fn seekable(&self) -> bool {
        true
    }

    /// Byte offset into the stream.
    pub fn tell(&self) -> u64 {
        self.offset
    }

    /// Reposition the stream.
    ///
    /// Offset 0 always succeeds and restarts the keystream from the seed.
    /// Any other offset requires `seekable()` and must be a multiple of the
    /// 16-byte block size; the counter is set to the absolute block index
    /// `byte_offset / 16`.
    pub fn seek(&mut self, byte_offset: u64) -> NodeResult<()> {
        if byte_offset == 0 {
            self.restart();
            return Ok(());
        }
        if !self.seekable() {
            return Err(NodeError::Unsupported(
                "this crypto stream is not seekable".into(),
            ));
        }
        if byte_offset % BLOCK_LEN as u64 != 0 {
            return Err(NodeError::Alignment(byte_offset));
        }
        self.counter = (byte_offset / BLOCK_LEN as u64) as u128;
        self.keystream_used = BLOCK_LEN;
        self.offset = byte_offset;
        Ok(())
    }

    /// Key for external HMAC-based authenticity checks.
    pub fn hmac_key(&self) -> &[u8; HMAC_KEY_LEN] {
        &self.hmac_key
    }

    /// Seal `seed || key || hmac_key` (112 bytes) under the identity's
    /// public key.
    pub fn seal_key_material(&self, identity: &Identity) -> NodeResult<Vec<u8>> {
        let mut blob = Zeroizing::new(Vec::with_capacity(KEY_MATERIAL_LEN));
        blob.extend_from_slice(&self.seed);
        blob.extend_from_slice(self.key.as_ref());
        blob.extend_from_slice(self.hmac_key.as_ref());
        identity.encrypt(&blob)
    }

    /// Unseal key material and reconstitute the cipher.
    ///
    /// Any length other than exactly 112 bytes after decryption is a
    /// corruption signal and fails hard.
    pub fn unseal_key_material(identity: &Identity, sealed: &[u8]) -> NodeResult<Self> {
        let plaintext = Zeroizing::new(identity.decrypt(sealed)?);
        if plaintext.len() != KEY_MATERIAL_LEN {
            return Err(NodeError::Length(format!(
                "sealed key material has wrong length: {} bytes (expected {KEY_MATERIAL_LEN})",
                plaintext.len()
            )));
        }

        let mut seed = [0u8; SEED_LEN];
        seed.copy_from_slice(&plaintext[..SEED_LEN]);
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&plaintext[SEED_LEN..SEED_LEN + KEY_LEN]);
        let mut hmac_key = Zeroizing::new([0u8; HMAC_KEY_LEN]);
        hmac_key.copy_from_slice(&plaintext[SEED_LEN + KEY_LEN..]);

        Ok(Self::from_parts(key, seed, hmac_key))
    }

    #[cfg(test)]
    pub(crate) fn clone_state(&self) -> Self {
        Self::from_parts(self.key.clone(), self.seed, self.hmac_key.clone())
    }
}
