//! Item encryption strategies.
//!
//! A strategy binds a seekable stream cipher to a sealing identity and
//! owns the on-disk key files of one item version:
//!
//! - `rsa_identity.pem`: passphrase-encrypted identity (password strategy)
//! - `peer_identity.pem`: the peer's public identity (target-node strategy)
//! - `key_info.bin`: the cipher's 112-byte key blob, RSA-sealed

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use inode_core::{NodeError, NodeResult};

use crate::identity::Identity;
use crate::stream::StreamCipher;

pub const IDENTITY_FILE: &str = "rsa_identity.pem";
pub const PEER_FILE: &str = "peer_identity.pem";
pub const KEY_INFO_FILE: &str = "key_info.bin";

/// Strategy tag persisted in item metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionKind {
    Password,
    TargetNode,
}

/// How an item's chunk payloads are encrypted.
#[derive(Debug)]
pub enum EncryptionStrategy {
    Password(PasswordEncryption),
    TargetNode(TargetNodeEncryption),
}

impl EncryptionStrategy {
    pub fn kind(&self) -> EncryptionKind {
        match self {
            EncryptionStrategy::Password(_) => EncryptionKind::Password,
            EncryptionStrategy::TargetNode(_) => EncryptionKind::TargetNode,
        }
    }

    /// Load the strategy for an existing item version in its initial
    /// (locked / key-less) state.
    pub fn load(kind: EncryptionKind, dir: impl Into<PathBuf>, min_bits: usize) -> NodeResult<Self> {
        match kind {
            EncryptionKind::Password => {
                Ok(EncryptionStrategy::Password(PasswordEncryption::load(dir, min_bits)))
            }
            EncryptionKind::TargetNode => Ok(EncryptionStrategy::TargetNode(
                TargetNodeEncryption::load(dir, min_bits)?,
            )),
        }
    }

    /// Encrypt a chunk payload that will live at `byte_offset` in the
    /// item's content stream. The offset must be block-aligned.
    pub fn encrypt_at(&mut self, byte_offset: u64, data: &[u8]) -> NodeResult<Vec<u8>> {
        let cipher = self.cipher_mut()?;
        cipher.seek(byte_offset)?;
        Ok(cipher.encrypt(data))
    }

    /// Decrypt a chunk payload stored at `byte_offset`.
    pub fn decrypt_at(&mut self, byte_offset: u64, data: &[u8]) -> NodeResult<Vec<u8>> {
        let cipher = self.cipher_mut()?;
        cipher.seek(byte_offset)?;
        Ok(cipher.decrypt(data))
    }

    fn cipher_mut(&mut self) -> NodeResult<&mut StreamCipher> {
        match self {
            EncryptionStrategy::Password(p) => p.cipher_mut(),
            EncryptionStrategy::TargetNode(t) => t.cipher_mut(),
        }
    }
}

// ── Password-based encryption ─────────────────────────────────────────────

enum PasswordState {
    Locked,
    Unlocked {
        identity: Identity,
        cipher: StreamCipher,
    },
}

/// Encryption gated behind a user passphrase.
///
/// The sealing identity's private key lives on disk encrypted with the
/// passphrase; `lock` drops all resident key material, `unlock` re-derives
/// the identity and unseals the cipher. Exactly one of locked/unlocked
/// holds at any time.
pub struct PasswordEncryption {
    dir: PathBuf,
    min_bits: usize,
    state: PasswordState,
}

impl std::fmt::Debug for PasswordEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordEncryption")
            .field("dir", &self.dir)
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl PasswordEncryption {
    /// Create a fresh password encryption in `dir`: generates a new
    /// identity and cipher, writes the passphrase-encrypted identity and
    /// the sealed key blob, and starts out unlocked.
    pub fn create(
        dir: impl Into<PathBuf>,
        passphrase: &SecretString,
        bits: usize,
    ) -> NodeResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let identity = Identity::generate(bits)?;
        let cipher = StreamCipher::generate()?;

        identity.save(dir.join(IDENTITY_FILE), Some(passphrase))?;
        let sealed = cipher.seal_key_material(&identity)?;
        std::fs::write(dir.join(KEY_INFO_FILE), sealed)?;

        Ok(Self {
            dir,
            min_bits: bits,
            state: PasswordState::Unlocked { identity, cipher },
        })
    }

    /// Open an existing password encryption in its locked state.
    pub fn load(dir: impl Into<PathBuf>, min_bits: usize) -> Self {
        Self {
            dir: dir.into(),
            min_bits,
            state: PasswordState::Locked,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.state, PasswordState::Locked)
    }

    /// Drop all key material from memory. The identity's private key and
    /// the cipher's symmetric keys are zeroized as they are dropped.
    pub fn lock(&mut self) {
        self.state = PasswordState::Locked;
    }

    /// Reload the identity with the passphrase and unseal the cipher.
    pub fn unlock(&mut self, passphrase: &SecretString) -> NodeResult<()> {
        let identity = Identity::load(
            self.dir.join(IDENTITY_FILE),
            Some(passphrase),
            self.min_bits,
        )?;
        let mut sealed = std::fs::read(self.dir.join(KEY_INFO_FILE))?;
        let result = StreamCipher::unseal_key_material(&identity, &sealed);
        sealed.zeroize();
        let cipher = result?;
        self.state = PasswordState::Unlocked { identity, cipher };
        Ok(())
    }

    fn cipher_mut(&mut self) -> NodeResult<&mut StreamCipher> {
        match &mut self.state {
            PasswordState::Locked => Err(NodeError::State(
                "item encryption is locked; unlock with the passphrase first".into(),
            )),
            PasswordState::Unlocked { cipher, .. } => Ok(cipher),
        }
    }
}

// ── Target-node encryption ────────────────────────────────────────────────

/// Encryption sealed for another node's public identity.
///
/// Sealing always works (the peer's public key is at hand); unsealing
/// requires the peer's private key to be supplied explicitly, which is an
/// administrative exception rather than the normal path: the sender
/// produces ciphertext it cannot open itself.
pub struct TargetNodeEncryption {
    dir: PathBuf,
    min_bits: usize,
    peer: Identity,
    cipher: Option<StreamCipher>,
}

impl std::fmt::Debug for TargetNodeEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetNodeEncryption")
            .field("dir", &self.dir)
            .field("peer_bits", &self.peer.bits())
            .field("cipher", &self.cipher.is_some())
            .finish()
    }
}

impl TargetNodeEncryption {
    /// Create a fresh target-node encryption in `dir`, sealed under the
    /// given peer identity. The cipher starts out resident, so newly
    /// written chunks can be encrypted immediately.
    pub fn create(dir: impl Into<PathBuf>, peer: Identity, min_bits: usize) -> NodeResult<Self> {
        let dir = dir.into();
        if peer.bits() < min_bits {
            return Err(NodeError::Policy(format!(
                "peer identity has {} bits, below the required minimum of {min_bits}",
                peer.bits()
            )));
        }
        std::fs::create_dir_all(&dir)?;

        let cipher = StreamCipher::generate()?;
        let sealed = cipher.seal_key_material(&peer)?;
        std::fs::write(dir.join(KEY_INFO_FILE), sealed)?;
        peer.public_only().save_public(dir.join(PEER_FILE))?;

        Ok(Self {
            dir,
            min_bits,
            peer,
            cipher: Some(cipher),
        })
    }

    /// Open an existing target-node encryption. Without the peer's private
    /// key the cipher stays absent; if the stored peer identity file
    /// happens to carry the private half, the cipher is unsealed directly.
    pub fn load(dir: impl Into<PathBuf>, min_bits: usize) -> NodeResult<Self> {
        let dir = dir.into();
        let peer = Identity::load(dir.join(PEER_FILE), None, min_bits)?;
        let mut this = Self {
            dir,
            min_bits,
            peer,
            cipher: None,
        };
        if this.peer.has_private() {
            let key = this.peer.clone();
            this.unseal_with(&key)?;
        }
        Ok(this)
    }

    /// Supply the peer's private key to allow decryption.
    pub fn set_decryption_key(&mut self, identity: Identity) -> NodeResult<()> {
        if !identity.has_private() {
            return Err(NodeError::Auth(
                "supplied identity has no private key".into(),
            ));
        }
        if identity.bits() < self.min_bits {
            return Err(NodeError::Policy(format!(
                "decryption identity has {} bits, below the required minimum of {}",
                identity.bits(),
                self.min_bits
            )));
        }
        self.unseal_with(&identity)?;
        self.peer = identity;
        Ok(())
    }

    fn unseal_with(&mut self, identity: &Identity) -> NodeResult<()> {
        let mut sealed = std::fs::read(self.dir.join(KEY_INFO_FILE))?;
        let result = StreamCipher::unseal_key_material(identity, &sealed);
        sealed.zeroize();
        self.cipher = Some(result?);
        Ok(())
    }

    fn cipher_mut(&mut self) -> NodeResult<&mut StreamCipher> {
        self.cipher.as_mut().ok_or_else(|| {
            NodeError::State(
                "no decryption key for this target-node encryption; \
                 supply the peer's private identity first"
                    .into(),
            )
        })
    }
}
