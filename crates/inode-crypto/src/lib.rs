//! inode-crypto: encryption primitives for information-node items.
//!
//! Layering, leaves first:
//!
//! ```text
//! Identity (RSA keypair)
//!   └── StreamCipher (AES-256-CTR, seekable counter; key material sealed via an Identity)
//!         └── EncryptionStrategy
//!               ├── Password    (identity gated behind a passphrase)
//!               └── TargetNode  (sealed for a peer's public identity)
//! ```
//!
//! RSA is only ever used to seal the 112-byte symmetric key blob of a
//! stream cipher, never bulk data; items themselves are encrypted with
//! AES-CTR so chunk payloads can be re-read from arbitrary block-aligned
//! offsets.

pub mod identity;
pub mod stream;
pub mod strategy;

pub use identity::Identity;
pub use stream::StreamCipher;
pub use strategy::{EncryptionKind, EncryptionStrategy, PasswordEncryption, TargetNodeEncryption};

/// Default RSA key size for freshly generated identities.
pub const DEFAULT_IDENTITY_BITS: usize = 4096;

/// Minimum key size accepted for identities used to seal item keys.
pub const MIN_SEAL_BITS: usize = 4096;
