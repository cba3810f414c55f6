//! RSA identities: generate, load/save as PKCS#8 PEM (optionally
//! passphrase-encrypted), and size-bounded encrypt/decrypt.

use std::path::Path;

use rand::rngs::OsRng;
use rsa::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use secrecy::{ExposeSecret, SecretString};

use inode_core::{NodeError, NodeResult};

/// PKCS#1 v1.5 padding overhead in bytes.
const PADDING_OVERHEAD: usize = 11;

const ENCRYPTED_PEM_TAG: &str = "ENCRYPTED PRIVATE KEY";
const PRIVATE_PEM_TAG: &str = "PRIVATE KEY";

/// An RSA keypair, possibly public-only.
///
/// Sealing item keys requires the public half; unsealing requires the
/// private half. The private key is zeroized when the identity is dropped.
#[derive(Clone)]
pub struct Identity {
    public: RsaPublicKey,
    private: Option<RsaPrivateKey>,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("bits", &self.bits())
            .field("private", &self.private.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Identity {
    /// Generate a fresh keypair of the given size.
    pub fn generate(bits: usize) -> NodeResult<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| NodeError::Crypto(format!("RSA key generation failed: {e}")))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self {
            public,
            private: Some(private),
        })
    }

    /// Load an identity from a PEM file.
    ///
    /// Accepts an encrypted PKCS#8 private key (passphrase required), a
    /// plain PKCS#8 private key, or a public-only SPKI key. Keys smaller
    /// than `min_bits` are rejected with a policy error and the partially
    /// loaded material is dropped.
    pub fn load(
        path: impl AsRef<Path>,
        passphrase: Option<&SecretString>,
        min_bits: usize,
    ) -> NodeResult<Self> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path)?;

        let identity = if pem.contains(ENCRYPTED_PEM_TAG) {
            let passphrase = passphrase.ok_or_else(|| {
                NodeError::Auth(format!(
                    "identity {} is passphrase-protected but no passphrase was given",
                    path.display()
                ))
            })?;
            let private = RsaPrivateKey::from_pkcs8_encrypted_pem(
                &pem,
                passphrase.expose_secret().as_bytes(),
            )
            .map_err(|e| {
                NodeError::Auth(format!("decrypting identity {} failed: {e}", path.display()))
            })?;
            let public = RsaPublicKey::from(&private);
            Self {
                public,
                private: Some(private),
            }
        } else if pem.contains(PRIVATE_PEM_TAG) {
            let private = RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| {
                NodeError::Format(format!("parsing identity {} failed: {e}", path.display()))
            })?;
            let public = RsaPublicKey::from(&private);
            Self {
                public,
                private: Some(private),
            }
        } else {
            let public = RsaPublicKey::from_public_key_pem(&pem).map_err(|e| {
                NodeError::Format(format!("parsing identity {} failed: {e}", path.display()))
            })?;
            Self {
                public,
                private: None,
            }
        };

        if identity.bits() < min_bits {
            // identity is dropped here, discarding the loaded key material
            return Err(NodeError::Policy(format!(
                "identity {} has {} bits, below the required minimum of {min_bits}",
                path.display(),
                identity.bits()
            )));
        }
        Ok(identity)
    }

    /// Key size in bits.
    pub fn bits(&self) -> usize {
        self.public.size() * 8
    }

    /// Largest plaintext this identity can seal, in bytes.
    pub fn capacity(&self) -> usize {
        self.public.size().saturating_sub(PADDING_OVERHEAD)
    }

    pub fn has_private(&self) -> bool {
        self.private.is_some()
    }

    /// Strip to the public half (e.g. a peer identity to hand out).
    pub fn public_only(&self) -> Self {
        Self {
            public: self.public.clone(),
            private: None,
        }
    }

    /// Seal a small payload under the public key.
    ///
    /// The payload ceiling is enforced before calling into the primitive;
    /// anything larger belongs in an AES stream whose key gets sealed
    /// instead.
    pub fn encrypt(&self, plaintext: &[u8]) -> NodeResult<Vec<u8>> {
        if plaintext.len() > self.capacity() {
            return Err(NodeError::Size {
                actual: plaintext.len(),
                limit: self.capacity(),
            });
        }
        self.public
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, plaintext)
            .map_err(|e| NodeError::Crypto(format!("RSA encryption failed: {e}")))
    }

    /// Unseal a payload with the private key.
    ///
    /// Fails hard when the private half is absent or the ciphertext does
    /// not decrypt under this key; garbage is never returned.
    pub fn decrypt(&self, ciphertext: &[u8]) -> NodeResult<Vec<u8>> {
        let private = self.private.as_ref().ok_or_else(|| {
            NodeError::Auth("identity has no private key, cannot decrypt".into())
        })?;
        private
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(|e| NodeError::Auth(format!("RSA decryption failed: {e}")))
    }

    /// Persist the identity, private key included.
    ///
    /// With a passphrase the private key is written as encrypted PKCS#8
    /// (PBES2); without one it is written in the clear.
    pub fn save(&self, path: impl AsRef<Path>, passphrase: Option<&SecretString>) -> NodeResult<()> {
        let private = self.private.as_ref().ok_or_else(|| {
            NodeError::Permission("cannot save an identity without private key material".into())
        })?;
        let pem = match passphrase {
            Some(passphrase) => private
                .to_pkcs8_encrypted_pem(&mut OsRng, passphrase.expose_secret().as_bytes(), LineEnding::LF)
                .map_err(|e| NodeError::Crypto(format!("encrypting private key failed: {e}")))?,
            None => private
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| NodeError::Crypto(format!("encoding private key failed: {e}")))?,
        };
        std::fs::write(path.as_ref(), pem.as_bytes())?;
        Ok(())
    }

    /// Persist only the public half (SPKI PEM).
    pub fn save_public(&self, path: impl AsRef<Path>) -> NodeResult<()> {
        let pem = self
            .public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| NodeError::Crypto(format!("encoding public key failed: {e}")))?;
        std::fs::write(path.as_ref(), pem.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::OnceLock;

    /// Test keys are 1024-bit: big enough to seal a 112-byte key blob,
    /// cheap enough to generate in a debug build. Generated once.
    pub(crate) const TEST_BITS: usize = 1024;

    static TEST_IDENTITY: OnceLock<Identity> = OnceLock::new();

    pub(crate) fn test_identity() -> &'static Identity {
        TEST_IDENTITY.get_or_init(|| Identity::generate(TEST_BITS).unwrap())
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let id = test_identity();
        let plaintext = b"sealed symmetric key material";
        let ciphertext = id.encrypt(plaintext).unwrap();
        assert_ne!(&ciphertext[..], &plaintext[..]);
        assert_eq!(id.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_capacity_roundtrip_at_limit() {
        let id = test_identity();
        let plaintext = vec![0x5au8; id.capacity()];
        let ciphertext = id.encrypt(&plaintext).unwrap();
        assert_eq!(id.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let id = test_identity();
        let plaintext = vec![0u8; id.capacity() + 1];
        match id.encrypt(&plaintext) {
            Err(NodeError::Size { actual, limit }) => {
                assert_eq!(actual, limit + 1);
            }
            other => panic!("expected size error, got {other:?}"),
        }
    }

    #[test]
    fn test_decrypt_without_private_key() {
        let id = test_identity();
        let public = id.public_only();
        assert!(!public.has_private());
        let ciphertext = public.encrypt(b"data").unwrap();
        match public.decrypt(&ciphertext) {
            Err(NodeError::Auth(_)) => {}
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let id = test_identity();
        let other = Identity::generate(TEST_BITS).unwrap();
        let ciphertext = id.encrypt(b"data").unwrap();
        assert!(other.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn test_save_load_plain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.pem");
        let id = test_identity();
        id.save(&path, None).unwrap();

        let loaded = Identity::load(&path, None, TEST_BITS).unwrap();
        assert!(loaded.has_private());
        let ciphertext = id.encrypt(b"hello").unwrap();
        assert_eq!(loaded.decrypt(&ciphertext).unwrap(), b"hello");
    }

    #[test]
    fn test_save_load_with_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.pem");
        let id = test_identity();
        let passphrase = SecretString::from("correct horse");
        id.save(&path, Some(&passphrase)).unwrap();

        // no passphrase
        match Identity::load(&path, None, TEST_BITS) {
            Err(NodeError::Auth(_)) => {}
            other => panic!("expected auth error, got {other:?}"),
        }
        // wrong passphrase
        let wrong = SecretString::from("wrong");
        assert!(matches!(
            Identity::load(&path, Some(&wrong), TEST_BITS),
            Err(NodeError::Auth(_))
        ));
        // right passphrase
        let loaded = Identity::load(&path, Some(&passphrase), TEST_BITS).unwrap();
        assert!(loaded.has_private());
    }

    #[test]
    fn test_load_below_minimum_is_policy_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.pem");
        test_identity().save(&path, None).unwrap();

        match Identity::load(&path, None, crate::MIN_SEAL_BITS) {
            Err(NodeError::Policy(_)) => {}
            other => panic!("expected policy error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_garbage_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.pem");
        std::fs::write(&path, b"this is not a key").unwrap();
        assert!(matches!(
            Identity::load(&path, None, TEST_BITS),
            Err(NodeError::Format(_))
        ));
    }

    #[test]
    fn test_save_public_only_is_permission_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.pem");
        let public = test_identity().public_only();
        assert!(matches!(
            public.save(&path, None),
            Err(NodeError::Permission(_))
        ));
        // the public half alone can still be exported
        public.save_public(&path).unwrap();
        let loaded = Identity::load(&path, None, TEST_BITS).unwrap();
        assert!(!loaded.has_private());
    }
}
