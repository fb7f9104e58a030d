//! Cipher trait for swappable authenticated encryption backends.

use crate::error::VaultError;

/// Authenticated encryption with associated data (AEAD).
///
/// Each implementation has a unique version tag stored as the first byte of
/// every blob, so a future cipher can coexist with blobs sealed by this one.
pub trait Cipher: Send + Sync {
    /// Unique identifier for this cipher.
    fn version_tag(&self) -> u8;

    /// Seal `plaintext` under `key`, binding `aad`.
    ///
    /// Returns `[nonce || ciphertext || tag]`. Every call must use a fresh
    /// nonce so identical plaintexts never produce identical output.
    fn encrypt(&self, key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, VaultError>;

    /// Open a blob previously produced by [`encrypt`](Self::encrypt).
    ///
    /// Must fail with [`VaultError::Crypto`] on any integrity violation.
    fn decrypt(&self, key: &[u8; 32], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, VaultError>;
}
