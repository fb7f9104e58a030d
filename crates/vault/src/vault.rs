//! Process-wide secret vault: key loading, encrypt/decrypt of stored secrets.

use {
    base64::{
        Engine,
        engine::general_purpose::{STANDARD, URL_SAFE},
    },
    rand::RngCore,
    secrecy::ExposeSecret,
    zeroize::Zeroizing,
};

#[cfg(feature = "metrics")]
use ferry_metrics::{counter, vault as vault_metrics};

use crate::{error::VaultError, traits::Cipher, xchacha20::XChaCha20Poly1305Cipher};

/// Associated data bound into every sealed secret.
const SECRET_AAD: &[u8] = b"ferry:resource-secret";

/// Generate a fresh random key, base64 encoded, suitable for `vault.key`.
#[must_use]
pub fn generate_key() -> String {
    let mut key = Zeroizing::new([0u8; 32]);
    rand::rng().fill_bytes(key.as_mut());
    STANDARD.encode(key.as_ref())
}

/// Authenticated symmetric encryption of secrets at rest.
///
/// Generic over [`Cipher`] but defaults to [`XChaCha20Poly1305Cipher`].
/// The key is fixed for the lifetime of the vault and wiped on drop.
pub struct Vault<C: Cipher = XChaCha20Poly1305Cipher> {
    cipher: C,
    key: Zeroizing<[u8; 32]>,
}

impl Vault<XChaCha20Poly1305Cipher> {
    /// Create a vault from a base64-encoded 32-byte key.
    pub fn new(key_b64: &str) -> Result<Self, VaultError> {
        Self::with_cipher(key_b64, XChaCha20Poly1305Cipher)
    }

    /// Create a vault from the `[vault]` config section.
    ///
    /// Fails with [`VaultError::NotConfigured`] when no key is set.
    pub fn from_config(config: &ferry_config::VaultConfig) -> Result<Self, VaultError> {
        let key = config.key.as_ref().ok_or(VaultError::NotConfigured)?;
        Self::new(key.expose_secret())
    }
}

impl<C: Cipher> Vault<C> {
    /// Create a vault with a custom cipher.
    pub fn with_cipher(key_b64: &str, cipher: C) -> Result<Self, VaultError> {
        Ok(Self {
            cipher,
            key: decode_key(key_b64)?,
        })
    }

    /// Encrypt a secret and return a versioned base64 blob.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let sealed = self
            .cipher
            .encrypt(&self.key, plaintext.as_bytes(), SECRET_AAD)?;

        let mut blob = Vec::with_capacity(1 + sealed.len());
        blob.push(self.cipher.version_tag());
        blob.extend_from_slice(&sealed);

        Ok(STANDARD.encode(blob))
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// Every failure (bad encoding, unknown version, integrity check) is a
    /// [`VaultError::Crypto`].
    pub fn decrypt(&self, blob_b64: &str) -> Result<String, VaultError> {
        let result = self.open(blob_b64);

        if let Err(ref _e) = result {
            #[cfg(feature = "metrics")]
            counter!(vault_metrics::DECRYPT_FAILURES_TOTAL).increment(1);
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %_e, "secret failed to decrypt");
        }

        result
    }

    fn open(&self, blob_b64: &str) -> Result<String, VaultError> {
        let blob = STANDARD
            .decode(blob_b64)
            .map_err(|e| VaultError::Crypto(format!("malformed blob: {e}")))?;

        let (&version, sealed) = blob
            .split_first()
            .ok_or_else(|| VaultError::Crypto("empty blob".to_string()))?;
        if version != self.cipher.version_tag() {
            return Err(VaultError::Crypto(format!(
                "unsupported cipher version: {version:#04x}"
            )));
        }

        let plaintext = Zeroizing::new(self.cipher.decrypt(&self.key, sealed, SECRET_AAD)?);
        String::from_utf8(plaintext.to_vec()).map_err(|e| VaultError::Crypto(e.to_string()))
    }
}

impl<C: Cipher> std::fmt::Debug for Vault<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("cipher_version", &self.cipher.version_tag())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Accepts standard or URL-safe base64 (with padding).
fn decode_key(key_b64: &str) -> Result<Zeroizing<[u8; 32]>, VaultError> {
    let trimmed = key_b64.trim();
    if trimmed.is_empty() {
        return Err(VaultError::NotConfigured);
    }

    let raw = Zeroizing::new(
        STANDARD
            .decode(trimmed)
            .or_else(|_| URL_SAFE.decode(trimmed))
            .map_err(|e| VaultError::InvalidKey(e.to_string()))?,
    );
    if raw.len() != 32 {
        return Err(VaultError::InvalidKey(format!(
            "expected 32 bytes, got {}",
            raw.len()
        )));
    }

    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&raw);
    Ok(key)
}
