//! Vault error types.

/// Errors produced by vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// No encryption key was configured.
    #[error("no encryption key configured")]
    NotConfigured,

    /// The configured key is not a base64-encoded 32-byte key.
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    /// A blob failed decoding or integrity verification (tampered data, wrong key).
    #[error("cipher error: {0}")]
    Crypto(String),
}

impl VaultError {
    /// Whether this error stems from configuration rather than from the data.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::NotConfigured | Self::InvalidKey(_))
    }
}
