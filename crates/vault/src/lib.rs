//! Credential vault: authenticated encryption of bot tokens and session
//! strings at rest.
//!
//! One process-wide 32-byte key is configured at startup. Secrets are sealed
//! with XChaCha20-Poly1305 under a fresh random nonce and stored as opaque
//! base64 blobs. The [`Cipher`] trait allows swapping the encryption backend.

pub mod error;
pub mod traits;
pub mod vault;
pub mod xchacha20;

pub use {
    error::VaultError,
    traits::Cipher,
    vault::{Vault, generate_key},
    xchacha20::XChaCha20Poly1305Cipher,
};
