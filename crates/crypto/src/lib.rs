//! Credential encryption for Shipwright.
//!
//! This crate provides:
//! - 256-bit key parsing and generation
//! - The [`Cipher`] boundary used for encrypt-at-rest credentials
//! - A ChaCha20-Poly1305 implementation of that boundary

pub mod cipher;
pub mod error;
pub mod key;

pub use cipher::{ChaChaCipher, Cipher};
pub use error::{CryptoError, CryptoResult};
pub use key::EncryptionKey;

use std::sync::Arc;

/// Build a cipher from an optional configured key.
///
/// Returns `Ok(None)` when no key is configured.
pub fn from_config(
    config: &shipwright_core::config::CryptoConfig,
) -> CryptoResult<Option<Arc<dyn Cipher>>> {
    match config.encryption_key.as_deref() {
        Some(encoded) => {
            let key = EncryptionKey::from_base64(encoded)?;
            Ok(Some(Arc::new(ChaChaCipher::new(key)) as Arc<dyn Cipher>))
        }
        None => Ok(None),
    }
}
