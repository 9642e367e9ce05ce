//! Symmetric key type.

use crate::error::{CryptoError, CryptoResult};
use base64::Engine;
use chacha20poly1305::aead::{KeyInit, OsRng};
use chacha20poly1305::ChaCha20Poly1305;
use std::fmt;

/// Key length in bytes.
pub const KEY_LEN: usize = 32;

/// A 256-bit symmetric encryption key.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    bytes: [u8; KEY_LEN],
}

impl EncryptionKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let key = ChaCha20Poly1305::generate_key(&mut OsRng);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(key.as_slice());
        Self { bytes }
    }

    /// Parse from standard or URL-safe base64.
    pub fn from_base64(s: &str) -> CryptoResult<Self> {
        let s = s.trim();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(s)
            .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(s))
            .map_err(|e| CryptoError::KeyParsing(format!("invalid base64: {e}")))?;

        let bytes: [u8; KEY_LEN] = decoded.as_slice().try_into().map_err(|_| {
            CryptoError::KeyParsing(format!(
                "expected {KEY_LEN} bytes, got {}",
                decoded.len()
            ))
        })?;

        Ok(Self { bytes })
    }

    /// Encode as standard base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_base64_roundtrip() {
        let key = EncryptionKey::generate();
        let parsed = EncryptionKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_key_accepts_url_safe() {
        let key = EncryptionKey::generate();
        let url_safe = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(key.as_bytes());
        assert_eq!(EncryptionKey::from_base64(&url_safe).unwrap(), key);
    }

    #[test]
    fn test_key_rejects_wrong_length() {
        let short = base64::engine::general_purpose::STANDARD.encode([7u8; 16]);
        let err = EncryptionKey::from_base64(&short).unwrap_err();
        assert!(err.to_string().contains("expected 32 bytes, got 16"));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = EncryptionKey::generate();
        assert_eq!(format!("{key:?}"), "EncryptionKey([REDACTED])");
    }
}
