//! Encrypt/decrypt boundary and its ChaCha20-Poly1305 implementation.

use crate::error::{CryptoError, CryptoResult};
use crate::key::EncryptionKey;
use base64::Engine;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

const NONCE_LEN: usize = 12;

/// Synchronous encryption service keyed by a configured key.
pub trait Cipher: Send + Sync {
    /// Encrypt UTF-8 plaintext into a printable ciphertext.
    fn encrypt(&self, plaintext: &str) -> CryptoResult<String>;

    /// Invert [`Cipher::encrypt`].
    fn decrypt(&self, ciphertext: &str) -> CryptoResult<String>;
}

/// ChaCha20-Poly1305 cipher producing `base64(nonce || ciphertext)`.
pub struct ChaChaCipher {
    aead: ChaCha20Poly1305,
}

impl ChaChaCipher {
    pub fn new(key: EncryptionKey) -> Self {
        let aead = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        Self { aead }
    }
}

impl Cipher for ChaChaCipher {
    fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = self
            .aead
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&sealed);
        Ok(base64::engine::general_purpose::STANDARD.encode(out))
    }

    fn decrypt(&self, ciphertext: &str) -> CryptoResult<String> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| CryptoError::InvalidCiphertext(format!("invalid base64: {e}")))?;
        if raw.len() <= NONCE_LEN {
            return Err(CryptoError::InvalidCiphertext(format!(
                "ciphertext too short: {} bytes",
                raw.len()
            )));
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|e| CryptoError::Decryption(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::Decryption(format!("plaintext is not utf-8: {e}")))
    }
}
