//! Crypto error types.

use thiserror::Error;

/// Encryption service errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key parsing error: {0}")]
    KeyParsing(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),
}

/// Result type for crypto operations.
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;
