//! Registry credentials with lazy encrypt-at-rest migration.
//!
//! Legacy rows hold the registry password in plaintext. Whenever registry details
//! are read, a configured cipher moves the password into the ciphertext column and
//! nulls the plaintext in the same write. A row with no plaintext is left alone, so
//! the migration runs at most once per row.

use shipwright_crypto::{Cipher, CryptoError};
use shipwright_metadata::models::RegistryDetailsRow;
use shipwright_metadata::repos::RegistryRepo;
use shipwright_metadata::{MetadataError, MetadataStore};
use std::sync::Arc;
use uuid::Uuid;

/// Registry credential errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{0}")]
    Metadata(#[from] MetadataError),

    #[error("{0}")]
    Crypto(#[from] CryptoError),

    #[error("registry password is encrypted but no encryption key is configured")]
    MissingKey,
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Registry settings with the password in memory as plaintext.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RegistryDetails {
    pub hostname: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub namespace: Option<String>,
}

impl std::fmt::Debug for RegistryDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryDetails")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Read and write paths for registry credentials.
#[derive(Clone)]
pub struct RegistryService {
    metadata: Arc<dyn MetadataStore>,
    cipher: Option<Arc<dyn Cipher>>,
}

impl RegistryService {
    pub fn new(metadata: Arc<dyn MetadataStore>, cipher: Option<Arc<dyn Cipher>>) -> Self {
        Self { metadata, cipher }
    }

    /// Move a plaintext password to the ciphertext column.
    ///
    /// No-op without a cipher, when ciphertext is already present, or when there is
    /// no plaintext. Returns the row as stored afterwards.
    pub async fn ensure_encrypted(
        &self,
        creds: RegistryDetailsRow,
    ) -> RegistryResult<RegistryDetailsRow> {
        let Some(cipher) = &self.cipher else {
            return Ok(creds);
        };
        if creds.password_enc.is_some() {
            return Ok(creds);
        }
        let Some(plaintext) = creds.password.as_deref() else {
            return Ok(creds);
        };

        let ciphertext = cipher.encrypt(plaintext)?;
        self.metadata
            .set_encrypted_password(creds.app_id, &ciphertext)
            .await?;
        crate::metrics::REGISTRY_PASSWORDS_MIGRATED.inc();
        tracing::info!(app_id = %creds.app_id, "migrated registry password to ciphertext");

        Ok(RegistryDetailsRow {
            password: None,
            password_enc: Some(ciphertext),
            ..creds
        })
    }

    /// Plaintext password for in-process use. Never writes plaintext back.
    pub fn ensure_decrypted(&self, creds: &RegistryDetailsRow) -> RegistryResult<Option<String>> {
        if let Some(password) = &creds.password {
            return Ok(Some(password.clone()));
        }
        let Some(ciphertext) = creds.password_enc.as_deref() else {
            return Ok(None);
        };
        let cipher = self.cipher.as_ref().ok_or(RegistryError::MissingKey)?;
        Ok(Some(cipher.decrypt(ciphertext)?))
    }

    /// Read path: migrate if needed, then decrypt in memory.
    pub async fn get_registry_details(&self, app_id: Uuid) -> RegistryResult<RegistryDetails> {
        let row = self
            .metadata
            .get_registry_details(app_id)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("app {app_id}")))?;

        let row = self.ensure_encrypted(row).await?;
        let password = self.ensure_decrypted(&row)?;

        Ok(RegistryDetails {
            hostname: row.hostname,
            username: row.username,
            password,
            namespace: row.namespace,
        })
    }

    /// Write path. Encrypts when a cipher is configured, else stores plaintext.
    /// A `None` password keeps whatever is stored.
    pub async fn update_registry_details(
        &self,
        app_id: Uuid,
        hostname: &str,
        username: &str,
        password: Option<&str>,
        namespace: &str,
    ) -> RegistryResult<()> {
        let (plaintext, ciphertext) = match password {
            Some(password) => match &self.cipher {
                Some(cipher) => (None, Some(cipher.encrypt(password)?)),
                None => (Some(password.to_string()), None),
            },
            None => {
                let existing = self
                    .metadata
                    .get_registry_details(app_id)
                    .await?
                    .ok_or_else(|| MetadataError::NotFound(format!("app {app_id}")))?;
                (existing.password, existing.password_enc)
            }
        };

        self.metadata
            .update_registry_details(
                app_id,
                hostname,
                username,
                plaintext.as_deref(),
                ciphertext.as_deref(),
                namespace,
            )
            .await?;
        Ok(())
    }
}
