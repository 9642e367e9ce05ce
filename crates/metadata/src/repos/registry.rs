//! Registry credentials repository trait.

use crate::error::MetadataResult;
use crate::models::RegistryDetailsRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for per-application registry credentials.
#[async_trait]
pub trait RegistryRepo: Send + Sync {
    async fn get_registry_details(&self, app_id: Uuid)
    -> MetadataResult<Option<RegistryDetailsRow>>;

    /// Replace the registry settings.
    ///
    /// When `password_enc` is given the plaintext column is nulled in the same
    /// statement; otherwise `password` is stored as plaintext and any ciphertext
    /// is cleared.
    async fn update_registry_details(
        &self,
        app_id: Uuid,
        hostname: &str,
        username: &str,
        password: Option<&str>,
        password_enc: Option<&str>,
        namespace: &str,
    ) -> MetadataResult<()>;

    /// Store ciphertext and null the plaintext column in one write.
    async fn set_encrypted_password(&self, app_id: Uuid, ciphertext: &str)
    -> MetadataResult<()>;
}
