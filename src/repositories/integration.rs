//! Integration repository for database operations
//!
//! Encapsulates SeaORM operations for the integrations table. Token columns
//! only ever hold vault envelopes; plaintext crosses this boundary solely as
//! function arguments and return values.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::integration::{self, Entity as Integration};
use crate::vault::{TokenVault, decrypt_integration_tokens, encrypt_integration_tokens};

/// Repository for integration database operations
#[derive(Debug, Clone)]
pub struct IntegrationRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    /// Vault used to seal and open token envelopes
    pub vault: TokenVault,
}

impl IntegrationRepository {
    /// Creates a new IntegrationRepository instance
    pub fn new(db: Arc<DatabaseConnection>, vault: TokenVault) -> Self {
        Self { db, vault }
    }

    /// Fetch an integration by ID
    pub async fn get_by_id(&self, integration_id: &Uuid) -> Result<Option<integration::Model>> {
        let found = Integration::find_by_id(*integration_id)
            .one(&*self.db)
            .await?;
        Ok(found)
    }

    /// Fetch all active integrations for providers that support refresh
    pub async fn find_active(&self) -> Result<Vec<integration::Model>> {
        let integrations = Integration::find()
            .filter(integration::Column::Status.eq("active"))
            .all(&*self.db)
            .await?;
        Ok(integrations)
    }

    /// Decrypts tokens from an integration model
    pub async fn decrypt_tokens(
        &self,
        integration: &integration::Model,
    ) -> Result<(Option<String>, Option<String>)> {
        let (access, refresh) =
            decrypt_integration_tokens(&self.vault, integration).map_err(|e| {
                // Log decryption failures without credential details
                tracing::error!(
                    org_id = %integration.org_id,
                    provider = %integration.provider,
                    "Token decryption failed"
                );
                anyhow!("Token decryption failed: {}", e)
            })?;
        Ok((access, refresh))
    }

    /// Encrypts the new token pair and persists it with refreshed expiry
    /// metadata, superseding the previous envelopes in place.
    pub async fn rotate_tokens(
        &self,
        integration_id: &Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in: Option<i64>,
        refresh_token_expires_in: Option<i64>,
    ) -> Result<integration::Model> {
        let integration = self
            .get_by_id(integration_id)
            .await?
            .ok_or_else(|| anyhow!("Integration with ID '{}' not found", integration_id))?;

        let (encrypted_access, encrypted_refresh) = encrypt_integration_tokens(
            &self.vault,
            &integration,
            Some(access_token),
            refresh_token,
        )
        .map_err(|e| anyhow!("Token encryption failed: {}", e))?;

        let mut active: integration::ActiveModel = integration.into();
        active.access_token_ciphertext = Set(encrypted_access);
        if encrypted_refresh.is_some() {
            // Providers that omit the refresh token on rotation keep the old one
            active.refresh_token_ciphertext = Set(encrypted_refresh);
        }
        active.expires_in = Set(expires_in);
        active.refresh_token_expires_in = Set(refresh_token_expires_in);
        active.token_issued_at = Set(Some(Utc::now().into()));
        active.status = Set("active".to_string());
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(&*self.db).await?;
        Ok(updated)
    }

    /// Transition an integration's status (active|revoked|error)
    pub async fn mark_status(
        &self,
        integration_id: &Uuid,
        status: &str,
    ) -> Result<integration::Model> {
        let integration = self
            .get_by_id(integration_id)
            .await?
            .ok_or_else(|| anyhow!("Integration with ID '{}' not found", integration_id))?;

        let mut active: integration::ActiveModel = integration.into();
        active.status = Set(status.to_string());
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(&*self.db).await?;
        Ok(updated)
    }
}
