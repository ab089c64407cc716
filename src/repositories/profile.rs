//! Profile repository for database operations
//!
//! Encapsulates SeaORM operations for the profiles table, including the
//! platform identity map used by attribution and the identity link operation.

use anyhow::{Result, anyhow};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::profile::{self, Entity as Profile};

/// Repository for profile database operations
#[derive(Debug, Clone)]
pub struct ProfileRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl ProfileRepository {
    /// Creates a new ProfileRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Fetch a profile by ID
    pub async fn get_by_id(&self, profile_id: &Uuid) -> Result<Option<profile::Model>> {
        let found = Profile::find_by_id(*profile_id).one(&*self.db).await?;
        Ok(found)
    }

    /// Fetch every profile in an org that has at least one platform identity.
    ///
    /// The identity resolver loads this working set and matches handles in
    /// memory; profiles without identities can never match.
    pub async fn find_with_platform_identities(
        &self,
        org_id: &Uuid,
    ) -> Result<Vec<profile::Model>> {
        let profiles = Profile::find()
            .filter(profile::Column::OrgId.eq(*org_id))
            .filter(profile::Column::PlatformIdentities.is_not_null())
            .all(&*self.db)
            .await?;
        Ok(profiles)
    }

    /// Replace the identity entry for one platform on a profile.
    ///
    /// The caller is responsible for conflict checking against other
    /// profiles in the org before writing.
    pub async fn set_platform_identity(
        &self,
        profile_id: &Uuid,
        platform: &str,
        handle: &str,
    ) -> Result<profile::Model> {
        let existing = self
            .get_by_id(profile_id)
            .await?
            .ok_or_else(|| anyhow!("Profile with ID '{}' not found", profile_id))?;

        let mut identities = match existing.platform_identities.clone() {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        identities.insert(
            platform.to_string(),
            serde_json::json!({ "handle": handle }),
        );

        let mut active: profile::ActiveModel = existing.into();
        active.platform_identities = Set(Some(serde_json::Value::Object(identities)));
        active.updated_at = Set(chrono::Utc::now().into());

        let updated = active.update(&*self.db).await?;
        Ok(updated)
    }
}
