//! Agent key repository for database operations

use anyhow::Result;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::agent_key::{self, Entity as AgentKey};

/// Repository for agent key operations
#[derive(Debug, Clone)]
pub struct AgentKeyRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl AgentKeyRepository {
    /// Creates a new AgentKeyRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Look up a key by the SHA-256 hash of the presented plaintext.
    ///
    /// Status is not filtered here; the caller distinguishes inactive keys
    /// from unknown ones so it can answer 403 instead of 401.
    pub async fn find_by_hash(&self, key_hash: &str) -> Result<Option<agent_key::Model>> {
        let found = AgentKey::find()
            .filter(agent_key::Column::KeyHash.eq(key_hash))
            .one(&*self.db)
            .await?;
        Ok(found)
    }

    /// Record a successful authentication with this key
    pub async fn touch_last_used(&self, key: agent_key::Model) -> Result<()> {
        let mut active: agent_key::ActiveModel = key.into();
        active.last_used_at = Set(Some(Utc::now().into()));
        active.update(&*self.db).await?;
        Ok(())
    }

    /// Mint a new key row (hash only; plaintext never reaches the database)
    pub async fn insert(
        &self,
        org_id: Uuid,
        key_hash: &str,
        name: &str,
    ) -> Result<agent_key::Model> {
        let key = agent_key::ActiveModel {
            id: Set(Uuid::new_v4()),
            org_id: Set(org_id),
            key_hash: Set(key_hash.to_string()),
            name: Set(name.to_string()),
            status: Set("active".to_string()),
            last_used_at: Set(None),
            created_at: Set(Utc::now().into()),
        };

        let inserted = key.insert(&*self.db).await?;
        Ok(inserted)
    }
}
