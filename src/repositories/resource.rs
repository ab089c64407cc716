//! Monitored resource repository for database operations

use anyhow::Result;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::monitored_resource::{self, Entity as MonitoredResource};

/// Repository for monitored resource database operations
#[derive(Debug, Clone)]
pub struct ResourceRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl ResourceRepository {
    /// Creates a new ResourceRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Look up a monitored resource by its provider-side identifier within
    /// an org. Events on untracked resources attribute with a null resource.
    pub async fn find_by_external_id(
        &self,
        org_id: &Uuid,
        external_id: &str,
    ) -> Result<Option<monitored_resource::Model>> {
        let found = MonitoredResource::find()
            .filter(monitored_resource::Column::OrgId.eq(*org_id))
            .filter(monitored_resource::Column::ExternalId.eq(external_id))
            .one(&*self.db)
            .await?;
        Ok(found)
    }
}
