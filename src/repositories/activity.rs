//! Activity ledger repository
//!
//! Inserts are the only write path; the ledger is append-only. A unique
//! index on dedupe_key turns webhook redeliveries into detectable no-ops.

use anyhow::{Result, anyhow};
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::activity_record::{self, ActivityDetails, Entity as ActivityRecord};

/// Outcome of an append attempt against the ledger.
#[derive(Debug, Clone)]
pub enum AppendOutcome {
    /// A new row was written
    Inserted(activity_record::Model),
    /// The dedupe key already existed; nothing was written
    Duplicate,
}

/// Repository for activity ledger operations
#[derive(Debug, Clone)]
pub struct ActivityRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl ActivityRepository {
    /// Creates a new ActivityRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Append one attributed event to the ledger.
    ///
    /// A unique violation on dedupe_key is reported as [`AppendOutcome::Duplicate`]
    /// rather than an error, since redelivery is expected provider behavior.
    pub async fn append(
        &self,
        org_id: Uuid,
        actor_id: Option<Uuid>,
        resource_id: Option<Uuid>,
        summary: String,
        details: &ActivityDetails,
        dedupe_key: Option<String>,
    ) -> Result<AppendOutcome> {
        let record = activity_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            org_id: Set(org_id),
            action_type: Set(details.action_type().to_string()),
            actor_id: Set(actor_id),
            resource_id: Set(resource_id),
            summary: Set(summary),
            details: Set(serde_json::to_value(details)
                .map_err(|e| anyhow!("Failed to serialize activity details: {}", e))?),
            dedupe_key: Set(dedupe_key),
            created_at: Set(Utc::now().into()),
        };

        match record.insert(&*self.db).await {
            Ok(model) => Ok(AppendOutcome::Inserted(model)),
            Err(err) if is_unique_violation(&err) => {
                tracing::debug!(?err, "Duplicate webhook delivery, ledger row already exists");
                Ok(AppendOutcome::Duplicate)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Read a page of the ledger for an org, newest first.
    ///
    /// `before` is an exclusive created_at cursor for walking older pages.
    pub async fn list(
        &self,
        org_id: &Uuid,
        limit: u64,
        before: Option<DateTime<FixedOffset>>,
    ) -> Result<Vec<activity_record::Model>> {
        let mut query = ActivityRecord::find()
            .filter(activity_record::Column::OrgId.eq(*org_id));
        if let Some(before) = before {
            query = query.filter(activity_record::Column::CreatedAt.lt(before));
        }
        let records = query
            .order_by_desc(activity_record::Column::CreatedAt)
            .limit(Some(limit))
            .all(&*self.db)
            .await?;
        Ok(records)
    }

    /// Read ledger rows for one actor, newest first.
    pub async fn list_for_actor(
        &self,
        org_id: &Uuid,
        actor_id: &Uuid,
        limit: u64,
        before: Option<DateTime<FixedOffset>>,
    ) -> Result<Vec<activity_record::Model>> {
        let mut query = ActivityRecord::find()
            .filter(activity_record::Column::OrgId.eq(*org_id))
            .filter(activity_record::Column::ActorId.eq(*actor_id));
        if let Some(before) = before {
            query = query.filter(activity_record::Column::CreatedAt.lt(before));
        }
        let records = query
            .order_by_desc(activity_record::Column::CreatedAt)
            .limit(Some(limit))
            .all(&*self.db)
            .await?;
        Ok(records)
    }
}
