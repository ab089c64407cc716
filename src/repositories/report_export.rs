//! Report export repository
//!
//! The content hash is the identity of a report. Concurrent uploads of the
//! same bytes race on the unique index and the loser reads back the winner,
//! so notarization is idempotent under contention.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::report_export::{self, Entity as ReportExport};

/// Outcome of a notarization attempt.
#[derive(Debug, Clone)]
pub enum NotarizeOutcome {
    /// First time these bytes were seen
    Created(report_export::Model),
    /// The hash was already notarized; the original row is returned
    Existing(report_export::Model),
}

/// Repository for report export operations
#[derive(Debug, Clone)]
pub struct ReportExportRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl ReportExportRepository {
    /// Creates a new ReportExportRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Look up a notarized report by its content hash
    pub async fn find_by_hash(&self, content_hash: &str) -> Result<Option<report_export::Model>> {
        let found = ReportExport::find()
            .filter(report_export::Column::ContentHash.eq(content_hash))
            .one(&*self.db)
            .await?;
        Ok(found)
    }

    /// Record a notarized report. Losing a unique-index race resolves to the
    /// existing row instead of an error.
    pub async fn record(
        &self,
        org_id: Uuid,
        content_hash: &str,
        storage_location: &str,
        platform: &str,
        file_name: Option<String>,
        size_bytes: i64,
    ) -> Result<NotarizeOutcome> {
        let export = report_export::ActiveModel {
            id: Set(Uuid::new_v4()),
            org_id: Set(org_id),
            content_hash: Set(content_hash.to_string()),
            storage_location: Set(storage_location.to_string()),
            platform: Set(platform.to_string()),
            file_name: Set(file_name),
            size_bytes: Set(size_bytes),
            created_at: Set(Utc::now().into()),
        };

        match export.insert(&*self.db).await {
            Ok(model) => Ok(NotarizeOutcome::Created(model)),
            Err(err) if is_unique_violation(&err) => {
                let existing = self
                    .find_by_hash(content_hash)
                    .await?
                    .ok_or_else(|| anyhow!("Report vanished after unique violation"))?;
                Ok(NotarizeOutcome::Existing(existing))
            }
            Err(err) => Err(err.into()),
        }
    }
}
