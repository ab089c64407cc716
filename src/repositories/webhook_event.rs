//! Webhook event queue repository
//!
//! Backs the batch processor. Claiming uses a select-then-conditional-update
//! inside a transaction so overlapping processor runs never pick up the same
//! event twice.

use anyhow::Result;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::webhook_event::{self, Entity as WebhookEvent};

/// Repository for the webhook event queue
#[derive(Debug, Clone)]
pub struct WebhookEventRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl WebhookEventRepository {
    /// Creates a new WebhookEventRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Enqueue a verified webhook delivery for later processing
    pub async fn enqueue(
        &self,
        org_id: Uuid,
        provider: &str,
        event_type: &str,
        payload: JsonValue,
    ) -> Result<webhook_event::Model> {
        let event = webhook_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            org_id: Set(org_id),
            provider: Set(provider.to_string()),
            event_type: Set(event_type.to_string()),
            payload: Set(payload),
            status: Set("pending".to_string()),
            error: Set(None),
            claimed_at: Set(None),
            processed_at: Set(None),
            created_at: Set(Utc::now().into()),
        };

        let inserted = event.insert(&*self.db).await?;
        Ok(inserted)
    }

    /// Count events currently awaiting processing
    pub async fn count_pending(&self) -> Result<u64> {
        use sea_orm::PaginatorTrait;
        let count = WebhookEvent::find()
            .filter(webhook_event::Column::Status.eq("pending"))
            .count(&*self.db)
            .await?;
        Ok(count)
    }

    /// Atomically claim up to `batch_size` pending events, oldest first.
    ///
    /// The conditional UPDATE re-checks that each row is still pending, so
    /// two concurrent claimers partition the queue instead of sharing rows.
    pub async fn claim_batch(&self, batch_size: u64) -> Result<Vec<webhook_event::Model>> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let eligible_events = WebhookEvent::find()
            .select_only()
            .column(webhook_event::Column::Id)
            .filter(webhook_event::Column::Status.eq("pending"))
            .order_by_asc(webhook_event::Column::CreatedAt)
            .limit(Some(batch_size))
            .into_tuple::<Uuid>()
            .all(&txn)
            .await?;

        if eligible_events.is_empty() {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        let update_result = WebhookEvent::update_many()
            .col_expr(webhook_event::Column::Status, Expr::value("processing"))
            .col_expr(webhook_event::Column::ClaimedAt, Expr::value(now))
            .filter(webhook_event::Column::Id.is_in(eligible_events.clone()))
            .filter(webhook_event::Column::Status.eq("pending")) // Double-check they're still pending
            .exec(&txn)
            .await?;

        let claimed_events = if update_result.rows_affected > 0 {
            WebhookEvent::find()
                .filter(webhook_event::Column::Id.is_in(eligible_events))
                .filter(webhook_event::Column::Status.eq("processing"))
                .filter(webhook_event::Column::ClaimedAt.eq(now))
                .all(&txn)
                .await?
        } else {
            Vec::new()
        };

        txn.commit().await?;
        Ok(claimed_events)
    }

    /// Mark a claimed event as successfully processed
    pub async fn mark_completed(&self, event: webhook_event::Model) -> Result<()> {
        let mut active: webhook_event::ActiveModel = event.into();
        active.status = Set("completed".to_string());
        active.processed_at = Set(Some(Utc::now().into()));
        active.update(&*self.db).await?;
        Ok(())
    }

    /// Mark a claimed event as failed with a diagnostic message
    pub async fn mark_failed(&self, event: webhook_event::Model, error: &str) -> Result<()> {
        let mut active: webhook_event::ActiveModel = event.into();
        active.status = Set("failed".to_string());
        active.error = Set(Some(error.to_string()));
        active.processed_at = Set(Some(Utc::now().into()));
        active.update(&*self.db).await?;
        Ok(())
    }
}
