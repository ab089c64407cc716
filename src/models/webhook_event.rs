//! Webhook event entity model
//!
//! Queue of verified-but-unprocessed webhook deliveries awaiting the batch
//! processor. Status moves pending -> processing -> completed | failed.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Queued webhook event entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "webhook_events")]
pub struct Model {
    /// Unique identifier for the event (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Organization identifier for multi-tenancy
    pub org_id: Uuid,

    /// Provider that delivered the webhook (slack)
    pub provider: String,

    /// Provider event type (message, reaction_added, ...)
    pub event_type: String,

    /// Verified raw event payload
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    /// Lifecycle status (pending|processing|completed|failed)
    pub status: String,

    /// Failure detail for failed events
    pub error: Option<String>,

    /// When the processor claimed this event
    pub claimed_at: Option<DateTimeWithTimeZone>,

    /// When processing finished (success or failure)
    pub processed_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the event was enqueued
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
