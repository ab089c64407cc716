//! Monitored resource entity model
//!
//! A monitored resource is a repository, channel, or board tracked for
//! audit purposes, owned by exactly one integration.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Monitored resource entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "monitored_resources")]
pub struct Model {
    /// Unique identifier for the resource (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Integration that owns this resource
    pub integration_id: Uuid,

    /// Organization identifier for multi-tenancy
    pub org_id: Uuid,

    /// Provider-side identifier (repo full name, channel ID)
    pub external_id: String,

    /// Human-readable display name
    pub display_name: String,

    /// Kind of resource (repository|channel|board)
    pub resource_kind: String,

    /// Optional owning team
    pub team_id: Option<Uuid>,

    /// Provider-specific opaque metadata
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Option<JsonValue>,

    /// Timestamp when the resource was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the resource was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::integration::Entity",
        from = "Column::IntegrationId",
        to = "super::integration::Column::Id"
    )]
    Integration,
}

impl Related<super::integration::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Integration.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
