//! Agent key entity model
//!
//! API keys for desktop telemetry agents. Only the SHA-256 hash of the key
//! is stored; the plaintext is shown once at mint time.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Agent key entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "agent_keys")]
pub struct Model {
    /// Unique identifier for the key (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Organization identifier for multi-tenancy
    pub org_id: Uuid,

    /// Lowercase hex SHA-256 of the plaintext key (unique)
    pub key_hash: String,

    /// Operator-assigned label for the key
    pub name: String,

    /// Status of the key (active|revoked)
    pub status: String,

    /// Last successful authentication with this key
    pub last_used_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the key was minted
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
