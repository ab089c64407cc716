//! Report export entity model
//!
//! Notarized report archive. `content_hash` is the SHA-256 of the exact
//! uploaded bytes and carries a unique index, making re-uploads idempotent
//! and verification a pure lookup.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Report export entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "report_exports")]
pub struct Model {
    /// Unique identifier for the export (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Organization identifier for multi-tenancy
    pub org_id: Uuid,

    /// Lowercase hex SHA-256 of the uploaded bytes (unique)
    pub content_hash: String,

    /// Where the original bytes are archived in the blob store
    pub storage_location: String,

    /// Platform the report covers (github|slack|mixed)
    pub platform: String,

    /// Original file name as uploaded, when provided
    pub file_name: Option<String>,

    /// Size of the uploaded bytes
    pub size_bytes: i64,

    /// Timestamp when the report was notarized
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
