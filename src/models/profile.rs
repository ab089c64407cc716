//! Profile entity model
//!
//! This module contains the SeaORM entity model for the profiles table,
//! which stores internal user accounts and their external platform handles.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Profile entity representing an internal user account
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "profiles")]
pub struct Model {
    /// Unique identifier for the profile (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Organization identifier for multi-tenancy
    pub org_id: Uuid,

    /// Human-readable display name
    pub display_name: String,

    /// Contact email (optional)
    pub email: Option<String>,

    /// Map of platform name to identity. Values are either a structured
    /// object with a `handle` field or a legacy bare-string handle.
    #[sea_orm(column_type = "JsonBinary")]
    pub platform_identities: Option<JsonValue>,

    /// Timestamp when the profile was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the profile was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
