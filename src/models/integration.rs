//! Integration entity model
//!
//! This module contains the SeaORM entity model for the integrations table,
//! which stores org-scoped authorizations to external providers. Token
//! columns hold vault envelopes, never plaintext.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Integration entity representing an org-scoped provider authorization
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "integrations")]
pub struct Model {
    /// Unique identifier for the integration (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Organization identifier for multi-tenancy
    pub org_id: Uuid,

    /// Provider slug ("github" or "slack"; unique per org)
    pub provider: String,

    /// Encrypted access token envelope
    pub access_token_ciphertext: Option<String>,

    /// Encrypted refresh token envelope
    pub refresh_token_ciphertext: Option<String>,

    /// Access token lifetime in seconds as reported by the provider
    pub expires_in: Option<i64>,

    /// Refresh token lifetime in seconds as reported by the provider
    pub refresh_token_expires_in: Option<i64>,

    /// When the current token pair was issued
    pub token_issued_at: Option<DateTimeWithTimeZone>,

    /// Provider installation identifier (GitHub App installs)
    pub installation_id: Option<String>,

    /// Provider account username
    pub username: Option<String>,

    /// Granted OAuth scope string
    pub scope: Option<String>,

    /// Status of the integration (active|revoked|error)
    pub status: String,

    /// Timestamp when the integration was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the integration was last updated
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Deadline after which the access token is no longer usable, if the
    /// provider reported an expiry. Absent expiry metadata means the token
    /// is presumed valid indefinitely.
    pub fn access_token_expires_at(&self) -> Option<DateTimeWithTimeZone> {
        let issued_at = self.token_issued_at?;
        let expires_in = self.expires_in?;
        Some(issued_at + chrono::Duration::seconds(expires_in))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::monitored_resource::Entity")]
    MonitoredResource,
}

impl Related<super::monitored_resource::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MonitoredResource.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
