//! Activity record entity model
//!
//! The activity ledger. Rows are write-once; corrections are compensating
//! inserts, never updates or deletes.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

/// Activity record entity representing one attributed event in the ledger
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "activity_records")]
pub struct Model {
    /// Unique identifier for the record (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Organization identifier for multi-tenancy
    pub org_id: Uuid,

    /// Enumerated action type (code_push|code_merge|pull_request|issue|review|comment|...)
    pub action_type: String,

    /// Attributed internal profile, or None when attribution failed
    pub actor_id: Option<Uuid>,

    /// Monitored resource the event occurred on, when known
    pub resource_id: Option<Uuid>,

    /// One-line human-readable summary
    pub summary: String,

    /// Structured, action-type-specific details
    #[sea_orm(column_type = "JsonBinary")]
    pub details: JsonValue,

    /// Idempotency key derived from the provider delivery ID. Unique when
    /// present; redelivered webhooks collapse onto the first row.
    pub dedupe_key: Option<String>,

    /// Ordering key for ledger reads
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Structured detail payload stored in the `details` column.
///
/// Tagged on `kind` so ledger consumers can dispatch without sniffing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityDetails {
    /// Commits pushed to a repository branch
    CodePush {
        repo: String,
        git_ref: String,
        commit_count: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        head_sha: Option<String>,
    },
    /// Pull request merged into its target branch
    CodeMerge {
        repo: String,
        number: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        merge_sha: Option<String>,
    },
    /// Pull request lifecycle event (opened, closed unmerged, reopened)
    PullRequest {
        repo: String,
        action: String,
        number: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    /// Issue lifecycle event
    Issue {
        repo: String,
        action: String,
        number: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    /// Pull request review event
    Review {
        repo: String,
        action: String,
        number: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<String>,
    },
    /// Chat message posted to a monitored channel
    Comment {
        channel: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        thread_ts: Option<String>,
    },
    /// Monitored channel was archived
    Archive { channel: String },
    /// Monitored channel was renamed
    Edit {
        channel: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Structured telemetry reported by an AI agent
    Telemetry {
        trace_id: String,
        step: String,
        #[serde(default, skip_serializing_if = "JsonValue::is_null")]
        metrics: JsonValue,
        #[serde(default, skip_serializing_if = "JsonValue::is_null")]
        cognitive_load: JsonValue,
        #[serde(default, skip_serializing_if = "JsonValue::is_null")]
        ai_context: JsonValue,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Event recognized by provider but with no richer mapping
    Generic { provider: String, event_type: String },
}

impl ActivityDetails {
    /// Enumerated action type string stored alongside the details.
    pub fn action_type(&self) -> &'static str {
        match self {
            ActivityDetails::CodePush { .. } => "code_push",
            ActivityDetails::CodeMerge { .. } => "code_merge",
            ActivityDetails::PullRequest { .. } => "pull_request",
            ActivityDetails::Issue { .. } => "issue",
            ActivityDetails::Review { .. } => "review",
            ActivityDetails::Comment { .. } => "comment",
            ActivityDetails::Archive { .. } => "archive",
            ActivityDetails::Edit { .. } => "edit",
            ActivityDetails::Telemetry { .. } => "telemetry",
            ActivityDetails::Generic { .. } => "generic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_details_serialize_with_kind_tag() {
        let details = ActivityDetails::CodePush {
            repo: "acme/api".to_string(),
            git_ref: "refs/heads/main".to_string(),
            commit_count: 3,
            head_sha: Some("abc123".to_string()),
        };

        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["kind"], json!("code_push"));
        assert_eq!(value["commit_count"], json!(3));
    }

    #[test]
    fn test_action_type_matches_variant() {
        let details = ActivityDetails::Comment {
            channel: "C012345".to_string(),
            thread_ts: None,
        };
        assert_eq!(details.action_type(), "comment");

        let value = serde_json::to_value(&details).unwrap();
        let back: ActivityDetails = serde_json::from_value(value).unwrap();
        assert_eq!(back, details);
    }

    #[test]
    fn test_merge_and_channel_lifecycle_action_types() {
        let merge = ActivityDetails::CodeMerge {
            repo: "acme/api".to_string(),
            number: 42,
            title: None,
            merge_sha: None,
        };
        assert_eq!(merge.action_type(), "code_merge");
        assert_eq!(serde_json::to_value(&merge).unwrap()["kind"], json!("code_merge"));

        let archive = ActivityDetails::Archive {
            channel: "C012345".to_string(),
        };
        assert_eq!(archive.action_type(), "archive");

        let rename = ActivityDetails::Edit {
            channel: "C012345".to_string(),
            name: Some("audit-2026".to_string()),
        };
        assert_eq!(rename.action_type(), "edit");
    }
}
