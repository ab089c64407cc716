//! # Activity Ledger Handlers
//!
//! Read access to the append-only activity ledger, newest first, optionally
//! narrowed to a single actor.

use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{OperatorAuth, OrgExtension, OrgId};
use crate::error::{ApiError, validation_error};
use crate::models::activity_record;
use crate::server::AppState;

const DEFAULT_LIMIT: u64 = 50;
const MAX_LIMIT: u64 = 200;

/// Query parameters for listing activities
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListActivitiesQuery {
    /// Maximum rows to return (default 50, max 200)
    pub limit: Option<u64>,
    /// Restrict to activity attributed to this profile
    pub actor_id: Option<Uuid>,
    /// Only return rows created strictly before this timestamp (RFC 3339)
    pub before: Option<DateTime<FixedOffset>>,
}

/// One ledger row in API form
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivityResponse {
    /// Ledger row ID
    pub id: Uuid,
    /// Normalized action type (e.g., "code_push", "comment")
    pub action_type: String,
    /// Attributed profile, absent for anonymous activity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,
    /// Linked resource, if one matched at ingest time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<Uuid>,
    /// Human-readable one-line summary
    pub summary: String,
    /// Structured action details
    pub details: serde_json::Value,
    /// When the row was appended
    pub created_at: DateTime<FixedOffset>,
}

impl From<activity_record::Model> for ActivityResponse {
    fn from(record: activity_record::Model) -> Self {
        Self {
            id: record.id,
            action_type: record.action_type,
            actor_id: record.actor_id,
            resource_id: record.resource_id,
            summary: record.summary,
            details: record.details,
            created_at: record.created_at,
        }
    }
}

/// List response wrapper
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivityListResponse {
    /// Ledger rows, newest first
    pub activities: Vec<ActivityResponse>,
    /// Number of rows returned
    pub count: usize,
}

/// List recent ledger activity for the org
#[utoipa::path(
    get,
    path = "/activities",
    params(ListActivitiesQuery, crate::handlers::OrgHeader),
    responses(
        (status = 200, description = "Recent activity, newest first", body = ActivityListResponse),
        (status = 400, description = "Invalid limit", body = ApiError),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "activities"
)]
pub async fn list_activities(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    OrgExtension(OrgId(org_id)): OrgExtension,
    Query(query): Query<ListActivitiesQuery>,
) -> Result<Json<ActivityListResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(validation_error(
            "Validation failed",
            json!({ "limit": format!("Limit must be between 1 and {}", MAX_LIMIT) }),
        ));
    }

    let records = match query.actor_id {
        Some(actor_id) => {
            state
                .activity_repo
                .list_for_actor(&org_id, &actor_id, limit, query.before)
                .await?
        }
        None => state.activity_repo.list(&org_id, limit, query.before).await?,
    };

    let activities: Vec<ActivityResponse> =
        records.into_iter().map(ActivityResponse::from).collect();
    let count = activities.len();

    Ok(Json(ActivityListResponse { activities, count }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::AppConfig;
    use crate::db::init_pool;
    use crate::models::ActivityDetails;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use migration::{Migrator, MigratorTrait};
    use tower::ServiceExt;

    async fn setup_test_app() -> (crate::server::AppState, axum::Router) {
        let config = AppConfig {
            profile: "test".to_string(),
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            operator_tokens: vec!["test-token".to_string()],
            blob_store_dir: std::env::temp_dir().join(format!("veritas-test-{}", Uuid::new_v4())),
            ..Default::default()
        };
        let db = init_pool(&config).await.expect("Failed to init test DB");
        Migrator::up(&db, None).await.unwrap();

        let state = crate::server::create_test_app_state(config, db);
        let app = crate::server::create_app(state.clone());
        (state, app)
    }

    async fn append_message(
        state: &crate::server::AppState,
        org_id: Uuid,
        actor_id: Option<Uuid>,
        text: &str,
    ) {
        state
            .activity_repo
            .append(
                org_id,
                actor_id,
                None,
                text.to_string(),
                &ActivityDetails::Comment {
                    channel: "C012345".to_string(),
                    thread_ts: None,
                },
                None,
            )
            .await
            .unwrap();
    }

    fn get(uri: &str, org_id: Uuid) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header("Authorization", "Bearer test-token")
            .header("X-Org-Id", org_id.to_string())
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_activities_scoped_to_org() {
        let (state, app) = setup_test_app().await;
        let org_id = Uuid::new_v4();
        let other_org = Uuid::new_v4();

        append_message(&state, org_id, None, "ours").await;
        append_message(&state, other_org, None, "theirs").await;

        let response = app.oneshot(get("/activities", org_id)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let list: ActivityListResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(list.count, 1);
        assert_eq!(list.activities[0].summary, "ours");
    }

    #[tokio::test]
    async fn test_list_activities_filters_by_actor() {
        let (state, app) = setup_test_app().await;
        let org_id = Uuid::new_v4();
        let actor_id = Uuid::new_v4();

        append_message(&state, org_id, Some(actor_id), "attributed").await;
        append_message(&state, org_id, None, "anonymous").await;

        let response = app
            .oneshot(get(&format!("/activities?actor_id={}", actor_id), org_id))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let list: ActivityListResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(list.count, 1);
        assert_eq!(list.activities[0].actor_id, Some(actor_id));
    }

    #[tokio::test]
    async fn test_list_activities_respects_limit() {
        let (state, app) = setup_test_app().await;
        let org_id = Uuid::new_v4();

        for i in 0..5 {
            append_message(&state, org_id, None, &format!("msg-{}", i)).await;
        }

        let response = app
            .oneshot(get("/activities?limit=3", org_id))
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let list: ActivityListResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(list.count, 3);
    }

    #[tokio::test]
    async fn test_list_activities_before_cursor_pages_older_rows() {
        let (state, app) = setup_test_app().await;
        let org_id = Uuid::new_v4();

        append_message(&state, org_id, None, "older").await;
        // Distinct created_at so the exclusive cursor has something to cut on
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        append_message(&state, org_id, None, "newer").await;

        let response = app
            .clone()
            .oneshot(get("/activities?limit=1", org_id))
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let first_page: ActivityListResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(first_page.activities[0].summary, "newer");

        let cursor = first_page.activities[0]
            .created_at
            .to_rfc3339()
            .replace('+', "%2B");
        let response = app
            .oneshot(get(&format!("/activities?before={}", cursor), org_id))
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let second_page: ActivityListResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(second_page.count, 1);
        assert_eq!(second_page.activities[0].summary, "older");
    }

    #[tokio::test]
    async fn test_list_activities_rejects_oversized_limit() {
        let (_state, app) = setup_test_app().await;
        let org_id = Uuid::new_v4();

        let response = app
            .oneshot(get("/activities?limit=5000", org_id))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_activities_requires_org_header() {
        let (_state, app) = setup_test_app().await;

        let request = Request::builder()
            .method("GET")
            .uri("/activities")
            .header("Authorization", "Bearer test-token")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
