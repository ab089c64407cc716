//! # Identity Link Handlers
//!
//! Operator endpoint for binding an external platform handle to an internal
//! profile. The binding is what lets the attribution pipeline credit webhook
//! activity to a person instead of recording it anonymously.

use axum::{extract::State, http::StatusCode, response::Json};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{OperatorAuth, OrgExtension, OrgId};
use crate::error::{ApiError, validation_error};
use crate::identity::handle_from_identity;
use crate::server::AppState;

/// Request to link a platform handle to a profile
#[derive(Debug, Deserialize, ToSchema)]
pub struct LinkIdentityRequest {
    /// Profile to attach the identity to
    pub profile_id: Uuid,
    /// Platform name (e.g., "github", "slack")
    pub platform: String,
    /// External handle on that platform
    pub handle: String,
}

/// Profile state after an identity link
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LinkedProfileResponse {
    /// Profile ID
    pub id: Uuid,
    /// Display name
    pub display_name: String,
    /// Full platform identity map after the link
    pub platform_identities: serde_json::Value,
    /// Last update timestamp
    pub updated_at: DateTime<FixedOffset>,
}

/// Link an external platform handle to a profile
///
/// Handles are matched case-insensitively, so a handle already claimed by a
/// different profile in the org is rejected with a conflict rather than
/// silently splitting attribution between two people.
#[utoipa::path(
    post,
    path = "/identities/link",
    params(crate::handlers::OrgHeader),
    request_body = LinkIdentityRequest,
    responses(
        (status = 200, description = "Identity linked", body = LinkedProfileResponse),
        (status = 400, description = "Invalid platform or handle", body = ApiError),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Profile not found in this org", body = ApiError),
        (status = 409, description = "Handle already linked to another profile", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "identities"
)]
pub async fn link_identity(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    OrgExtension(OrgId(org_id)): OrgExtension,
    Json(request): Json<LinkIdentityRequest>,
) -> Result<Json<LinkedProfileResponse>, ApiError> {
    let platform = request.platform.trim().to_lowercase();
    let handle = request.handle.trim().to_string();

    if platform.is_empty() || handle.is_empty() {
        return Err(validation_error(
            "Validation failed",
            json!({
                "platform": "Platform must not be empty",
                "handle": "Handle must not be empty"
            }),
        ));
    }

    let profile = state
        .profile_repo
        .get_by_id(&request.profile_id)
        .await?
        .filter(|profile| profile.org_id == org_id)
        .ok_or_else(|| {
            // Wrong-org profiles look identical to missing ones
            ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Profile not found",
            )
        })?;

    let handle_lower = handle.to_lowercase();
    let org_profiles = state
        .profile_repo
        .find_with_platform_identities(&org_id)
        .await?;
    for other in &org_profiles {
        if other.id == profile.id {
            continue;
        }
        let claimed = other
            .platform_identities
            .as_ref()
            .and_then(|identities| identities.get(&platform))
            .and_then(handle_from_identity)
            .is_some_and(|existing| existing.to_lowercase() == handle_lower);
        if claimed {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                "CONFLICT",
                &format!(
                    "Handle '{}' on {} is already linked to another profile",
                    handle, platform
                ),
            ));
        }
    }

    let updated = state
        .profile_repo
        .set_platform_identity(&profile.id, &platform, &handle)
        .await?;

    info!(
        org_id = %org_id,
        profile_id = %updated.id,
        platform = %platform,
        "Platform identity linked"
    );

    // Notification is best-effort and must not delay or fail the response
    let notified_profile = updated.display_name.clone();
    let notified_platform = platform.clone();
    tokio::spawn(async move {
        metrics::counter!("identity_link_notifications_total").increment(1);
        info!(
            profile = %notified_profile,
            platform = %notified_platform,
            "Dispatched identity link notification"
        );
    });

    Ok(Json(LinkedProfileResponse {
        id: updated.id,
        display_name: updated.display_name,
        platform_identities: updated
            .platform_identities
            .unwrap_or_else(|| json!({})),
        updated_at: updated.updated_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::AppConfig;
    use crate::db::init_pool;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{ActiveModelTrait, Set};
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

    async fn insert_profile(
        state: &crate::server::AppState,
        org_id: Uuid,
        name: &str,
        identities: Option<serde_json::Value>,
    ) -> Uuid {
        crate::models::profile::ActiveModel {
            id: Set(Uuid::new_v4()),
            org_id: Set(org_id),
            display_name: Set(name.to_string()),
            email: Set(None),
            platform_identities: Set(identities),
            created_at: Set(chrono::Utc::now().into()),
            updated_at: Set(chrono::Utc::now().into()),
        }
        .insert(&*state.db)
        .await
        .unwrap()
        .id
    }

    fn link_request(org_id: Uuid, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/identities/link")
            .header("Authorization", "Bearer test-token")
            .header("X-Org-Id", org_id.to_string())
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_link_identity_updates_profile() {
        let (state, app) = setup_test_app().await;
        let org_id = Uuid::new_v4();
        let profile_id = insert_profile(&state, org_id, "Ada", None).await;

        let response = app
            .oneshot(link_request(
                org_id,
                json!({ "profile_id": profile_id, "platform": "GitHub", "handle": "ada-l" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let linked: LinkedProfileResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(linked.id, profile_id);
        // Platform names are normalized to lowercase
        assert!(linked.platform_identities.get("github").is_some());
    }

    #[tokio::test]
    async fn test_link_identity_unknown_profile_404() {
        let (_state, app) = setup_test_app().await;
        let org_id = Uuid::new_v4();

        let response = app
            .oneshot(link_request(
                org_id,
                json!({ "profile_id": Uuid::new_v4(), "platform": "github", "handle": "ghost" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_link_identity_wrong_org_looks_missing() {
        let (state, app) = setup_test_app().await;
        let owning_org = Uuid::new_v4();
        let other_org = Uuid::new_v4();
        let profile_id = insert_profile(&state, owning_org, "Ada", None).await;

        let response = app
            .oneshot(link_request(
                other_org,
                json!({ "profile_id": profile_id, "platform": "github", "handle": "ada-l" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_link_identity_claimed_handle_conflicts() {
        let (state, app) = setup_test_app().await;
        let org_id = Uuid::new_v4();
        insert_profile(
            &state,
            org_id,
            "Grace",
            Some(json!({ "github": { "handle": "Shared-Handle" } })),
        )
        .await;
        let profile_id = insert_profile(&state, org_id, "Ada", None).await;

        // Case differs but the handle is the same identity
        let response = app
            .oneshot(link_request(
                org_id,
                json!({ "profile_id": profile_id, "platform": "github", "handle": "shared-handle" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(error["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_relink_same_profile_is_allowed() {
        let (state, app) = setup_test_app().await;
        let org_id = Uuid::new_v4();
        let profile_id = insert_profile(
            &state,
            org_id,
            "Ada",
            Some(json!({ "github": { "handle": "old-handle" } })),
        )
        .await;

        let response = app
            .oneshot(link_request(
                org_id,
                json!({ "profile_id": profile_id, "platform": "github", "handle": "new-handle" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_link_identity_requires_auth() {
        let (_state, app) = setup_test_app().await;

        let request = Request::builder()
            .method("POST")
            .uri("/identities/link")
            .header("Content-Type", "application/json")
            .body(Body::from(
                json!({ "profile_id": Uuid::new_v4(), "platform": "github", "handle": "x" })
                    .to_string(),
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
