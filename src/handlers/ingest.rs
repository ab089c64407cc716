//! # Telemetry Ingestion Handler
//!
//! Endpoint for AI agents reporting structured telemetry. Agents authenticate
//! with a minted key rather than an operator token; the key row carries the
//! org, so telemetry cannot be written across org boundaries.

use axum::{extract::State, http::HeaderMap, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::debug;
use utoipa::ToSchema;

use crate::auth::authenticate_agent_key;
use crate::classify;
use crate::error::{ApiError, validation_error};
use crate::models::ActivityDetails;
use crate::repositories::AppendOutcome;
use crate::server::AppState;

/// One telemetry report from an agent.
///
/// Only the correlation fields are mandatory; the structured sub-objects
/// default independently so partial payloads still ingest. The correlation
/// fields deserialize as optional so an absent field reports a field-level
/// validation error rather than a body rejection.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AgentTelemetryRequest {
    /// Trace identifier correlating steps of one agent run
    #[serde(default)]
    pub trace_id: Option<String>,
    /// Name of the step this report covers
    #[serde(default)]
    pub step: Option<String>,
    /// Resource metrics (free-form)
    #[serde(default)]
    pub metrics: JsonValue,
    /// Cognitive load indicators (free-form)
    #[serde(default)]
    pub cognitive_load: JsonValue,
    /// Model context descriptors (free-form)
    #[serde(default)]
    pub ai_context: JsonValue,
    /// Optional human-readable note
    pub message: Option<String>,
}

/// Acknowledgement for ingested telemetry
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AgentIngestResponse {
    pub success: bool,
    pub ingested: bool,
}

/// Ingest a telemetry report from an AI agent
#[utoipa::path(
    post,
    path = "/ingest/agent",
    params(
        ("Authorization" = String, Header, description = "Bearer agent key (vrts_live_...)")
    ),
    request_body = AgentTelemetryRequest,
    responses(
        (status = 200, description = "Telemetry recorded in the ledger", body = AgentIngestResponse),
        (status = 400, description = "Missing trace_id or step", body = ApiError),
        (status = 401, description = "Missing or unknown agent key", body = ApiError),
        (status = 403, description = "Agent key is not active", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "ingest"
)]
pub async fn ingest_agent_telemetry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AgentTelemetryRequest>,
) -> Result<Json<AgentIngestResponse>, ApiError> {
    let principal = authenticate_agent_key(&headers, &state.agent_key_repo).await?;

    let trace_id = request.trace_id.as_deref().map(str::trim).unwrap_or("");
    let step = request.step.as_deref().map(str::trim).unwrap_or("");

    let mut field_errors = serde_json::Map::new();
    if trace_id.is_empty() {
        field_errors.insert("trace_id".to_string(), json!("Trace ID is required"));
    }
    if step.is_empty() {
        field_errors.insert("step".to_string(), json!("Step name is required"));
    }
    if !field_errors.is_empty() {
        return Err(validation_error(
            "Validation failed",
            JsonValue::Object(field_errors),
        ));
    }

    let details = ActivityDetails::Telemetry {
        trace_id: trace_id.to_string(),
        step: step.to_string(),
        metrics: request.metrics,
        cognitive_load: request.cognitive_load,
        ai_context: request.ai_context,
        message: request.message,
    };
    let summary = classify::summarize(&details, Some(&principal.key_name));

    let outcome = state
        .activity_repo
        .append(principal.org_id, None, None, summary, &details, None)
        .await?;

    if let AppendOutcome::Inserted(record) = outcome {
        debug!(
            org_id = %principal.org_id,
            key_id = %principal.key_id,
            activity_id = %record.id,
            trace_id,
            step,
            "Agent telemetry recorded"
        );
    }

    Ok(Json(AgentIngestResponse {
        success: true,
        ingested: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::auth::{generate_agent_key, hash_agent_key};
    use crate::config::AppConfig;
    use crate::db::init_pool;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use migration::{Migrator, MigratorTrait};
    use tower::ServiceExt;
    use uuid::Uuid;

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

    async fn mint_key(state: &crate::server::AppState, org_id: Uuid) -> String {
        let plaintext = generate_agent_key();
        state
            .agent_key_repo
            .insert(org_id, &hash_agent_key(&plaintext), "reviewer-agent")
            .await
            .unwrap();
        plaintext
    }

    fn telemetry_request(key: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/ingest/agent")
            .header("Authorization", format!("Bearer {}", key))
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_telemetry_recorded_under_key_org() {
        let (state, app) = setup_test_app().await;
        let org_id = Uuid::new_v4();
        let key = mint_key(&state, org_id).await;

        let response = app
            .oneshot(telemetry_request(
                &key,
                json!({
                    "trace_id": "trace-9f2",
                    "step": "summarize_findings",
                    "metrics": { "tokens": 1812 },
                    "cognitive_load": { "retries": 1 }
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let ack: AgentIngestResponse = serde_json::from_slice(&body).unwrap();
        assert!(ack.success);
        assert!(ack.ingested);

        let records = state.activity_repo.list(&org_id, 10, None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action_type, "telemetry");
        assert_eq!(records[0].actor_id, None);
        assert_eq!(records[0].details["trace_id"], json!("trace-9f2"));
        assert_eq!(records[0].details["metrics"]["tokens"], json!(1812));
    }

    #[tokio::test]
    async fn test_partial_payload_still_ingests() {
        let (state, app) = setup_test_app().await;
        let org_id = Uuid::new_v4();
        let key = mint_key(&state, org_id).await;

        // Sub-objects are all optional
        let response = app
            .oneshot(telemetry_request(
                &key,
                json!({ "trace_id": "trace-1", "step": "plan" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert_eq!(state.activity_repo.list(&org_id, 10, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_step_rejected_without_ledger_write() {
        let (state, app) = setup_test_app().await;
        let org_id = Uuid::new_v4();
        let key = mint_key(&state, org_id).await;

        let response = app
            .oneshot(telemetry_request(
                &key,
                json!({ "trace_id": "trace-1", "step": "" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(state.activity_repo.list(&org_id, 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_absent_field_answers_bad_request() {
        let (state, app) = setup_test_app().await;
        let org_id = Uuid::new_v4();
        let key = mint_key(&state, org_id).await;

        // Field missing entirely, not just empty
        let response = app
            .oneshot(telemetry_request(&key, json!({ "trace_id": "trace-1" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_validation_error_names_only_offending_field() {
        let (state, app) = setup_test_app().await;
        let org_id = Uuid::new_v4();
        let key = mint_key(&state, org_id).await;

        let response = app
            .oneshot(telemetry_request(
                &key,
                json!({ "trace_id": "trace-1", "step": "  " }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(error["details"].get("step").is_some());
        assert!(error["details"].get("trace_id").is_none());
    }

    #[tokio::test]
    async fn test_unknown_key_rejected() {
        let (_state, app) = setup_test_app().await;

        let response = app
            .oneshot(telemetry_request(
                &generate_agent_key(),
                json!({ "trace_id": "trace-1", "step": "plan" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_inactive_key_answers_forbidden() {
        let (state, app) = setup_test_app().await;
        let org_id = Uuid::new_v4();
        let key = mint_key(&state, org_id).await;

        // Revoke directly in the database
        use sea_orm::{ActiveModelTrait, Set};
        let row = state
            .agent_key_repo
            .find_by_hash(&hash_agent_key(&key))
            .await
            .unwrap()
            .unwrap();
        let mut active: crate::models::agent_key::ActiveModel = row.into();
        active.status = Set("revoked".to_string());
        active.update(&*state.db).await.unwrap();

        let response = app
            .oneshot(telemetry_request(
                &key,
                json!({ "trace_id": "trace-1", "step": "plan" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        assert!(state.activity_repo.list(&org_id, 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_operator_token_is_not_an_agent_key() {
        let (_state, app) = setup_test_app().await;

        let response = app
            .oneshot(telemetry_request(
                "test-token",
                json!({ "trace_id": "trace-1", "step": "plan" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_happens_before_validation() {
        let (_state, app) = setup_test_app().await;

        // Invalid body plus invalid key must fail on the key
        let response = app
            .oneshot(telemetry_request(
                &generate_agent_key(),
                json!({ "trace_id": "", "step": "" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
