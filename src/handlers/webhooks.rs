//! # Webhook Handlers
//!
//! Public signature-verified ingestion routes for provider webhooks, plus the
//! cron-triggered internal endpoint that drains the event queue.
//!
//! GitHub deliveries are processed synchronously into the ledger; Slack
//! callbacks are acknowledged fast and queued for the batch processor.

use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::require_cron_secret;
use crate::classify;
use crate::error::{ApiError, invalid_signature};
use crate::identity::resolve_actor;
use crate::processor::ProcessorRunSummary;
use crate::server::AppState;
use crate::webhook_verification::{VerificationError, verify_webhook_signature};

/// Maximum accepted webhook body size
const MAX_WEBHOOK_BODY_BYTES: usize = 1024 * 1024;

/// Path parameters for the public webhook route
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ProviderOrgPath {
    /// Provider slug (e.g., "github", "slack")
    #[param(min_length = 1, example = "github")]
    pub provider: String,
    /// Org UUID for scoping the webhook
    #[param(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub org_id: String,
}

/// Webhook accept response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAcceptResponse {
    /// Disposition of the delivery (recorded|duplicate|queued|ignored)
    pub status: String,
}

/// Accept a webhook delivery from an external provider
///
/// The request body signature is verified against the provider's configured
/// secret before anything else happens. GitHub events flow through
/// classification, attribution, and the ledger append inline; Slack events
/// are queued for the batch processor. Unrecognized event types are
/// acknowledged and dropped so providers do not retry them.
#[utoipa::path(
    post,
    path = "/webhooks/{provider}/{org_id}",
    params(
        ("X-Hub-Signature-256" = Option<String>, Header, description = "GitHub HMAC-SHA256 signature (required for GitHub webhooks)"),
        ("X-GitHub-Event" = Option<String>, Header, description = "GitHub event type (required for GitHub webhooks)"),
        ("X-GitHub-Delivery" = Option<String>, Header, description = "GitHub delivery GUID used for idempotency"),
        ("X-Slack-Signature" = Option<String>, Header, description = "Slack HMAC-SHA256 signature (required for Slack webhooks)"),
        ("X-Slack-Request-Timestamp" = Option<String>, Header, description = "Slack request timestamp (required for Slack webhooks)"),
        ProviderOrgPath
    ),
    request_body(content = JsonValue, description = "Webhook payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Slack URL verification challenge echoed"),
        (status = 202, description = "Webhook accepted", body = WebhookAcceptResponse),
        (status = 400, description = "Malformed payload or missing event headers", body = ApiError),
        (status = 401, description = "Missing or invalid signature", body = ApiError),
        (status = 404, description = "Unsupported provider", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(path): Path<ProviderOrgPath>,
    req: Request,
) -> Result<Response, ApiError> {
    let provider = path.provider;
    let org_id = path.org_id.parse::<Uuid>().map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Invalid org ID format - must be a valid UUID",
        )
    })?;

    let headers = req.headers().clone();
    let body_bytes = axum::body::to_bytes(req.into_body(), MAX_WEBHOOK_BODY_BYTES)
        .await
        .map_err(|_| {
            ApiError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                "Webhook body exceeds maximum allowed size",
            )
        })?;

    // Signature first; nothing is parsed from an unverified body
    verify_webhook_signature(&provider, &body_bytes, &headers, &state.config)
        .map_err(map_verification_error)?;

    debug!(
        provider = %provider,
        org_id = %org_id,
        body_size = body_bytes.len(),
        "Webhook signature verified"
    );

    let payload: JsonValue = serde_json::from_slice(&body_bytes).map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Webhook body is not valid JSON",
        )
    })?;

    match provider.as_str() {
        "github" => handle_github_delivery(&state, org_id, &headers, &payload).await,
        "slack" => handle_slack_callback(&state, org_id, &payload).await,
        // verify_webhook_signature already rejected anything else
        other => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("Unsupported provider '{}'", other),
        )),
    }
}

fn map_verification_error(err: VerificationError) -> ApiError {
    match &err {
        VerificationError::UnsupportedProvider { provider } => ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("Unsupported provider '{}'", provider),
        ),
        VerificationError::TimestampTooOld { .. }
        | VerificationError::TimestampTooFuture { .. } => ApiError::new(
            StatusCode::UNAUTHORIZED,
            "REPLAY_ATTACK_DETECTED",
            &err.to_string(),
        ),
        _ => invalid_signature(Some(&err.to_string())),
    }
}

/// Run a GitHub delivery through the full attribution pipeline
async fn handle_github_delivery(
    state: &AppState,
    org_id: Uuid,
    headers: &HeaderMap,
    payload: &JsonValue,
) -> Result<Response, ApiError> {
    let event_type = headers
        .get("x-github-event")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                "Missing X-GitHub-Event header",
            )
        })?;

    let delivery_id = headers
        .get("x-github-delivery")
        .and_then(|value| value.to_str().ok());

    let Some(classified) = classify::classify_github_event(event_type, payload) else {
        debug!(event_type, "GitHub event has no ledger mapping, acknowledging");
        return Ok(accepted("ignored"));
    };

    let actor_id = match classified.actor_handle.as_deref() {
        Some(raw_handle) => {
            let profiles = state
                .profile_repo
                .find_with_platform_identities(&org_id)
                .await?;
            resolve_actor(&profiles, &state.overrides, "github", raw_handle).profile_id
        }
        None => None,
    };

    let resource_id = match classified.resource_external_id.as_deref() {
        Some(external_id) => state
            .resource_repo
            .find_by_external_id(&org_id, external_id)
            .await?
            .map(|resource| resource.id),
        None => None,
    };

    let summary = classify::summarize(&classified.details, classified.actor_handle.as_deref());
    let dedupe_key = delivery_id.map(|id| format!("github:{}", id));

    let outcome = state
        .activity_repo
        .append(
            org_id,
            actor_id,
            resource_id,
            summary,
            &classified.details,
            dedupe_key,
        )
        .await?;

    let status = match outcome {
        crate::repositories::AppendOutcome::Inserted(record) => {
            info!(
                org_id = %org_id,
                record_id = %record.id,
                action_type = %record.action_type,
                "GitHub webhook recorded in ledger"
            );
            "recorded"
        }
        crate::repositories::AppendOutcome::Duplicate => {
            info!(org_id = %org_id, delivery_id = ?delivery_id, "GitHub delivery already recorded");
            "duplicate"
        }
    };

    Ok(accepted(status))
}

/// Acknowledge a Slack callback and queue it for the batch processor
async fn handle_slack_callback(
    state: &AppState,
    org_id: Uuid,
    payload: &JsonValue,
) -> Result<Response, ApiError> {
    // Slack's endpoint handshake expects the challenge echoed back
    if payload.get("type").and_then(JsonValue::as_str) == Some("url_verification") {
        let challenge = payload
            .get("challenge")
            .and_then(JsonValue::as_str)
            .unwrap_or_default();
        return Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "challenge": challenge })),
        )
            .into_response());
    }

    let event_type = payload
        .pointer("/event/type")
        .or_else(|| payload.get("type"))
        .and_then(JsonValue::as_str);

    let Some(event_type) = event_type else {
        debug!(org_id = %org_id, "Slack callback without event type, acknowledging");
        return Ok(accepted("ignored"));
    };

    state
        .webhook_repo
        .enqueue(org_id, "slack", event_type, payload.clone())
        .await?;

    info!(org_id = %org_id, event_type, "Slack event queued for processing");
    Ok(accepted("queued"))
}

fn accepted(status: &str) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(WebhookAcceptResponse {
            status: status.to_string(),
        }),
    )
        .into_response()
}

/// Drain one batch from the webhook event queue
///
/// Invoked by the platform cron. Protected by the shared cron secret rather
/// than operator auth since the caller is a scheduler, not a person.
#[utoipa::path(
    post,
    path = "/internal/webhooks/process",
    params(
        ("X-Cron-Secret" = String, Header, description = "Shared secret authorizing the cron caller")
    ),
    responses(
        (status = 200, description = "Counts from the processor run", body = ProcessorRunSummary),
        (status = 401, description = "Missing or invalid cron secret", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn process_webhook_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ProcessorRunSummary>, ApiError> {
    require_cron_secret(&headers, &state.config)?;

    let summary = state.processor.run_once().await?;
    Ok(Json(summary))
}

/// Generate a GitHub HMAC-SHA256 signature for testing
#[allow(dead_code)]
fn generate_github_signature(body: &str, secret: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());
    format!("sha256={}", digest)
}

/// Generate a Slack v0 signature for testing
#[allow(dead_code)]
fn generate_slack_signature(body: &str, timestamp: &str, secret: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    let base_string = format!("v0:{}:{}", timestamp, body);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(base_string.as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());
    format!("v0={}", digest)
}
