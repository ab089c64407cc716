//! # Authentication and Authorization
//!
//! This module provides operator bearer authentication and org header
//! validation for protected API endpoints, shared-secret checks for internal
//! cron endpoints, and agent key authentication for telemetry ingestion.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, ErrorType, forbidden, unauthorized, validation_error};
use crate::repositories::AgentKeyRepository;
use crate::server::AppState;

/// Prefix carried by every issued agent key
pub const AGENT_KEY_PREFIX: &str = "vrts_live_";

/// Org ID wrapper for type safety
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrgId(pub Uuid);

/// Marker type for authenticated operator requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAuth;

/// Extractor for org ID from request extensions
#[derive(Debug, Clone)]
pub struct OrgExtension(pub OrgId);

/// Identity of an authenticated telemetry agent
#[derive(Debug, Clone)]
pub struct AgentPrincipal {
    /// Agent key row ID
    pub key_id: Uuid,
    /// Org the key is scoped to
    pub org_id: Uuid,
    /// Operator-assigned key name
    pub key_name: String,
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Authentication middleware that validates bearer tokens and org headers
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers().clone();

    let token = extract_bearer_token(&headers)?;
    validate_operator_token(&config, token)?;

    let org = extract_org_id(&headers)?;
    tracing::info!(org_id = %org.0, "Authenticated operator request");

    let mut request = request;
    request.extensions_mut().insert(OrgExtension(org));
    request.extensions_mut().insert(OperatorAuth);

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))
        .and_then(|value| {
            value
                .to_str()
                .map_err(|_| unauthorized(Some("Invalid Authorization header")))
        })
        .and_then(|header| {
            header
                .strip_prefix("Bearer ")
                .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
        })
}

fn validate_operator_token(config: &AppConfig, token: &str) -> Result<(), ApiError> {
    let is_valid = config
        .operator_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid bearer token")))
    }
}

fn extract_org_id(headers: &HeaderMap) -> Result<OrgId, ApiError> {
    let header_value = headers
        .get("X-Org-Id")
        .ok_or_else(|| {
            validation_error(
                "Missing required header",
                serde_json::json!({ "X-Org-Id": "Required header is missing" }),
            )
        })?
        .to_str()
        .map_err(|_| {
            validation_error(
                "Invalid org header",
                serde_json::json!({ "X-Org-Id": "Header must be valid UTF-8" }),
            )
        })?;

    header_value.parse::<Uuid>().map(OrgId).map_err(|_| {
        validation_error(
            "Invalid org ID",
            serde_json::json!({ "X-Org-Id": "Must be a valid UUID" }),
        )
    })
}

/// Validate the shared secret on internal cron endpoints.
///
/// The secret arrives in the X-Cron-Secret header and is compared in
/// constant time. An unconfigured secret rejects every caller.
pub fn require_cron_secret(headers: &HeaderMap, config: &AppConfig) -> Result<(), ApiError> {
    let configured = config
        .cron_secret
        .as_deref()
        .ok_or_else(|| unauthorized(Some("Cron secret not configured")))?;

    let presented = headers
        .get("X-Cron-Secret")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| unauthorized(Some("Missing X-Cron-Secret header")))?;

    if ConstantTimeEq::ct_eq(presented.as_bytes(), configured.as_bytes()).into() {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid cron secret")))
    }
}

/// Generate a fresh agent key in presentation form.
///
/// The plaintext is shown exactly once at mint time; only the hash is stored.
pub fn generate_agent_key() -> String {
    let mut secret = [0u8; 32];
    rand::thread_rng().fill(&mut secret);
    format!("{}{}", AGENT_KEY_PREFIX, hex::encode(secret))
}

/// Hash an agent key for storage and lookup
pub fn hash_agent_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Authenticate a telemetry agent from its bearer key.
///
/// Looks the SHA-256 of the presented key up and stamps last_used_at on
/// success. Unknown keys answer 401; a known key with a non-active status
/// answers 403 so operators can tell a revocation from a typo.
pub async fn authenticate_agent_key(
    headers: &HeaderMap,
    repo: &AgentKeyRepository,
) -> Result<AgentPrincipal, ApiError> {
    let token = extract_bearer_token(headers)?;

    if !token.starts_with(AGENT_KEY_PREFIX) {
        return Err(unauthorized(Some("Invalid agent key")));
    }

    let key_hash = hash_agent_key(token);
    let key = repo
        .find_by_hash(&key_hash)
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "Agent key lookup failed");
            ApiError::from(ErrorType::InternalServerError)
        })?
        .ok_or_else(|| unauthorized(Some("Invalid agent key")))?;

    if key.status != "active" {
        tracing::warn!(key_id = %key.id, status = %key.status, "Inactive agent key presented");
        return Err(forbidden(Some("Agent key is not active")));
    }

    let principal = AgentPrincipal {
        key_id: key.id,
        org_id: key.org_id,
        key_name: key.name.clone(),
    };

    if let Err(e) = repo.touch_last_used(key).await {
        // Usage stamping is best-effort; authentication already succeeded
        tracing::warn!(error = ?e, key_id = %principal.key_id, "Failed to stamp agent key usage");
    }

    Ok(principal)
}

/// OpenAPI header parameter for X-Org-Id
#[derive(Debug, Serialize, Deserialize, IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Header)]
pub struct OrgHeader {
    /// Org identifier (UUID) that scopes the request to a specific org
    #[serde(rename = "X-Org-Id")]
    #[param(rename = "X-Org-Id", value_type = String)]
    pub org_id: String,
}

impl<S> FromRequestParts<S> for OrgExtension
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OrgExtension>()
            .cloned()
            .ok_or_else(|| {
                validation_error(
                    "Org context missing",
                    serde_json::json!({ "X-Org-Id": "Org context not present" }),
                )
            })
    }
}

impl<S> FromRequestParts<S> for OperatorAuth
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OperatorAuth>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Operator authentication required")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use tower::ServiceExt;

    fn create_test_config() -> Arc<AppConfig> {
        Arc::new(AppConfig {
            operator_tokens: vec!["test-token-123".to_string()],
            cron_secret: Some("cron-secret-456".to_string()),
            ..Default::default()
        })
    }

    async fn run_middleware(config: Arc<AppConfig>, request: Request<Body>) -> Response {
        async fn handler() -> &'static str {
            "OK"
        }

        Router::new()
            .route("/test", get(handler))
            .layer(axum::middleware::from_fn_with_state(
                Arc::clone(&config),
                auth_middleware,
            ))
            .oneshot(request)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn missing_auth_header_returns_401() {
        let config = create_test_config();
        let request = Request::builder()
            .uri("/test")
            .header("X-Org-Id", Uuid::new_v4().to_string())
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(config, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_auth_scheme_returns_401() {
        let config = create_test_config();
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Basic dGVzdDoxMjM=")
            .header("X-Org-Id", Uuid::new_v4().to_string())
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(config, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_token_returns_401() {
        let config = create_test_config();
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer wrong-token")
            .header("X-Org-Id", Uuid::new_v4().to_string())
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(config, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_org_header_returns_400() {
        let config = create_test_config();
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer test-token-123")
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(config, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_org_uuid_returns_400() {
        let config = create_test_config();
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer test-token-123")
            .header("X-Org-Id", "not-a-uuid")
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(config, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn valid_request_passes_through() {
        let config = create_test_config();
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer test-token-123")
            .header("X-Org-Id", Uuid::new_v4().to_string())
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(config, request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn multiple_tokens_supported() {
        let config = Arc::new(AppConfig {
            operator_tokens: vec![
                "token-one".to_string(),
                "token-two".to_string(),
                "token-three".to_string(),
            ],
            ..Default::default()
        });

        for candidate in ["token-one", "token-two", "token-three"] {
            let request = Request::builder()
                .uri("/test")
                .header("Authorization", format!("Bearer {}", candidate))
                .header("X-Org-Id", Uuid::new_v4().to_string())
                .body(Body::empty())
                .unwrap();

            let response = run_middleware(Arc::clone(&config), request).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[test]
    fn test_generated_agent_keys_are_well_formed() {
        let key = generate_agent_key();
        assert!(key.starts_with(AGENT_KEY_PREFIX));
        assert_eq!(key.len(), AGENT_KEY_PREFIX.len() + 64);
        assert!(
            key[AGENT_KEY_PREFIX.len()..]
                .chars()
                .all(|c| c.is_ascii_hexdigit())
        );

        // Keys must not collide
        assert_ne!(key, generate_agent_key());
    }

    #[test]
    fn test_hash_agent_key_is_stable() {
        let key = "vrts_live_0000000000000000000000000000000000000000000000000000000000000000";
        assert_eq!(hash_agent_key(key), hash_agent_key(key));
        assert_eq!(hash_agent_key(key).len(), 64);
        assert_ne!(hash_agent_key(key), hash_agent_key("vrts_live_other"));
    }

    #[test]
    fn test_cron_secret_validation() {
        let config = create_test_config();

        let mut headers = HeaderMap::new();
        headers.insert("X-Cron-Secret", "cron-secret-456".parse().unwrap());
        assert!(require_cron_secret(&headers, &config).is_ok());

        let mut wrong = HeaderMap::new();
        wrong.insert("X-Cron-Secret", "nope".parse().unwrap());
        assert!(require_cron_secret(&wrong, &config).is_err());

        assert!(require_cron_secret(&HeaderMap::new(), &config).is_err());
    }

    #[test]
    fn test_cron_secret_unconfigured_rejects() {
        let config = AppConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert("X-Cron-Secret", "anything".parse().unwrap());

        assert!(require_cron_secret(&headers, &config).is_err());
    }
}
