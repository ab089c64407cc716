//! # Server Configuration
//!
//! This module contains the server setup and configuration for the Veritas Core API.

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::db;
use crate::error::ApiError;
use crate::handlers;
use crate::identity::IdentityOverrides;
use crate::notary::NotaryService;
use crate::processor::WebhookProcessor;
use crate::repositories::{
    ActivityRepository, AgentKeyRepository, IntegrationRepository, ProfileRepository,
    ReportExportRepository, ResourceRepository, WebhookEventRepository,
};
use crate::storage::{BlobStore, LocalBlobStore};
use crate::vault::TokenVault;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub integration_repo: Arc<IntegrationRepository>,
    pub profile_repo: Arc<ProfileRepository>,
    pub resource_repo: Arc<ResourceRepository>,
    pub activity_repo: Arc<ActivityRepository>,
    pub webhook_repo: Arc<WebhookEventRepository>,
    pub agent_key_repo: Arc<AgentKeyRepository>,
    pub notary: NotaryService,
    pub processor: Arc<WebhookProcessor>,
    pub overrides: Arc<IdentityOverrides>,
}

/// Assemble the shared application state from configuration and a database pool
pub fn build_app_state(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<AppState> {
    let config = Arc::new(config);
    let db = Arc::new(db);

    let vault = TokenVault::from_master_secret(config.vault_master_key.as_deref());
    let integration_repo = Arc::new(IntegrationRepository::new(Arc::clone(&db), vault));
    let profile_repo = Arc::new(ProfileRepository::new(Arc::clone(&db)));
    let resource_repo = Arc::new(ResourceRepository::new(Arc::clone(&db)));
    let activity_repo = Arc::new(ActivityRepository::new(Arc::clone(&db)));
    let webhook_repo = Arc::new(WebhookEventRepository::new(Arc::clone(&db)));
    let agent_key_repo = Arc::new(AgentKeyRepository::new(Arc::clone(&db)));
    let report_repo = ReportExportRepository::new(Arc::clone(&db));

    let overrides = match config.identity_overrides_path.as_deref() {
        Some(path) => Arc::new(IdentityOverrides::load(path)?),
        None => Arc::new(IdentityOverrides::empty()),
    };

    let store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(config.blob_store_dir.clone())?);
    let notary = NotaryService::new(store, report_repo);

    let processor = Arc::new(WebhookProcessor::new(
        Arc::clone(&webhook_repo),
        Arc::clone(&activity_repo),
        Arc::clone(&profile_repo),
        Arc::clone(&resource_repo),
        Arc::clone(&overrides),
        config.processor.batch_size,
    ));

    Ok(AppState {
        config,
        db,
        integration_repo,
        profile_repo,
        resource_repo,
        activity_repo,
        webhook_repo,
        agent_key_repo,
        notary,
        processor,
        overrides,
    })
}

/// Build an [`AppState`] for handler tests, panicking on setup failure
#[cfg(test)]
pub fn create_test_app_state(config: AppConfig, db: DatabaseConnection) -> AppState {
    build_app_state(config, db).expect("Failed to build test app state")
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    // Operator routes sit behind bearer auth plus the org header
    let protected = Router::new()
        .route("/reports/upload", post(handlers::reports::upload_report))
        .route("/reports/verify", post(handlers::reports::verify_report))
        .route(
            "/identities/link",
            post(handlers::identities::link_identity),
        )
        .route("/activities", get(handlers::activities::list_activities))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    // Report uploads can exceed axum's default 2MB body limit
    let body_limit = state.config.report_max_bytes.saturating_add(64 * 1024);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(health))
        .route(
            "/webhooks/{provider}/{org_id}",
            post(handlers::webhooks::receive_webhook),
        )
        .route(
            "/internal/webhooks/process",
            post(handlers::webhooks::process_webhook_queue),
        )
        .route(
            "/ingest/agent",
            post(handlers::ingest::ingest_agent_telemetry),
        )
        .merge(protected)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(
            crate::telemetry::trace_context_middleware,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Liveness and database reachability check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Database is unreachable", body = ApiError)
    ),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    db::health_check(&state.db).await.map_err(|e| {
        tracing::error!(error = ?e, "Database health check failed");
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "Database is unreachable",
        )
    })?;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    // Resolve the configured bind address
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = build_app_state(config, db)?;

    // Background credential refresh runs for the lifetime of the server
    let refresh_service = crate::token_refresh::CredentialRefreshService::new(
        Arc::clone(&state.config),
        Arc::clone(&state.db),
        Arc::clone(&state.integration_repo),
    );
    let shutdown = tokio_util::sync::CancellationToken::new();
    let refresh_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = refresh_service.run(refresh_shutdown).await {
            tracing::error!(error = ?e, "Credential refresh service exited with error");
        }
    });

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Server listening on: {}", addr);
    println!("Running in profile: {}", profile);

    axum::serve(listener, app).await?;
    shutdown.cancel();

    Ok(())
}

/// Adds the operator bearer scheme to the generated OpenAPI document
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::server::health,
        crate::handlers::webhooks::receive_webhook,
        crate::handlers::webhooks::process_webhook_queue,
        crate::handlers::reports::upload_report,
        crate::handlers::reports::verify_report,
        crate::handlers::identities::link_identity,
        crate::handlers::activities::list_activities,
        crate::handlers::ingest::ingest_agent_telemetry,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::error::ProviderError,
            crate::handlers::webhooks::WebhookAcceptResponse,
            crate::processor::ProcessorRunSummary,
            crate::notary::NotarizedReport,
            crate::notary::VerificationVerdict,
            crate::handlers::identities::LinkIdentityRequest,
            crate::handlers::identities::LinkedProfileResponse,
            crate::handlers::activities::ActivityResponse,
            crate::handlers::activities::ActivityListResponse,
            crate::handlers::ingest::AgentTelemetryRequest,
            crate::handlers::ingest::AgentIngestResponse,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Veritas Core API",
        description = "Activity ledger, identity attribution, and report notarization API",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::Request;
    use migration::{Migrator, MigratorTrait};
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let config = AppConfig {
            profile: "test".to_string(),
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            blob_store_dir: std::env::temp_dir()
                .join(format!("veritas-test-{}", uuid::Uuid::new_v4())),
            ..Default::default()
        };
        let db = db::init_pool(&config).await.expect("Failed to init test DB");
        Migrator::up(&db, None).await.unwrap();
        create_app(create_test_app_state(config, db))
    }

    #[tokio::test]
    async fn test_root_returns_service_info() {
        let app = test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let info: crate::models::ServiceInfo = serde_json::from_slice(&body).unwrap();
        assert_eq!(info.service, "veritas-core");
    }

    #[tokio::test]
    async fn test_health_reports_ok() {
        let app = test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_responses_echo_the_request_id() {
        let app = test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("X-Request-Id", "req-from-proxy")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("x-request-id").unwrap(),
            "req-from-proxy"
        );

        // Without an inbound ID one is minted
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let minted = response.headers().get("x-request-id").unwrap();
        assert!(minted.to_str().unwrap().starts_with("req-"));
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let app = test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(doc["paths"]["/reports/upload"].is_object());
        assert!(doc["paths"]["/webhooks/{provider}/{org_id}"].is_object());
    }

    #[tokio::test]
    async fn test_protected_routes_reject_anonymous_requests() {
        let app = test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/activities")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
