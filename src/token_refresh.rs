//! # Credential Refresh Service
//!
//! Background task that periodically scans active integrations and refreshes
//! OAuth tokens nearing expiry. Also provides on-demand refresh for request
//! paths that encounter a 401 from the provider.

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge, histogram};
use rand::Rng;
use reqwest::Client;
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration as TokioDuration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::integration;
use crate::repositories::IntegrationRepository;

/// Safety margin before expiry within which a token is treated as stale
const TOKEN_VALIDITY_BUFFER_SECONDS: i64 = 300;

/// Background credential refresh service
pub struct CredentialRefreshService {
    config: Arc<AppConfig>,
    integration_repo: Arc<IntegrationRepository>,
    http: Client,
    /// Tracks ongoing refresh operations to provide single-flight protection
    in_flight_refreshes: Arc<Mutex<HashMap<Uuid, tokio::task::JoinHandle<()>>>>,
}

#[derive(Debug, Default)]
struct RefreshStats {
    integrations_polled: u64,
    refreshes_succeeded: u64,
    refreshes_failed: u64,
}

/// Classification of token refresh errors for appropriate handling
#[derive(Debug, PartialEq)]
pub enum RefreshErrorClassification {
    /// Permanent failures that should disable the integration (e.g., invalid_grant)
    Permanent,
    /// Temporary failures that can be retried (e.g., network issues)
    Transient,
    /// Rate limiting errors that should trigger backoff
    RateLimited,
}

/// Result of a token refresh operation
#[derive(Debug)]
pub struct RefreshResult {
    pub success: bool,
    pub integration_id: Uuid,
    pub new_expires_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Token endpoint response shared by the supported providers
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    refresh_token_expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CredentialRefreshService {
    /// Create a new credential refresh service instance
    pub fn new(
        config: Arc<AppConfig>,
        _db: Arc<DatabaseConnection>,
        integration_repo: Arc<IntegrationRepository>,
    ) -> Self {
        Self {
            config,
            integration_repo,
            http: Client::new(),
            in_flight_refreshes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run the credential refresh loop until the provided shutdown token fires
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ApiError> {
        info!("Starting credential refresh service");
        let tick_interval = TokioDuration::from_secs(self.config.token_refresh.tick_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Credential refresh service shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = std::time::Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "Credential refresh tick failed");
                    }
                    let elapsed = tick_started.elapsed();
                    histogram!("credential_refresh_tick_duration_ms")
                        .record(elapsed.as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Credential refresh service stopped");
        Ok(())
    }

    /// Execute one tick of the credential refresh service
    #[instrument(skip_all)]
    pub async fn tick(&self) -> Result<(), ApiError> {
        let now = Utc::now();
        let mut stats = RefreshStats::default();

        let due_integrations = self.find_integrations_due_for_refresh(now).await?;
        stats.integrations_polled = due_integrations.len() as u64;

        info!(
            found_integrations = due_integrations.len(),
            lead_time_seconds = self.config.token_refresh.lead_time_seconds,
            "Found integrations due for credential refresh"
        );

        // Process integrations with a concurrency limit
        let semaphore = Arc::new(tokio::sync::Semaphore::new(
            self.config.token_refresh.concurrency as usize,
        ));

        let mut handles = Vec::new();

        for integration in due_integrations {
            let semaphore = semaphore.clone();
            let service = self.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                service.refresh_integration_with_jitter(integration).await
            });

            handles.push(handle);
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(result)) if result.success => stats.refreshes_succeeded += 1,
                Ok(Ok(_)) => stats.refreshes_failed += 1,
                Ok(Err(e)) => {
                    stats.refreshes_failed += 1;
                    error!(error = ?e, "Integration refresh failed");
                }
                Err(e) => {
                    stats.refreshes_failed += 1;
                    error!(error = ?e, "Refresh task panicked or was cancelled");
                }
            }
        }

        gauge!("credential_refresh_integrations_polled_gauge").set(stats.integrations_polled as f64);
        counter!("credential_refresh_success_total").increment(stats.refreshes_succeeded);
        counter!("credential_refresh_failure_total").increment(stats.refreshes_failed);

        debug!(
            integrations_polled = stats.integrations_polled,
            refreshes_succeeded = stats.refreshes_succeeded,
            refreshes_failed = stats.refreshes_failed,
            "Credential refresh tick completed"
        );

        Ok(())
    }

    /// Find active integrations whose tokens expire within the lead time window.
    ///
    /// Expiry is derived from token_issued_at plus expires_in, so the window
    /// check happens here rather than in SQL.
    async fn find_integrations_due_for_refresh(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<integration::Model>, ApiError> {
        let expiry_cutoff =
            now + Duration::seconds(self.config.token_refresh.lead_time_seconds as i64);

        let active = self.integration_repo.find_active().await.map_err(|e| {
            error!(error = ?e, "Failed to query integrations due for refresh");
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to query integrations due for refresh",
            )
        })?;

        let mut due: Vec<integration::Model> = active
            .into_iter()
            .filter(|i| i.refresh_token_ciphertext.is_some())
            .filter(|i| {
                i.access_token_expires_at()
                    .map(|expires_at| expires_at <= expiry_cutoff)
                    .unwrap_or(false)
            })
            .collect();

        due.sort_by_key(|i| i.access_token_expires_at());
        Ok(due)
    }

    /// Refresh a single integration with jitter applied
    async fn refresh_integration_with_jitter(
        &self,
        integration: integration::Model,
    ) -> Result<RefreshResult, ApiError> {
        // Apply jitter to avoid thundering herd
        let jitter_seconds = self.compute_jitter();
        if jitter_seconds > 0 {
            debug!(
                integration_id = %integration.id,
                jitter_seconds = jitter_seconds,
                "Applying jitter before credential refresh"
            );
            sleep(TokioDuration::from_secs(jitter_seconds)).await;
        }

        self.refresh_integration(integration).await
    }

    /// Refresh a single integration's tokens
    #[instrument(skip_all, fields(integration_id = %integration.id))]
    pub async fn refresh_integration(
        &self,
        integration: integration::Model,
    ) -> Result<RefreshResult, ApiError> {
        let refresh_start = std::time::Instant::now();

        let (_access_token, refresh_token) = self
            .integration_repo
            .decrypt_tokens(&integration)
            .await
            .map_err(|e| {
                error!(error = ?e, "Failed to decrypt tokens for integration");
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to decrypt tokens",
                )
            })?;

        let Some(refresh_token) = refresh_token else {
            warn!(
                integration_id = %integration.id,
                "Integration has no refresh token, cannot refresh"
            );
            return Ok(RefreshResult {
                success: false,
                integration_id: integration.id,
                new_expires_at: None,
                error: Some("No refresh token available".to_string()),
            });
        };

        match self
            .request_new_tokens(&integration.provider, &refresh_token)
            .await
        {
            Ok(tokens) => {
                let updated = self
                    .integration_repo
                    .rotate_tokens(
                        &integration.id,
                        &tokens.access_token,
                        tokens.refresh_token.as_deref(),
                        tokens.expires_in,
                        tokens.refresh_token_expires_in,
                    )
                    .await
                    .map_err(|e| {
                        error!(error = ?e, "Failed to persist rotated tokens");
                        ApiError::new(
                            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                            "INTERNAL_SERVER_ERROR",
                            "Failed to persist rotated tokens",
                        )
                    })?;

                let refresh_duration = refresh_start.elapsed();
                histogram!("credential_refresh_latency_ms")
                    .record(refresh_duration.as_secs_f64() * 1_000.0);

                info!(
                    integration_id = %integration.id,
                    provider = %integration.provider,
                    refresh_duration_ms = refresh_duration.as_millis(),
                    "Successfully refreshed integration credentials"
                );

                let metric_labels = vec![
                    ("provider", integration.provider.clone()),
                    ("org_id", integration.org_id.to_string()),
                ];
                counter!("credential_refresh_success_total", &metric_labels).increment(1);

                Ok(RefreshResult {
                    success: true,
                    integration_id: updated.id,
                    new_expires_at: updated
                        .access_token_expires_at()
                        .map(|dt| dt.with_timezone(&Utc)),
                    error: None,
                })
            }
            Err(e) => {
                let error_str = e.to_string();
                error!(
                    integration_id = %integration.id,
                    provider = %integration.provider,
                    error = %error_str,
                    "Failed to refresh integration credentials"
                );

                let classification = self.classify_refresh_error(&error_str);

                match classification {
                    RefreshErrorClassification::Permanent => {
                        error!(
                            integration_id = %integration.id,
                            provider = %integration.provider,
                            "Permanent credential refresh failure - marking integration as error"
                        );

                        self.mark_integration_error(&integration.id, &error_str)
                            .await?;

                        counter!("credential_refresh_permanent_failure_total").increment(1);
                    }
                    RefreshErrorClassification::Transient => {
                        warn!(
                            integration_id = %integration.id,
                            provider = %integration.provider,
                            "Transient credential refresh failure - will retry later"
                        );

                        counter!("credential_refresh_transient_failure_total").increment(1);
                    }
                    RefreshErrorClassification::RateLimited => {
                        warn!(
                            integration_id = %integration.id,
                            provider = %integration.provider,
                            "Rate limited during credential refresh"
                        );

                        counter!("credential_refresh_rate_limited_total").increment(1);
                    }
                }

                let metric_labels = vec![
                    ("provider", integration.provider.clone()),
                    ("org_id", integration.org_id.to_string()),
                ];
                counter!("credential_refresh_failure_total", &metric_labels).increment(1);

                Ok(RefreshResult {
                    success: false,
                    integration_id: integration.id,
                    new_expires_at: None,
                    error: Some(error_str),
                })
            }
        }
    }

    /// Exchange the refresh token at the provider's token endpoint
    async fn request_new_tokens(
        &self,
        provider: &str,
        refresh_token: &str,
    ) -> Result<RotatedTokens, ApiError> {
        let (endpoint, client_id, client_secret) = self.token_endpoint(provider)?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ];

        let response = self
            .http
            .post(&endpoint)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                ApiError::new(
                    axum::http::StatusCode::BAD_GATEWAY,
                    "PROVIDER_ERROR",
                    &format!("Token endpoint request failed: {}", e),
                )
            })?;

        let status = response.status();
        let body: TokenEndpointResponse = response.json().await.map_err(|e| {
            ApiError::new(
                axum::http::StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                &format!("Token endpoint returned unparseable body: {}", e),
            )
        })?;

        // GitHub reports grant failures inside a 200 body
        if let Some(err) = body.error {
            let description = body.error_description.unwrap_or_default();
            return Err(ApiError::new(
                axum::http::StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                &format!("Token endpoint error: {} {}", err, description),
            ));
        }

        if !status.is_success() {
            return Err(ApiError::new(
                axum::http::StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                &format!("Token endpoint returned HTTP {}", status),
            ));
        }

        let access_token = body.access_token.ok_or_else(|| {
            ApiError::new(
                axum::http::StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                "Token endpoint response missing access_token",
            )
        })?;

        Ok(RotatedTokens {
            access_token,
            refresh_token: body.refresh_token,
            expires_in: body.expires_in,
            refresh_token_expires_in: body.refresh_token_expires_in,
        })
    }

    /// Resolve the token endpoint and client credentials for a provider.
    ///
    /// Base URLs are overridable through configuration so tests can point at
    /// a local mock server.
    fn token_endpoint(&self, provider: &str) -> Result<(String, String, String), ApiError> {
        match provider {
            "github" => {
                let base = self
                    .config
                    .github_oauth_base
                    .clone()
                    .unwrap_or_else(|| "https://github.com".to_string());
                let client_id = self.require_credential(provider, &self.config.github_client_id)?;
                let client_secret =
                    self.require_credential(provider, &self.config.github_client_secret)?;
                Ok((
                    format!("{}/login/oauth/access_token", base),
                    client_id,
                    client_secret,
                ))
            }
            "slack" => {
                let base = self
                    .config
                    .slack_oauth_base
                    .clone()
                    .unwrap_or_else(|| "https://slack.com".to_string());
                let client_id = self.require_credential(provider, &self.config.slack_client_id)?;
                let client_secret =
                    self.require_credential(provider, &self.config.slack_client_secret)?;
                Ok((
                    format!("{}/api/oauth.v2.access", base),
                    client_id,
                    client_secret,
                ))
            }
            other => Err(ApiError::new(
                axum::http::StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("No token endpoint for provider '{}'", other),
            )),
        }
    }

    fn require_credential(
        &self,
        provider: &str,
        value: &Option<String>,
    ) -> Result<String, ApiError> {
        value.clone().ok_or_else(|| {
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                &format!("Client credentials not configured for provider '{}'", provider),
            )
        })
    }

    /// Classify token refresh errors for appropriate handling strategy
    pub fn classify_refresh_error(&self, error_str: &str) -> RefreshErrorClassification {
        let error_lower = error_str.to_lowercase();

        // Check for permanent failures first
        if error_lower.contains("invalid_grant")
            || error_lower.contains("invalid_client")
            || error_lower.contains("unauthorized_client")
            || error_lower.contains("revoked")
            || error_lower.contains("forbidden")
            || error_lower.contains("access_denied")
            || error_lower.contains("unsupported_grant_type")
        {
            return RefreshErrorClassification::Permanent;
        }

        // Check for rate limiting
        if error_lower.contains("rate_limit")
            || error_lower.contains("too_many_requests")
            || error_lower.contains("temporarily_unavailable")
            || error_lower.contains("quota_exceeded")
        {
            return RefreshErrorClassification::RateLimited;
        }

        // Default to transient for network and other temporary issues
        RefreshErrorClassification::Transient
    }

    /// Mark an integration as having an error status due to failed refresh
    async fn mark_integration_error(
        &self,
        integration_id: &Uuid,
        error_msg: &str,
    ) -> Result<(), ApiError> {
        self.integration_repo
            .mark_status(integration_id, "error")
            .await
            .map_err(|e| {
                error!(
                    integration_id = %integration_id,
                    error = ?e,
                    "Failed to mark integration as error status"
                );
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to update integration status",
                )
            })?;

        warn!(
            integration_id = %integration_id,
            error = %error_msg,
            "Marked integration as error status due to failed credential refresh"
        );

        counter!("credential_refresh_integrations_marked_error_total").increment(1);
        Ok(())
    }

    /// Compute jitter delay based on configuration
    fn compute_jitter(&self) -> u64 {
        if self.config.token_refresh.jitter_factor <= 0.0 {
            return 0;
        }

        let max_delay_seconds = (self.config.token_refresh.lead_time_seconds as f64
            * self.config.token_refresh.jitter_factor) as u64;

        let mut rng = rand::thread_rng();
        rng.gen_range(0..=max_delay_seconds)
    }

    /// On-demand refresh for when operations receive a 401 from a provider.
    /// Provides single-flight protection to prevent concurrent refresh attempts.
    #[instrument(skip_all, fields(integration_id = %integration_id))]
    pub async fn refresh_on_demand(
        &self,
        integration_id: &Uuid,
    ) -> Result<RefreshResult, ApiError> {
        // Check if there's already a refresh in progress for this integration
        {
            let in_flight = self.in_flight_refreshes.lock().await;
            if in_flight.contains_key(integration_id) {
                info!(
                    integration_id = %integration_id,
                    "Refresh already in progress, waiting and retrying"
                );
                drop(in_flight);
                // Brief wait and re-read the row to avoid racing the winner
                tokio::time::sleep(TokioDuration::from_millis(100)).await;

                return self.current_integration_state(integration_id).await;
            }
        }

        let integration = self
            .integration_repo
            .get_by_id(integration_id)
            .await
            .map_err(|e| {
                error!(
                    integration_id = %integration_id,
                    error = ?e,
                    "Failed to find integration for on-demand refresh"
                );
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to load integration",
                )
            })?
            .ok_or_else(|| {
                ApiError::new(
                    axum::http::StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "Integration not found",
                )
            })?;

        info!(
            integration_id = %integration_id,
            provider = %integration.provider,
            "Performing on-demand credential refresh"
        );

        counter!("credential_refresh_on_demand_attempts_total").increment(1);

        {
            let mut in_flight = self.in_flight_refreshes.lock().await;
            in_flight.insert(*integration_id, tokio::spawn(async {}));
        }

        let result = self.refresh_integration(integration).await;

        {
            let mut in_flight = self.in_flight_refreshes.lock().await;
            in_flight.remove(integration_id);
        }

        let result = result?;

        if result.success {
            counter!("credential_refresh_on_demand_success_total").increment(1);
        } else {
            counter!("credential_refresh_on_demand_failure_total").increment(1);
        }

        Ok(result)
    }

    /// Return a plaintext access token that is safe to use right now.
    ///
    /// A token expiring more than the buffer away is returned as-is; a token
    /// inside the buffer is refreshed first and the rotated token returned.
    /// Tokens without expiry metadata are presumed valid. Returns `None` when
    /// the integration holds no usable token and a refresh is not possible.
    #[instrument(skip_all, fields(integration_id = %integration_id))]
    pub async fn get_valid_token(
        &self,
        integration_id: &Uuid,
    ) -> Result<Option<String>, ApiError> {
        let integration = self.load_integration(integration_id).await?;

        let (access_token, refresh_token) = self
            .integration_repo
            .decrypt_tokens(&integration)
            .await
            .map_err(|e| {
                error!(error = ?e, "Failed to decrypt tokens for integration");
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to decrypt tokens",
                )
            })?;

        if let Some(token) = access_token {
            match integration.access_token_expires_at() {
                None => {
                    debug!(
                        integration_id = %integration_id,
                        "Access token has no expiry metadata, presuming valid"
                    );
                    return Ok(Some(token));
                }
                Some(expires_at) => {
                    let safe_until =
                        expires_at - Duration::seconds(TOKEN_VALIDITY_BUFFER_SECONDS);
                    if Utc::now() < safe_until {
                        return Ok(Some(token));
                    }
                }
            }
        }

        if refresh_token.is_none() {
            warn!(
                integration_id = %integration_id,
                "Access token stale with no refresh token, no usable credential"
            );
            return Ok(None);
        }

        let result = self.refresh_on_demand(integration_id).await?;
        if !result.success {
            return Ok(None);
        }

        let refreshed = self.load_integration(integration_id).await?;
        let (access_token, _) = self
            .integration_repo
            .decrypt_tokens(&refreshed)
            .await
            .map_err(|e| {
                error!(error = ?e, "Failed to decrypt rotated tokens");
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to decrypt tokens",
                )
            })?;

        Ok(access_token)
    }

    async fn load_integration(
        &self,
        integration_id: &Uuid,
    ) -> Result<integration::Model, ApiError> {
        self.integration_repo
            .get_by_id(integration_id)
            .await
            .map_err(|e| {
                error!(
                    integration_id = %integration_id,
                    error = ?e,
                    "Failed to load integration"
                );
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to load integration",
                )
            })?
            .ok_or_else(|| {
                ApiError::new(
                    axum::http::StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "Integration not found",
                )
            })
    }

    /// Re-read an integration after a concurrent refresh completed
    async fn current_integration_state(
        &self,
        integration_id: &Uuid,
    ) -> Result<RefreshResult, ApiError> {
        let integration = self
            .integration_repo
            .get_by_id(integration_id)
            .await
            .map_err(|e| {
                error!(
                    integration_id = %integration_id,
                    error = ?e,
                    "Failed to find integration after refresh"
                );
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to get integration state",
                )
            })?
            .ok_or_else(|| {
                ApiError::new(
                    axum::http::StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "Integration not found",
                )
            })?;

        Ok(RefreshResult {
            success: integration.status == "active",
            integration_id: *integration_id,
            new_expires_at: integration
                .access_token_expires_at()
                .map(|dt| dt.with_timezone(&Utc)),
            error: None,
        })
    }
}

/// Plaintext token material returned by a provider's token endpoint
struct RotatedTokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    refresh_token_expires_in: Option<i64>,
}

impl Clone for CredentialRefreshService {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            integration_repo: self.integration_repo.clone(),
            http: self.http.clone(),
            in_flight_refreshes: self.in_flight_refreshes.clone(),
        }
    }
}
