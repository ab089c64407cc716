//! # Webhook Signature Verification
//!
//! This module provides signature verification for GitHub and Slack webhooks
//! using HMAC-SHA256 with constant-time comparison to prevent timing attacks.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::config::AppConfig;

type HmacSha256 = Hmac<Sha256>;

/// Errors that can occur during webhook signature verification
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing required signature header: {header}")]
    MissingSignature { header: String },

    #[error("Invalid signature format: {header}")]
    InvalidSignatureFormat { header: String },

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Missing required timestamp header: {header}")]
    MissingTimestamp { header: String },

    #[error("Invalid timestamp format: {header}")]
    InvalidTimestamp { header: String },

    #[error("Timestamp too old: {seconds}s old, max allowed: {max_seconds}s")]
    TimestampTooOld { seconds: u64, max_seconds: u64 },

    #[error("Timestamp too far in future: {seconds}s in future, max allowed: {max_seconds}s")]
    TimestampTooFuture { seconds: u64, max_seconds: u64 },

    #[error("Unsupported provider: {provider}")]
    UnsupportedProvider { provider: String },
}

impl VerificationError {
    /// Returns the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            VerificationError::UnsupportedProvider { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Result type for webhook verification
pub type VerificationResult<T> = Result<T, VerificationError>;

/// Verifies GitHub webhook signature using HMAC-SHA256
pub fn verify_github_signature(
    body: &[u8],
    signature_header: &str,
    secret: &str,
) -> VerificationResult<()> {
    debug!(
        body_size = body.len(),
        "Starting GitHub signature verification"
    );

    if signature_header.is_empty() {
        return Err(VerificationError::MissingSignature {
            header: "X-Hub-Signature-256".to_string(),
        });
    }

    // GitHub signatures are prefixed with "sha256="
    let signature_prefix = "sha256=";
    if !signature_header.starts_with(signature_prefix) {
        return Err(VerificationError::InvalidSignatureFormat {
            header: "X-Hub-Signature-256 must start with 'sha256='".to_string(),
        });
    }

    let expected_hex = &signature_header[signature_prefix.len()..];

    // Compute HMAC-SHA256 of the body
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VerificationError::VerificationFailed)?;
    mac.update(body);
    let expected_bytes = mac.finalize().into_bytes();

    // Decode the provided signature
    let provided_bytes =
        hex::decode(expected_hex).map_err(|_| VerificationError::InvalidSignatureFormat {
            header: "X-Hub-Signature-256 contains invalid hex".to_string(),
        })?;

    // Compare signatures using constant-time comparison to prevent timing attacks
    let expected_bytes_array: &[u8] = expected_bytes.as_ref();
    if subtle::ConstantTimeEq::ct_eq(expected_bytes_array, &provided_bytes[..]).into() {
        Ok(())
    } else {
        Err(VerificationError::VerificationFailed)
    }
}

/// Verifies Slack webhook signature using HMAC-SHA256 with timestamp validation
pub fn verify_slack_signature(
    body: &[u8],
    signature_header: &str,
    timestamp_header: &str,
    secret: &str,
    tolerance_seconds: u64,
) -> VerificationResult<()> {
    debug!(
        body_size = body.len(),
        tolerance_seconds, "Starting Slack signature verification"
    );

    if signature_header.is_empty() {
        return Err(VerificationError::MissingSignature {
            header: "X-Slack-Signature".to_string(),
        });
    }

    if timestamp_header.is_empty() {
        return Err(VerificationError::MissingTimestamp {
            header: "X-Slack-Request-Timestamp".to_string(),
        });
    }

    // Parse timestamp
    let timestamp =
        timestamp_header
            .parse::<u64>()
            .map_err(|_| VerificationError::InvalidTimestamp {
                header: "X-Slack-Request-Timestamp must be a valid Unix timestamp".to_string(),
            })?;

    // Check timestamp is within tolerance window
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| VerificationError::InvalidTimestamp {
            header: "Failed to get current time".to_string(),
        })?
        .as_secs();

    let time_diff = now.abs_diff(timestamp);

    if time_diff > tolerance_seconds {
        if now > timestamp {
            return Err(VerificationError::TimestampTooOld {
                seconds: time_diff,
                max_seconds: tolerance_seconds,
            });
        } else {
            return Err(VerificationError::TimestampTooFuture {
                seconds: time_diff,
                max_seconds: tolerance_seconds,
            });
        }
    }

    // Slack signatures are prefixed with "v0="
    let signature_prefix = "v0=";
    if !signature_header.starts_with(signature_prefix) {
        return Err(VerificationError::InvalidSignatureFormat {
            header: "X-Slack-Signature must start with 'v0='".to_string(),
        });
    }

    let expected_hex = &signature_header[signature_prefix.len()..];

    // Construct the base string: "v0:{timestamp}:{body}"
    let base_string = format!("v0:{}:{}", timestamp, String::from_utf8_lossy(body));

    // Compute HMAC-SHA256 of the base string
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VerificationError::VerificationFailed)?;
    mac.update(base_string.as_bytes());
    let expected_bytes = mac.finalize().into_bytes();

    // Decode the provided signature
    let provided_bytes =
        hex::decode(expected_hex).map_err(|_| VerificationError::InvalidSignatureFormat {
            header: "X-Slack-Signature contains invalid hex".to_string(),
        })?;

    // Compare signatures using constant-time comparison to prevent timing attacks
    let expected_bytes_array: &[u8] = expected_bytes.as_ref();
    if subtle::ConstantTimeEq::ct_eq(expected_bytes_array, &provided_bytes[..]).into() {
        Ok(())
    } else {
        Err(VerificationError::VerificationFailed)
    }
}

/// Verifies webhook signature for the given provider
pub fn verify_webhook_signature(
    provider: &str,
    body: &[u8],
    headers: &HeaderMap,
    config: &AppConfig,
) -> VerificationResult<()> {
    match provider {
        "github" => {
            let Some(secret) = config.webhook_github_secret.as_ref() else {
                tracing::warn!(
                    provider = "github",
                    "Webhook secret not configured; accepting delivery unverified"
                );
                return Ok(());
            };

            let signature_header = headers
                .get("x-hub-signature-256")
                .and_then(|h| h.to_str().ok())
                .unwrap_or("");

            verify_github_signature(body, signature_header, secret)
        }
        "slack" => {
            let Some(secret) = config.webhook_slack_signing_secret.as_ref() else {
                tracing::warn!(
                    provider = "slack",
                    "Webhook signing secret not configured; accepting delivery unverified"
                );
                return Ok(());
            };

            let signature_header = headers
                .get("x-slack-signature")
                .and_then(|h| h.to_str().ok())
                .unwrap_or("");

            let timestamp_header = headers
                .get("x-slack-request-timestamp")
                .and_then(|h| h.to_str().ok())
                .unwrap_or("");

            verify_slack_signature(
                body,
                signature_header,
                timestamp_header,
                secret,
                config.webhook_slack_tolerance_seconds,
            )
        }
        _ => Err(VerificationError::UnsupportedProvider {
            provider: provider.to_string(),
        }),
    }
}
