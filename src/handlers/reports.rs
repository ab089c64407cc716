//! # Report Notarization Handlers
//!
//! Operator-facing upload and verification endpoints. Uploads are hashed and
//! archived byte-for-byte; verification re-hashes the presented file and
//! answers from the registry.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::Json,
};
use serde_json::json;

use crate::auth::{OperatorAuth, OrgExtension, OrgId};
use crate::error::{ApiError, validation_error};
use crate::notary::{NotarizedReport, VerificationVerdict, content_hash};
use crate::server::AppState;

/// Parsed parts of a multipart report submission
struct ReportUpload {
    bytes: Vec<u8>,
    platform: Option<String>,
    file_name: Option<String>,
    content_hash: Option<String>,
}

/// Pull the file bytes and metadata fields out of a multipart body
async fn read_multipart(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> Result<ReportUpload, ApiError> {
    let mut upload = ReportUpload {
        bytes: Vec::new(),
        platform: None,
        file_name: None,
        content_hash: None,
    };
    let mut saw_file = false;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &format!("Malformed multipart body: {}", e),
        )
    })? {
        match field.name() {
            Some("file") => {
                saw_file = true;
                if upload.file_name.is_none() {
                    upload.file_name = field.file_name().map(|name| name.to_string());
                }
                let data = field.bytes().await.map_err(|_| {
                    ApiError::new(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        "PAYLOAD_TOO_LARGE",
                        "Report file exceeds the maximum allowed size",
                    )
                })?;
                if data.len() > max_bytes {
                    return Err(ApiError::new(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        "PAYLOAD_TOO_LARGE",
                        "Report file exceeds the maximum allowed size",
                    ));
                }
                upload.bytes = data.to_vec();
            }
            Some("platform") => {
                upload.platform = Some(read_text_field(field).await?);
            }
            Some("file_name") => {
                upload.file_name = Some(read_text_field(field).await?);
            }
            Some("content_hash") => {
                upload.content_hash = Some(read_text_field(field).await?);
            }
            _ => {}
        }
    }

    if !saw_file && upload.content_hash.is_none() {
        return Err(validation_error(
            "Validation failed",
            json!({ "file": "Missing multipart 'file' part" }),
        ));
    }

    Ok(upload)
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field.text().await.map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Multipart field is not valid UTF-8 text",
        )
    })
}

/// Notarize an uploaded report
///
/// The uploaded bytes are hashed with SHA-256, archived in the blob store,
/// and the digest recorded in the registry. Re-uploading identical bytes
/// returns the original record with `already_notarized` set.
#[utoipa::path(
    post,
    path = "/reports/upload",
    params(crate::handlers::OrgHeader),
    request_body(
        content = String,
        description = "Multipart body with 'file' (required), 'platform' and 'file_name' (optional)",
        content_type = "multipart/form-data"
    ),
    responses(
        (status = 200, description = "Report notarized", body = NotarizedReport),
        (status = 400, description = "Missing file part or malformed body", body = ApiError),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 413, description = "File exceeds maximum size", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn upload_report(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    OrgExtension(OrgId(org_id)): OrgExtension,
    mut multipart: Multipart,
) -> Result<Json<NotarizedReport>, ApiError> {
    let upload = read_multipart(&mut multipart, state.config.report_max_bytes).await?;

    if upload.bytes.is_empty() {
        return Err(validation_error(
            "Validation failed",
            json!({ "file": "Report file is empty" }),
        ));
    }

    let platform = upload.platform.as_deref().unwrap_or("generic");
    let notarized = state
        .notary
        .notarize(org_id, platform, upload.file_name, &upload.bytes)
        .await?;

    Ok(Json(notarized))
}

/// Verify a report against the notarized registry
///
/// Accepts either a multipart 'file' part (re-hashed server-side) or a
/// 'content_hash' text part with a precomputed digest. Returns the verdict
/// when the digest is known and 404 when it is not, so a tampered report is
/// indistinguishable from one that was never notarized.
#[utoipa::path(
    post,
    path = "/reports/verify",
    params(crate::handlers::OrgHeader),
    request_body(
        content = String,
        description = "Multipart body with 'file' or 'content_hash'",
        content_type = "multipart/form-data"
    ),
    responses(
        (status = 200, description = "Report is authentic", body = VerificationVerdict),
        (status = 400, description = "Missing file and hash, or malformed body", body = ApiError),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Digest not found in the registry", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn verify_report(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    _org: OrgExtension,
    mut multipart: Multipart,
) -> Result<Json<VerificationVerdict>, ApiError> {
    let upload = read_multipart(&mut multipart, state.config.report_max_bytes).await?;

    let hash = if !upload.bytes.is_empty() {
        content_hash(&upload.bytes)
    } else if let Some(hash) = upload.content_hash {
        let normalized = hash.trim().to_lowercase();
        if normalized.len() != 64 || !normalized.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(validation_error(
                "Validation failed",
                json!({ "content_hash": "Must be 64 lowercase hex characters" }),
            ));
        }
        normalized
    } else {
        return Err(validation_error(
            "Validation failed",
            json!({ "file": "Provide a 'file' part or a 'content_hash' field" }),
        ));
    };

    let verdict = state.notary.verify_hash(&hash).await?;

    if !verdict.verified {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "No notarized report matches the presented content",
        )
        .with_details(json!({ "content_hash": verdict.content_hash })));
    }

    Ok(Json(verdict))
}
