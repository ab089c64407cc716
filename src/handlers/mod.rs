//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the Veritas Core API.

use crate::models::ServiceInfo;
use axum::response::Json;

pub mod activities;
pub mod identities;
pub mod ingest;
pub mod reports;
pub mod webhooks;

pub use crate::auth::OrgHeader;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}
