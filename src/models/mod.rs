//! # Data Models
//!
//! This module contains all the data models used throughout the Veritas Core API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod activity_record;
pub mod agent_key;
pub mod integration;
pub mod monitored_resource;
pub mod profile;
pub mod report_export;
pub mod webhook_event;

pub use activity_record::ActivityDetails;
pub use activity_record::Entity as ActivityRecord;
pub use agent_key::Entity as AgentKey;
pub use integration::Entity as Integration;
pub use monitored_resource::Entity as MonitoredResource;
pub use profile::Entity as Profile;
pub use report_export::Entity as ReportExport;
pub use webhook_event::Entity as WebhookEvent;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "veritas-core".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
