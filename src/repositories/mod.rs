//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM operations
//! for database entities, providing a clean API for data access with org-aware methods.

pub mod activity;
pub mod agent_key;
pub mod integration;
pub mod profile;
pub mod report_export;
pub mod resource;
pub mod webhook_event;

pub use activity::{ActivityRepository, AppendOutcome};
pub use agent_key::AgentKeyRepository;
pub use integration::IntegrationRepository;
pub use profile::ProfileRepository;
pub use report_export::{NotarizeOutcome, ReportExportRepository};
pub use resource::ResourceRepository;
pub use webhook_event::WebhookEventRepository;
