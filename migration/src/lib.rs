//! Database migrations for Veritas Core.
//!
//! One migration per table, using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_01_000100_create_profiles;
mod m2025_06_01_000200_create_integrations;
mod m2025_06_01_000300_create_monitored_resources;
mod m2025_06_01_000400_create_activity_records;
mod m2025_06_01_000500_create_report_exports;
mod m2025_06_01_000600_create_webhook_events;
mod m2025_06_01_000700_create_agent_keys;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_01_000100_create_profiles::Migration),
            Box::new(m2025_06_01_000200_create_integrations::Migration),
            Box::new(m2025_06_01_000300_create_monitored_resources::Migration),
            Box::new(m2025_06_01_000400_create_activity_records::Migration),
            Box::new(m2025_06_01_000500_create_report_exports::Migration),
            Box::new(m2025_06_01_000600_create_webhook_events::Migration),
            Box::new(m2025_06_01_000700_create_agent_keys::Migration),
        ]
    }
}
