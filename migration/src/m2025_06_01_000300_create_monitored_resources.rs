//! Migration to create the monitored_resources table.
//!
//! A monitored resource is a channel, repository, or board tracked for audit
//! purposes. (integration_id, external_id) is unique: a given external
//! resource is tracked at most once.

use sea_orm_migration::prelude::*;

use super::m2025_06_01_000200_create_integrations::Integrations;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MonitoredResources::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MonitoredResources::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MonitoredResources::IntegrationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MonitoredResources::OrgId).uuid().not_null())
                    .col(
                        ColumnDef::new(MonitoredResources::ExternalId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MonitoredResources::DisplayName)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MonitoredResources::ResourceKind)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MonitoredResources::TeamId).uuid().null())
                    .col(
                        ColumnDef::new(MonitoredResources::Metadata)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MonitoredResources::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(MonitoredResources::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_monitored_resources_integration_id")
                            .from(
                                MonitoredResources::Table,
                                MonitoredResources::IntegrationId,
                            )
                            .to(Integrations::Table, Integrations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_monitored_resources_integration_external")
                    .table(MonitoredResources::Table)
                    .col(MonitoredResources::IntegrationId)
                    .col(MonitoredResources::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_monitored_resources_org_id")
                    .table(MonitoredResources::Table)
                    .col(MonitoredResources::OrgId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_monitored_resources_integration_external")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_monitored_resources_org_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(MonitoredResources::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum MonitoredResources {
    Table,
    Id,
    IntegrationId,
    OrgId,
    ExternalId,
    DisplayName,
    ResourceKind,
    TeamId,
    Metadata,
    CreatedAt,
    UpdatedAt,
}
