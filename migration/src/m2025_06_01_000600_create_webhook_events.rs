//! Migration to create the webhook_events table.
//!
//! Queue of verified-but-unprocessed webhook deliveries. Status moves
//! pending -> processing -> completed | failed. Claiming is done with a
//! conditional update so concurrent processors never pick the same row.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WebhookEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WebhookEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WebhookEvents::OrgId).uuid().not_null())
                    .col(ColumnDef::new(WebhookEvents::Provider).text().not_null())
                    .col(ColumnDef::new(WebhookEvents::EventType).text().not_null())
                    .col(
                        ColumnDef::new(WebhookEvents::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookEvents::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(WebhookEvents::Error).text().null())
                    .col(
                        ColumnDef::new(WebhookEvents::ClaimedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WebhookEvents::ProcessedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WebhookEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Processor scans pending rows oldest-first
        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_events_status_created")
                    .table(WebhookEvents::Table)
                    .col(WebhookEvents::Status)
                    .col(WebhookEvents::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_webhook_events_status_created")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(WebhookEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum WebhookEvents {
    Table,
    Id,
    OrgId,
    Provider,
    EventType,
    Payload,
    Status,
    Error,
    ClaimedAt,
    ProcessedAt,
    CreatedAt,
}
