//! Migration to create the activity_records table.
//!
//! The activity ledger. Rows are write-once: nothing in the service updates
//! or deletes them, corrections are compensating inserts. The nullable
//! dedupe_key carries a unique index so redelivered webhooks collapse to a
//! single row.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ActivityRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ActivityRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ActivityRecords::OrgId).uuid().not_null())
                    .col(
                        ColumnDef::new(ActivityRecords::ActionType)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ActivityRecords::ActorId).uuid().null())
                    .col(ColumnDef::new(ActivityRecords::ResourceId).uuid().null())
                    .col(ColumnDef::new(ActivityRecords::Summary).text().not_null())
                    .col(
                        ColumnDef::new(ActivityRecords::Details)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ActivityRecords::DedupeKey).text().null())
                    .col(
                        ColumnDef::new(ActivityRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_activity_records_dedupe_key")
                    .table(ActivityRecords::Table)
                    .col(ActivityRecords::DedupeKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Ledger reads are ordered by creation time within an org
        manager
            .create_index(
                Index::create()
                    .name("idx_activity_records_org_created")
                    .table(ActivityRecords::Table)
                    .col(ActivityRecords::OrgId)
                    .col(ActivityRecords::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_activity_records_dedupe_key")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_activity_records_org_created")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ActivityRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ActivityRecords {
    Table,
    Id,
    OrgId,
    ActionType,
    ActorId,
    ResourceId,
    Summary,
    Details,
    DedupeKey,
    CreatedAt,
}
