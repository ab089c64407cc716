//! Migration to create the report_exports table.
//!
//! Notarized report archive. The content hash is unique: re-uploading the
//! same bytes is an idempotent no-op, and verification is a pure lookup by
//! hash.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReportExports::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReportExports::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ReportExports::OrgId).uuid().not_null())
                    .col(
                        ColumnDef::new(ReportExports::ContentHash)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReportExports::StorageLocation)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReportExports::Platform).text().not_null())
                    .col(ColumnDef::new(ReportExports::FileName).text().null())
                    .col(
                        ColumnDef::new(ReportExports::SizeBytes)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReportExports::CreatedAt)
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
                    .name("idx_report_exports_content_hash")
                    .table(ReportExports::Table)
                    .col(ReportExports::ContentHash)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_report_exports_org_id")
                    .table(ReportExports::Table)
                    .col(ReportExports::OrgId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_report_exports_content_hash")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_report_exports_org_id").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ReportExports::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ReportExports {
    Table,
    Id,
    OrgId,
    ContentHash,
    StorageLocation,
    Platform,
    FileName,
    SizeBytes,
    CreatedAt,
}
