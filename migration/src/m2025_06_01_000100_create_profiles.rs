//! Migration to create the profiles table.
//!
//! Profiles are internal user accounts. The `platform_identities` JSONB column
//! maps an external platform name to either a structured identity object or a
//! legacy bare-string handle.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Profiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Profiles::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Profiles::OrgId).uuid().not_null())
                    .col(ColumnDef::new(Profiles::DisplayName).text().not_null())
                    .col(ColumnDef::new(Profiles::Email).text().null())
                    .col(
                        ColumnDef::new(Profiles::PlatformIdentities)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Profiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Profiles::UpdatedAt)
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
                    .name("idx_profiles_org_id")
                    .table(Profiles::Table)
                    .col(Profiles::OrgId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_profiles_org_id").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Profiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Profiles {
    Table,
    Id,
    OrgId,
    DisplayName,
    Email,
    PlatformIdentities,
    CreatedAt,
    UpdatedAt,
}
