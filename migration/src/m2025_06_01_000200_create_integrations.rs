//! Migration to create the integrations table.
//!
//! One row per (organization, provider) pair. Token columns hold vault
//! envelopes, never plaintext. Rows are superseded in place, never deleted.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Integrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Integrations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Integrations::OrgId).uuid().not_null())
                    .col(ColumnDef::new(Integrations::Provider).text().not_null())
                    .col(
                        ColumnDef::new(Integrations::AccessTokenCiphertext)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Integrations::RefreshTokenCiphertext)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(Integrations::ExpiresIn).big_integer().null())
                    .col(
                        ColumnDef::new(Integrations::RefreshTokenExpiresIn)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Integrations::TokenIssuedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Integrations::InstallationId).text().null())
                    .col(ColumnDef::new(Integrations::Username).text().null())
                    .col(ColumnDef::new(Integrations::Scope).text().null())
                    .col(
                        ColumnDef::new(Integrations::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Integrations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Integrations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One integration per (org, provider)
        manager
            .create_index(
                Index::create()
                    .name("idx_integrations_org_provider")
                    .table(Integrations::Table)
                    .col(Integrations::OrgId)
                    .col(Integrations::Provider)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_integrations_org_provider")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Integrations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Integrations {
    Table,
    Id,
    OrgId,
    Provider,
    AccessTokenCiphertext,
    RefreshTokenCiphertext,
    ExpiresIn,
    RefreshTokenExpiresIn,
    TokenIssuedAt,
    InstallationId,
    Username,
    Scope,
    Status,
    CreatedAt,
    UpdatedAt,
}
