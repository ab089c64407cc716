//! Migration to create the agent_keys table.
//!
//! Keys for desktop telemetry agents. Only the SHA-256 hash of the key is
//! stored; the plaintext is shown once at mint time and never persisted.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AgentKeys::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AgentKeys::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AgentKeys::OrgId).uuid().not_null())
                    .col(ColumnDef::new(AgentKeys::KeyHash).text().not_null())
                    .col(ColumnDef::new(AgentKeys::Name).text().not_null())
                    .col(
                        ColumnDef::new(AgentKeys::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(AgentKeys::LastUsedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AgentKeys::CreatedAt)
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
                    .name("idx_agent_keys_key_hash")
                    .table(AgentKeys::Table)
                    .col(AgentKeys::KeyHash)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_agent_keys_key_hash").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AgentKeys::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum AgentKeys {
    Table,
    Id,
    OrgId,
    KeyHash,
    Name,
    Status,
    LastUsedAt,
    CreatedAt,
}
