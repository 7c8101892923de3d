//! Create ban and warning tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Ban::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Ban::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Ban::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(Ban::ReportId).string_len(32))
                    .col(ColumnDef::new(Ban::Title).string_len(256).not_null())
                    .col(ColumnDef::new(Ban::Reasons).json_binary().not_null())
                    .col(ColumnDef::new(Ban::BanType).string_len(8).not_null())
                    .col(ColumnDef::new(Ban::Severity).string_len(8).not_null())
                    .col(ColumnDef::new(Ban::BannedBy).string_len(32).not_null())
                    .col(ColumnDef::new(Ban::ExpiresAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Ban::DurationMs).big_integer())
                    .col(
                        ColumnDef::new(Ban::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ban_user")
                            .from(Ban::Table, Ban::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ban_user_id")
                    .table(Ban::Table)
                    .col(Ban::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Warning::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Warning::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Warning::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(Warning::ReportId).string_len(32))
                    .col(ColumnDef::new(Warning::Title).string_len(256).not_null())
                    .col(ColumnDef::new(Warning::Reasons).json_binary().not_null())
                    .col(ColumnDef::new(Warning::Severity).string_len(8).not_null())
                    .col(ColumnDef::new(Warning::WarnedBy).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Warning::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Warning::AcknowledgedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Warning::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_warning_user")
                            .from(Warning::Table, Warning::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_warning_user_id")
                    .table(Warning::Table)
                    .col(Warning::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Warning::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Ban::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}

#[derive(Iden)]
enum Ban {
    Table,
    Id,
    UserId,
    ReportId,
    Title,
    Reasons,
    BanType,
    Severity,
    BannedBy,
    ExpiresAt,
    DurationMs,
    CreatedAt,
}

#[derive(Iden)]
enum Warning {
    Table,
    Id,
    UserId,
    ReportId,
    Title,
    Reasons,
    Severity,
    WarnedBy,
    ExpiresAt,
    AcknowledgedAt,
    CreatedAt,
}
