//! Create report table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Report::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Report::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Report::ReportedBy).string_len(32).not_null())
                    .col(ColumnDef::new(Report::TargetId).string_len(64).not_null())
                    .col(ColumnDef::new(Report::TargetType).string_len(16).not_null())
                    .col(ColumnDef::new(Report::TargetUserId).string_len(32).not_null())
                    .col(ColumnDef::new(Report::ReportReason).string_len(32).not_null())
                    .col(ColumnDef::new(Report::ReportComment).string_len(150))
                    .col(ColumnDef::new(Report::Severity).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(Report::AiDecisions)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[\"UNCERTAIN\"]'::jsonb")),
                    )
                    .col(ColumnDef::new(Report::AiConfidence).double().not_null().default(0.0))
                    .col(
                        ColumnDef::new(Report::AiReasons)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Report::Status)
                            .string_len(16)
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(
                        ColumnDef::new(Report::ActionsTaken)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(ColumnDef::new(Report::AdminReasons).json_binary())
                    .col(ColumnDef::new(Report::ResolvedBy).string_len(32))
                    .col(
                        ColumnDef::new(Report::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Report::UpdatedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Index: (status, created_at) for the admin queue and the stale-report sweep
        manager
            .create_index(
                Index::create()
                    .name("idx_report_status_created_at")
                    .table(Report::Table)
                    .col(Report::Status)
                    .col(Report::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Index: target_user_id (history of reports against a user)
        manager
            .create_index(
                Index::create()
                    .name("idx_report_target_user_id")
                    .table(Report::Table)
                    .col(Report::TargetUserId)
                    .to_owned(),
            )
            .await?;

        // Index: reported_by (submission history)
        manager
            .create_index(
                Index::create()
                    .name("idx_report_reported_by")
                    .table(Report::Table)
                    .col(Report::ReportedBy)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Report::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Report {
    Table,
    Id,
    ReportedBy,
    TargetId,
    TargetType,
    TargetUserId,
    ReportReason,
    ReportComment,
    Severity,
    AiDecisions,
    AiConfidence,
    AiReasons,
    Status,
    ActionsTaken,
    AdminReasons,
    ResolvedBy,
    CreatedAt,
    UpdatedAt,
}
