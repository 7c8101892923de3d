//! Transactional settlement of reports.

use std::sync::Arc;

use super::content::set_content_active;
use super::user::apply_ban;
use crate::entities::{Report, report};
use crate::stores::{CommitOutcome, EnforcementCommit, EnforcementStore, Sanction};
use agora_common::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, TransactionTrait, sea_query::Expr,
};
use tracing::debug;

/// Applies report settlements in a single database transaction.
#[derive(Clone)]
pub struct EnforcementRepository {
    db: Arc<DatabaseConnection>,
}

impl EnforcementRepository {
    /// Create a new enforcement repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn apply(txn: &DatabaseTransaction, commit: EnforcementCommit) -> Result<CommitOutcome, DbErr> {
        let resolution = commit.resolution;

        let mut update = Report::update_many()
            .col_expr(report::Column::Status, Expr::value(resolution.status))
            .col_expr(report::Column::Severity, Expr::value(resolution.severity))
            .col_expr(
                report::Column::ActionsTaken,
                Expr::value(serde_json::json!(resolution.actions_taken)),
            )
            .col_expr(report::Column::UpdatedAt, Expr::value(Utc::now()));

        if let Some(decisions) = resolution.ai_decisions {
            update = update.col_expr(
                report::Column::AiDecisions,
                Expr::value(serde_json::json!(decisions)),
            );
        }
        if let Some(confidence) = resolution.ai_confidence {
            update = update.col_expr(report::Column::AiConfidence, Expr::value(confidence));
        }
        if let Some(reasons) = resolution.ai_reasons {
            update = update.col_expr(
                report::Column::AiReasons,
                Expr::value(serde_json::json!(reasons)),
            );
        }
        if let Some(reasons) = resolution.admin_reasons {
            update = update.col_expr(
                report::Column::AdminReasons,
                Expr::value(serde_json::json!(reasons)),
            );
        }
        if let Some(moderator) = resolution.resolved_by {
            update = update.col_expr(report::Column::ResolvedBy, Expr::value(moderator));
        }

        // Conditional on the expected status: a concurrent or repeated settlement matches no row.
        let result = update
            .filter(report::Column::Id.eq(commit.report_id.as_str()))
            .filter(report::Column::Status.eq(commit.expected_status))
            .exec(txn)
            .await?;

        if result.rows_affected == 0 {
            return Ok(CommitOutcome::AlreadySettled);
        }

        let (ban, warning) = match commit.sanction {
            Some(Sanction::Ban(new_ban)) => (Some(apply_ban(txn, new_ban).await?), None),
            Some(Sanction::Warn(new_warning)) => {
                (None, Some(new_warning.into_active_model().insert(txn).await?))
            }
            None => (None, None),
        };

        let content_deactivated = match &commit.deactivate {
            Some(content) => set_content_active(txn, content, false).await?,
            None => false,
        };

        let report = Report::find_by_id(commit.report_id.as_str())
            .one(txn)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(commit.report_id.clone()))?;

        Ok(CommitOutcome::Applied {
            report,
            ban,
            warning,
            content_deactivated,
        })
    }
}

#[async_trait]
impl EnforcementStore for EnforcementRepository {
    async fn commit(&self, commit: EnforcementCommit) -> AppResult<CommitOutcome> {
        let report_id = commit.report_id.clone();

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        match Self::apply(&txn, commit).await {
            Ok(CommitOutcome::AlreadySettled) => {
                txn.rollback()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                debug!(report_id = %report_id, "Report already settled, nothing written");
                Ok(CommitOutcome::AlreadySettled)
            }
            Ok(outcome) => {
                txn.commit()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(outcome)
            }
            Err(e) => {
                // Dropping the transaction rolls it back as well.
                let _ = txn.rollback().await;
                Err(AppError::Database(e.to_string()))
            }
        }
    }
}
