//! Report repository.

use std::sync::Arc;

use crate::entities::{
    Report,
    report::{self, ReportStatus},
};
use crate::stores::ReportStore;
use agora_common::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

/// Report repository for database operations.
#[derive(Clone)]
pub struct ReportRepository {
    db: Arc<DatabaseConnection>,
}

impl ReportRepository {
    /// Create a new report repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Count reports in a given status.
    pub async fn count_by_status(&self, status: ReportStatus) -> AppResult<u64> {
        Report::find()
            .filter(report::Column::Status.eq(status))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[async_trait]
impl ReportStore for ReportRepository {
    async fn create_report(&self, model: report::Model) -> AppResult<report::Model> {
        let active = report::ActiveModel {
            id: Set(model.id),
            reported_by: Set(model.reported_by),
            target_id: Set(model.target_id),
            target_type: Set(model.target_type),
            target_user_id: Set(model.target_user_id),
            report_reason: Set(model.report_reason),
            report_comment: Set(model.report_comment),
            severity: Set(model.severity),
            ai_decisions: Set(model.ai_decisions),
            ai_confidence: Set(model.ai_confidence),
            ai_reasons: Set(model.ai_reasons),
            status: Set(model.status),
            actions_taken: Set(model.actions_taken),
            admin_reasons: Set(model.admin_reasons),
            resolved_by: Set(model.resolved_by),
            created_at: Set(model.created_at),
            updated_at: Set(model.updated_at),
        };

        active
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_report(&self, report_id: &str) -> AppResult<Option<report::Model>> {
        Report::find_by_id(report_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_reports(
        &self,
        status: Option<ReportStatus>,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<report::Model>> {
        let mut query = Report::find().order_by_desc(report::Column::CreatedAt);

        if let Some(s) = status {
            query = query.filter(report::Column::Status.eq(s));
        }

        query
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn reports_against_user(
        &self,
        user_id: &str,
        limit: u64,
    ) -> AppResult<Vec<report::Model>> {
        Report::find()
            .filter(report::Column::TargetUserId.eq(user_id))
            .order_by_desc(report::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn stale_pending_reports(
        &self,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<report::Model>> {
        Report::find()
            .filter(report::Column::Status.eq(ReportStatus::Pending))
            .filter(report::Column::CreatedAt.lt(older_than))
            .order_by_asc(report::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
