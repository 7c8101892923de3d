//! User repository: account status, bans and warnings.

use std::sync::Arc;

use crate::entities::{
    Ban, User, Warning,
    ban::{self, BanType},
    user::{self, AccountStatus},
    warning,
};
use crate::stores::{IdentityStore, NewBan, NewWarning};
use agora_common::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
    sea_query::Expr,
};
use tracing::info;

/// User repository for database operations.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<user::Model> {
        self.find_user(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    /// Warnings issued to a user, newest first.
    pub async fn warnings_for_user(&self, user_id: &str) -> AppResult<Vec<warning::Model>> {
        Warning::find()
            .filter(warning::Column::UserId.eq(user_id))
            .order_by_desc(warning::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

/// Insert a ban and move the account status on any connection or transaction.
///
/// A TEMP ban never lifts a TERMINATED account back to SUSPENDED.
pub(crate) async fn apply_ban<C: ConnectionTrait>(
    conn: &C,
    new_ban: NewBan,
) -> Result<ban::Model, DbErr> {
    let status = new_ban.resulting_status();
    let user_id = new_ban.user_id.clone();

    let model = new_ban.into_active_model().insert(conn).await?;

    let mut update = User::update_many()
        .col_expr(user::Column::Status, Expr::value(status))
        .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(user::Column::Id.eq(user_id));
    if status == AccountStatus::Suspended {
        update = update.filter(user::Column::Status.ne(AccountStatus::Terminated));
    }
    update.exec(conn).await?;

    Ok(model)
}

#[async_trait]
impl IdentityStore for UserRepository {
    async fn find_user(&self, user_id: &str) -> AppResult<Option<user::Model>> {
        User::find_by_id(user_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn update_user_status(&self, user_id: &str, status: AccountStatus) -> AppResult<()> {
        let result = User::update_many()
            .col_expr(user::Column::Status, Expr::value(status))
            .col_expr(user::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(user::Column::Id.eq(user_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::UserNotFound(user_id.to_string()));
        }
        Ok(())
    }

    async fn create_ban(&self, ban: NewBan) -> AppResult<ban::Model> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let model = apply_ban(&txn, ban)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(model)
    }

    async fn create_warning(&self, warning: NewWarning) -> AppResult<warning::Model> {
        warning
            .into_active_model()
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_warning(&self, warning_id: &str) -> AppResult<Option<warning::Model>> {
        Warning::find_by_id(warning_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn acknowledge_warning(
        &self,
        warning_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<warning::Model> {
        let existing = self
            .find_warning(warning_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Warning {warning_id} not found")))?;

        if existing.acknowledged_at.is_some() {
            return Ok(existing);
        }

        let mut active: warning::ActiveModel = existing.into();
        active.acknowledged_at = Set(Some(at.into()));
        active
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn bans_for_user(&self, user_id: &str) -> AppResult<Vec<ban::Model>> {
        Ban::find()
            .filter(ban::Column::UserId.eq(user_id))
            .order_by_desc(ban::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn release_expired_suspensions(&self, now: DateTime<Utc>) -> AppResult<Vec<String>> {
        let suspended = User::find()
            .filter(user::Column::Status.eq(AccountStatus::Suspended))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut released = Vec::new();
        for user in suspended {
            let binding = Ban::find()
                .filter(ban::Column::UserId.eq(user.id.as_str()))
                .filter(
                    Condition::any()
                        .add(ban::Column::BanType.eq(BanType::Perm))
                        .add(
                            Condition::all()
                                .add(ban::Column::BanType.eq(BanType::Temp))
                                .add(ban::Column::ExpiresAt.gt(now)),
                        ),
                )
                .count(self.db.as_ref())
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

            if binding > 0 {
                continue;
            }

            let result = User::update_many()
                .col_expr(user::Column::Status, Expr::value(AccountStatus::Active))
                .col_expr(user::Column::UpdatedAt, Expr::value(now))
                .filter(user::Column::Id.eq(user.id.as_str()))
                .filter(user::Column::Status.eq(AccountStatus::Suspended))
                .exec(self.db.as_ref())
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

            if result.rows_affected > 0 {
                info!(user_id = %user.id, "Suspension expired, account reactivated");
                released.push(user.id);
            }
        }

        Ok(released)
    }
}
