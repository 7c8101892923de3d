//! Content repository for questions, answers and replies.

use std::sync::Arc;

use crate::entities::{Answer, Question, Reply, answer, question, reply, report::TargetType};
use crate::stores::{ContentMeta, ContentRef, ContentStore};
use agora_common::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    sea_query::Expr,
};

/// Content repository for database operations.
#[derive(Clone)]
pub struct ContentRepository {
    db: Arc<DatabaseConnection>,
}

impl ContentRepository {
    /// Create a new content repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

/// Flip the active flag of a content item on any connection or transaction.
pub(crate) async fn set_content_active<C: ConnectionTrait>(
    conn: &C,
    content: &ContentRef,
    active: bool,
) -> Result<bool, DbErr> {
    let now = Utc::now();
    let id = content.target_id.as_str();

    let result = match content.target_type {
        TargetType::Question => {
            Question::update_many()
                .col_expr(question::Column::IsActive, Expr::value(active))
                .col_expr(question::Column::UpdatedAt, Expr::value(now))
                .filter(question::Column::Id.eq(id))
                .exec(conn)
                .await?
        }
        TargetType::Answer => {
            Answer::update_many()
                .col_expr(answer::Column::IsActive, Expr::value(active))
                .col_expr(answer::Column::UpdatedAt, Expr::value(now))
                .filter(answer::Column::Id.eq(id))
                .exec(conn)
                .await?
        }
        TargetType::Reply => {
            Reply::update_many()
                .col_expr(reply::Column::IsActive, Expr::value(active))
                .col_expr(reply::Column::UpdatedAt, Expr::value(now))
                .filter(reply::Column::Id.eq(id))
                .exec(conn)
                .await?
        }
    };

    Ok(result.rows_affected > 0)
}

#[async_trait]
impl ContentStore for ContentRepository {
    async fn find_content_meta(&self, content: &ContentRef) -> AppResult<Option<ContentMeta>> {
        let id = content.target_id.as_str();

        let meta = match content.target_type {
            TargetType::Question => Question::find_by_id(id)
                .one(self.db.as_ref())
                .await
                .map_err(|e| AppError::Database(e.to_string()))?
                .map(|q| ContentMeta {
                    owner_id: q.user_id,
                    title: Some(q.title),
                    body: q.body,
                    is_active: q.is_active,
                    parent_id: None,
                }),
            TargetType::Answer => Answer::find_by_id(id)
                .one(self.db.as_ref())
                .await
                .map_err(|e| AppError::Database(e.to_string()))?
                .map(|a| ContentMeta {
                    owner_id: a.user_id,
                    title: None,
                    body: a.body,
                    is_active: a.is_active,
                    parent_id: Some(a.question_id),
                }),
            TargetType::Reply => Reply::find_by_id(id)
                .one(self.db.as_ref())
                .await
                .map_err(|e| AppError::Database(e.to_string()))?
                .map(|r| ContentMeta {
                    owner_id: r.user_id,
                    title: None,
                    body: r.body,
                    is_active: r.is_active,
                    parent_id: Some(r.answer_id),
                }),
        };

        Ok(meta)
    }

    async fn set_active(&self, content: &ContentRef, active: bool) -> AppResult<bool> {
        set_content_active(self.db.as_ref(), content, active)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_answer(id: &str, question_id: &str, user_id: &str) -> answer::Model {
        answer::Model {
            id: id.to_string(),
            question_id: question_id.to_string(),
            user_id: user_id.to_string(),
            body: "Have you tried turning it off and on again?".to_string(),
            is_active: true,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_find_answer_meta_carries_question_as_parent() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_answer("a1", "q1", "u1")]])
                .into_connection(),
        );

        let repo = ContentRepository::new(db);
        let meta = repo
            .find_content_meta(&ContentRef::new(TargetType::Answer, "a1"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(meta.owner_id, "u1");
        assert_eq!(meta.parent_id.as_deref(), Some("q1"));
        assert!(meta.title.is_none());
        assert!(meta.is_active);
    }

    #[tokio::test]
    async fn test_find_missing_question_returns_none() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<question::Model>::new()])
                .into_connection(),
        );

        let repo = ContentRepository::new(db);
        let meta = repo
            .find_content_meta(&ContentRef::new(TargetType::Question, "missing"))
            .await
            .unwrap();

        assert!(meta.is_none());
    }

    #[tokio::test]
    async fn test_set_active_reports_touched_rows() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 1,
                    },
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 0,
                    },
                ])
                .into_connection(),
        );

        let repo = ContentRepository::new(db);
        let reply = ContentRef::new(TargetType::Reply, "r1");

        assert!(repo.set_active(&reply, false).await.unwrap());
        assert!(!repo.set_active(&reply, false).await.unwrap());
    }
}
