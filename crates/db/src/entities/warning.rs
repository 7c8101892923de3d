//! Warning entity.

use super::ban::{ModerationSource, SeverityTier};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Warning model. Rows are append-only apart from acknowledgement.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "warning")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    #[sea_orm(nullable)]
    pub report_id: Option<String>,
    pub title: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub reasons: Json,
    pub severity: SeverityTier,
    pub warned_by: ModerationSource,
    pub expires_at: DateTimeWithTimeZone,
    /// When the warned user confirmed they saw it.
    #[sea_orm(nullable)]
    pub acknowledged_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Reasons as plain strings.
    #[must_use]
    pub fn reason_list(&self) -> Vec<String> {
        serde_json::from_value(self.reasons.clone()).unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
