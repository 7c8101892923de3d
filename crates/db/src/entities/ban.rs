//! Ban entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Temporary or permanent ban.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BanType {
    #[sea_orm(string_value = "TEMP")]
    Temp,
    #[sea_orm(string_value = "PERM")]
    Perm,
}

/// Coarse severity attached to bans and warnings.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeverityTier {
    #[sea_orm(string_value = "ONE")]
    One,
    #[sea_orm(string_value = "TWO")]
    Two,
    #[sea_orm(string_value = "THREE")]
    Three,
    #[sea_orm(string_value = "FOUR")]
    Four,
    #[sea_orm(string_value = "FIVE")]
    Five,
}

/// Who issued a ban or warning.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationSource {
    #[sea_orm(string_value = "AI_MODERATION")]
    AiModeration,
    #[sea_orm(string_value = "ADMIN_MODERATION")]
    AdminModeration,
}

/// Ban model. Rows are append-only.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ban")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    /// Report that led to the ban, if any.
    #[sea_orm(nullable)]
    pub report_id: Option<String>,
    pub title: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub reasons: Json,
    pub ban_type: BanType,
    pub severity: SeverityTier,
    pub banned_by: ModerationSource,
    /// Only set for temporary bans.
    #[sea_orm(nullable)]
    pub expires_at: Option<DateTimeWithTimeZone>,
    /// Only set for temporary bans.
    #[sea_orm(nullable)]
    pub duration_ms: Option<i64>,
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
