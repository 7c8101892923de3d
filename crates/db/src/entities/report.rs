//! Report entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of content a report points at.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum TargetType {
    #[sea_orm(string_value = "Question")]
    Question,
    #[sea_orm(string_value = "Answer")]
    Answer,
    #[sea_orm(string_value = "Reply")]
    Reply,
}

impl TargetType {
    /// Wire name, as stored and as carried in job payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Question => "Question",
            Self::Answer => "Answer",
            Self::Reply => "Reply",
        }
    }

    /// Cache key holding the snapshot of a single item.
    #[must_use]
    pub fn cache_key(self, id: &str) -> String {
        match self {
            Self::Question => format!("question:{id}"),
            Self::Answer => format!("answer:{id}"),
            Self::Reply => format!("reply:{id}"),
        }
    }
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the reporter flagged the content.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportReason {
    #[sea_orm(string_value = "SPAM")]
    Spam,
    #[sea_orm(string_value = "HARASSMENT")]
    Harassment,
    #[sea_orm(string_value = "HATE_SPEECH")]
    HateSpeech,
    #[sea_orm(string_value = "INAPPROPRIATE_CONTENT")]
    InappropriateContent,
    #[sea_orm(string_value = "MISINFORMATION")]
    Misinformation,
    #[sea_orm(string_value = "OTHER")]
    Other,
}

/// Report lifecycle status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    #[sea_orm(string_value = "PENDING")]
    #[default]
    Pending,
    #[sea_orm(string_value = "REVIEWING")]
    Reviewing,
    #[sea_orm(string_value = "RESOLVED")]
    Resolved,
    #[sea_orm(string_value = "DISMISSED")]
    Dismissed,
}

impl ReportStatus {
    /// Resolved and dismissed reports never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Dismissed)
    }

    /// Whether `self -> next` is an allowed transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Reviewing | Self::Resolved | Self::Dismissed)
                | (Self::Reviewing, Self::Resolved | Self::Dismissed)
        )
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Reviewing => "REVIEWING",
            Self::Resolved => "RESOLVED",
            Self::Dismissed => "DISMISSED",
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier verdicts recorded on a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiDecision {
    BanUserPerm,
    BanUserTemp,
    RemoveContent,
    Ignore,
    Uncertain,
}

/// Actions actually applied when a report is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationAction {
    BanUserPerm,
    BanUserTemp,
    WarnUser,
    RemoveContent,
    NoAction,
}

impl ModerationAction {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BanUserPerm => "BAN_USER_PERM",
            Self::BanUserTemp => "BAN_USER_TEMP",
            Self::WarnUser => "WARN_USER",
            Self::RemoveContent => "REMOVE_CONTENT",
            Self::NoAction => "NO_ACTION",
        }
    }
}

/// Report model.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "report")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// The user who submitted the report.
    pub reported_by: String,
    /// Reported question, answer or reply.
    pub target_id: String,
    pub target_type: TargetType,
    /// Owner of the reported content at the time of reporting.
    pub target_user_id: String,
    pub report_reason: ReportReason,
    #[sea_orm(nullable)]
    pub report_comment: Option<String>,
    /// Severity score, 0 to 100.
    #[sea_orm(default_value = 0)]
    pub severity: i32,
    /// Set of [`AiDecision`].
    #[sea_orm(column_type = "JsonBinary")]
    pub ai_decisions: Json,
    pub ai_confidence: f64,
    /// Reasons given by the classifier.
    #[sea_orm(column_type = "JsonBinary")]
    pub ai_reasons: Json,
    pub status: ReportStatus,
    /// Set of [`ModerationAction`].
    #[sea_orm(column_type = "JsonBinary")]
    pub actions_taken: Json,
    /// Reasons supplied by a human moderator.
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub admin_reasons: Option<Json>,
    /// Moderator who settled the report by hand.
    #[sea_orm(nullable)]
    pub resolved_by: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Classifier decisions recorded on this report.
    #[must_use]
    pub fn decisions(&self) -> Vec<AiDecision> {
        serde_json::from_value(self.ai_decisions.clone()).unwrap_or_default()
    }

    /// Classifier reasons recorded on this report.
    #[must_use]
    pub fn reasons(&self) -> Vec<String> {
        serde_json::from_value(self.ai_reasons.clone()).unwrap_or_default()
    }

    /// Actions applied when the report was settled.
    #[must_use]
    pub fn actions(&self) -> Vec<ModerationAction> {
        serde_json::from_value(self.actions_taken.clone()).unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use ReportStatus::{Dismissed, Pending, Resolved, Reviewing};

        assert!(Pending.can_transition_to(Reviewing));
        assert!(Pending.can_transition_to(Resolved));
        assert!(Reviewing.can_transition_to(Dismissed));
        assert!(!Reviewing.can_transition_to(Pending));
        assert!(!Resolved.can_transition_to(Dismissed));
        assert!(!Dismissed.can_transition_to(Reviewing));
        assert!(Resolved.is_terminal());
        assert!(!Reviewing.is_terminal());
    }

    #[test]
    fn test_cache_keys() {
        assert_eq!(TargetType::Question.cache_key("q1"), "question:q1");
        assert_eq!(TargetType::Answer.cache_key("a1"), "answer:a1");
        assert_eq!(TargetType::Reply.cache_key("r1"), "reply:r1");
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_value(AiDecision::BanUserPerm).ok(),
            Some(serde_json::json!("BAN_USER_PERM"))
        );
        assert_eq!(
            serde_json::to_value(ReportReason::HateSpeech).ok(),
            Some(serde_json::json!("HATE_SPEECH"))
        );
        assert_eq!(
            serde_json::to_value(TargetType::Reply).ok(),
            Some(serde_json::json!("Reply"))
        );
    }
}
