//! Report moderation job.

use agora_common::{AppError, AppResult};
use agora_db::entities::report::{self, ReportReason, TargetType};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Name of the apalis queue the worker consumes.
pub const REPORT_MODERATION_QUEUE: &str = "report-moderation";

/// Report fields carried by a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportJobPayload {
    pub report_id: String,
    pub reported_by: String,
    pub target_id: String,
    pub target_user_id: String,
    pub report_reason: ReportReason,
    #[serde(default)]
    pub report_comment: Option<String>,
    pub created_at: DateTime<FixedOffset>,
}

/// Job to classify and settle one report, tagged by the kind of content reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "targetType")]
pub enum ReportModerationJob {
    Question(ReportJobPayload),
    Answer(ReportJobPayload),
    Reply(ReportJobPayload),
}

impl ReportModerationJob {
    /// Build a job from a persisted report.
    #[must_use]
    pub fn from_report(report: &report::Model) -> Self {
        let payload = ReportJobPayload {
            report_id: report.id.clone(),
            reported_by: report.reported_by.clone(),
            target_id: report.target_id.clone(),
            target_user_id: report.target_user_id.clone(),
            report_reason: report.report_reason,
            report_comment: report.report_comment.clone(),
            created_at: report.created_at,
        };

        match report.target_type {
            TargetType::Question => Self::Question(payload),
            TargetType::Answer => Self::Answer(payload),
            TargetType::Reply => Self::Reply(payload),
        }
    }

    /// Kind of content reported.
    #[must_use]
    pub const fn target_type(&self) -> TargetType {
        match self {
            Self::Question(_) => TargetType::Question,
            Self::Answer(_) => TargetType::Answer,
            Self::Reply(_) => TargetType::Reply,
        }
    }

    /// The carried report fields.
    #[must_use]
    pub const fn payload(&self) -> &ReportJobPayload {
        match self {
            Self::Question(p) | Self::Answer(p) | Self::Reply(p) => p,
        }
    }

    /// Report id.
    #[must_use]
    pub fn report_id(&self) -> &str {
        &self.payload().report_id
    }

    /// Check the payload as it comes off the queue.
    pub fn validate(&self) -> AppResult<()> {
        let p = self.payload();
        for (field, value) in [
            ("reportId", &p.report_id),
            ("reportedBy", &p.reported_by),
            ("targetId", &p.target_id),
            ("targetUserId", &p.target_user_id),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{field} is empty")));
            }
        }
        if p.reported_by == p.target_user_id {
            return Err(AppError::Validation(
                "reporter and target user are the same".to_string(),
            ));
        }
        if let Some(ref comment) = p.report_comment {
            let len = comment.chars().count();
            if !(3..=150).contains(&len) {
                return Err(AppError::Validation(format!(
                    "reportComment length {len} outside 3..=150"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn job_json(target_type: &str) -> serde_json::Value {
        serde_json::json!({
            "targetType": target_type,
            "reportId": "r1",
            "reportedBy": "reporter",
            "targetId": "a1",
            "targetUserId": "author",
            "reportReason": "SPAM",
            "createdAt": "2025-01-01T00:00:00+00:00",
        })
    }

    #[test]
    fn test_tagged_by_target_type() {
        let job: ReportModerationJob = serde_json::from_value(job_json("Answer")).unwrap();
        assert_eq!(job.target_type(), TargetType::Answer);
        assert_eq!(job.report_id(), "r1");
        assert!(job.validate().is_ok());

        let back = serde_json::to_value(&job).unwrap();
        assert_eq!(back["targetType"], "Answer");
    }

    #[test]
    fn test_unknown_target_type_is_rejected() {
        assert!(serde_json::from_value::<ReportModerationJob>(job_json("Comment")).is_err());
    }

    #[test]
    fn test_validate_rejects_self_report() {
        let mut value = job_json("Question");
        value["reportedBy"] = "author".into();
        let job: ReportModerationJob = serde_json::from_value(value).unwrap();
        assert!(matches!(job.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_empty_ids() {
        let mut value = job_json("Reply");
        value["reportId"] = " ".into();
        let job: ReportModerationJob = serde_json::from_value(value).unwrap();
        assert!(job.validate().is_err());
    }
}
