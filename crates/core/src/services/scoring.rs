//! Severity scoring and decision mapping.
//!
//! Every moderation threshold lives in [`ScoringPolicy`]. The classifier
//! output becomes a single 0-100 severity, the severity becomes exactly one
//! [`ModerationDecision`], and content removal is gated on severity alone.

use agora_db::entities::{
    ban::SeverityTier,
    report::{AiDecision, ModerationAction},
};
use serde::{Deserialize, Serialize};

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Severity at which a temporary ban would last zero hours.
const TEMP_BAN_BASE: i32 = 60;

/// Outcome category for a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationDecision {
    BanUserPerm,
    BanUserTemp,
    WarnUser,
    Uncertain,
    Ignore,
}

impl ModerationDecision {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BanUserPerm => "BAN_USER_PERM",
            Self::BanUserTemp => "BAN_USER_TEMP",
            Self::WarnUser => "WARN_USER",
            Self::Uncertain => "UNCERTAIN",
            Self::Ignore => "IGNORE",
        }
    }

    /// Whether the decision sanctions the content owner.
    #[must_use]
    pub const fn is_punitive(self) -> bool {
        matches!(self, Self::BanUserPerm | Self::BanUserTemp | Self::WarnUser)
    }

    /// Action recorded on the report for this decision, if any.
    #[must_use]
    pub const fn action(self) -> Option<ModerationAction> {
        match self {
            Self::BanUserPerm => Some(ModerationAction::BanUserPerm),
            Self::BanUserTemp => Some(ModerationAction::BanUserTemp),
            Self::WarnUser => Some(ModerationAction::WarnUser),
            Self::Ignore => Some(ModerationAction::NoAction),
            Self::Uncertain => None,
        }
    }
}

impl std::fmt::Display for ModerationDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds shared by the automatic and manual moderation paths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    /// Minimum severity for a permanent ban.
    pub perm_ban: i32,
    /// Minimum severity for a temporary ban.
    pub temp_ban: i32,
    /// Minimum severity for a warning.
    pub warn: i32,
    /// Minimum severity at which content is deactivated.
    pub remove_content: i32,
    /// Family confidence at which the classifier escalates to a permanent ban.
    pub escalation_confidence: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            perm_ban: 90,
            temp_ban: 70,
            warn: 50,
            remove_content: 60,
            escalation_confidence: 0.8,
        }
    }
}

impl ScoringPolicy {
    /// Derive a 0-100 severity from classifier decisions and confidence.
    #[must_use]
    pub fn severity(&self, decisions: &[AiDecision], confidence: f64) -> i32 {
        let c = confidence.clamp(0.0, 1.0);
        let escalation = self.escalation_confidence;

        if decisions.contains(&AiDecision::BanUserPerm) {
            let above = (c - escalation).max(0.0) / (1.0 - escalation);
            let score = f64::from(self.perm_ban) + (above * 10.0).round();
            (score as i32).clamp(self.perm_ban, 100)
        } else if decisions.contains(&AiDecision::BanUserTemp) {
            let span = f64::from(self.perm_ban - self.warn);
            let score = f64::from(self.warn) + (c / escalation * span).round();
            (score as i32).clamp(self.warn, self.perm_ban - 1)
        } else if decisions.contains(&AiDecision::Uncertain) {
            let span = f64::from(self.warn - 2);
            let score = 1.0 + (c * span).round();
            (score as i32).clamp(1, self.warn - 1)
        } else {
            0
        }
    }

    /// Map a severity to exactly one decision. Monotonic in severity.
    #[must_use]
    pub const fn decision(&self, severity: i32) -> ModerationDecision {
        if severity >= self.perm_ban {
            ModerationDecision::BanUserPerm
        } else if severity >= self.temp_ban {
            ModerationDecision::BanUserTemp
        } else if severity >= self.warn {
            ModerationDecision::WarnUser
        } else if severity > 0 {
            ModerationDecision::Uncertain
        } else {
            ModerationDecision::Ignore
        }
    }

    /// Whether content at this severity is deactivated, independent of the decision.
    #[must_use]
    pub const fn removes_content(&self, severity: i32) -> bool {
        severity >= self.remove_content
    }

    /// Temporary ban length in milliseconds: `(s - 60) * (1 + c)` hours, 0 below the temp threshold.
    #[must_use]
    pub fn temp_ban_ms(&self, severity: i32, confidence: f64) -> i64 {
        if severity < self.temp_ban {
            return 0;
        }
        let hours = f64::from(severity - TEMP_BAN_BASE) * (1.0 + confidence.clamp(0.0, 1.0));
        (hours * MS_PER_HOUR).round() as i64
    }

    /// Coarse tier recorded on bans and warnings.
    #[must_use]
    pub const fn tier_for(&self, severity: i32) -> SeverityTier {
        if severity >= self.perm_ban {
            SeverityTier::Five
        } else if severity >= self.temp_ban {
            SeverityTier::Four
        } else if severity >= self.warn {
            SeverityTier::Three
        } else if severity >= 25 {
            SeverityTier::Two
        } else {
            SeverityTier::One
        }
    }

    /// Lowest severity belonging to a tier. Used when a moderator picks a tier by hand.
    #[must_use]
    pub const fn floor_score(&self, tier: SeverityTier) -> i32 {
        match tier {
            SeverityTier::Five => self.perm_ban,
            SeverityTier::Four => self.temp_ban,
            SeverityTier::Three => self.warn,
            SeverityTier::Two => 25,
            SeverityTier::One => 1,
        }
    }

    /// Whether a family confidence is high enough for a permanent ban.
    #[must_use]
    pub fn escalates(&self, confidence: f64) -> bool {
        confidence >= self.escalation_confidence
    }
}
