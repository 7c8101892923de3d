//! Windowed point budgets for moderators and reporters.
//!
//! Both limiters sit on [`CacheStore::incr_with_expiry`], a single atomic
//! increment that only sets the window expiry when the key has none. Points
//! are charged before the limit is checked, so a rejected action still counts.

use crate::services::scoring::ModerationDecision;
use agora_common::{AppError, AppResult, CacheStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Budget configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointBudget {
    /// Highest total allowed inside one window.
    pub limit: i64,
    /// Window length, started by the first charge.
    pub window: Duration,
}

impl PointBudget {
    /// Moderator budget: 20 points per 120 seconds.
    pub const ADMIN: Self = Self {
        limit: 20,
        window: Duration::from_secs(120),
    };

    /// Reporter budget: 5 reports per 10 minutes.
    pub const REPORTER: Self = Self {
        limit: 5,
        window: Duration::from_secs(600),
    };
}

/// Points a manual moderation action costs.
#[must_use]
pub const fn action_cost(decision: ModerationDecision) -> i64 {
    match decision {
        ModerationDecision::BanUserPerm => 10,
        ModerationDecision::BanUserTemp => 5,
        ModerationDecision::WarnUser => 2,
        ModerationDecision::Ignore | ModerationDecision::Uncertain => 1,
    }
}

/// Caps how fast a single moderator can act.
#[derive(Clone)]
pub struct AdminPointLimiter {
    cache: Arc<dyn CacheStore>,
    budget: PointBudget,
}

impl AdminPointLimiter {
    /// Create a limiter with the default moderator budget.
    #[must_use]
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self::with_budget(cache, PointBudget::ADMIN)
    }

    /// Create a limiter with a custom budget.
    #[must_use]
    pub fn with_budget(cache: Arc<dyn CacheStore>, budget: PointBudget) -> Self {
        Self { cache, budget }
    }

    fn key(admin_id: &str) -> String {
        format!("admin:{admin_id}:mod_points")
    }

    /// Charge an action. Returns the new window total.
    ///
    /// Fails with `RateLimited` when the total passes the limit; the points stay charged.
    pub async fn add_points(&self, admin_id: &str, decision: ModerationDecision) -> AppResult<i64> {
        let total = self
            .cache
            .incr_with_expiry(&Self::key(admin_id), action_cost(decision), self.budget.window)
            .await?;

        if total > self.budget.limit {
            warn!(admin_id = %admin_id, total, "Moderator point budget exceeded");
            return Err(AppError::RateLimited(format!(
                "Moderation point limit reached ({total}/{})",
                self.budget.limit
            )));
        }

        Ok(total)
    }
}

/// Caps how many reports one user can file.
#[derive(Clone)]
pub struct ReportRateLimiter {
    cache: Arc<dyn CacheStore>,
    budget: PointBudget,
}

impl ReportRateLimiter {
    /// Create a limiter with the default reporter budget.
    #[must_use]
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self {
            cache,
            budget: PointBudget::REPORTER,
        }
    }

    fn key(reporter_id: &str) -> String {
        format!("reporter:{reporter_id}:reports")
    }

    /// Count one report against the reporter's budget.
    pub async fn check(&self, reporter_id: &str) -> AppResult<()> {
        let total = self
            .cache
            .incr_with_expiry(&Self::key(reporter_id), 1, self.budget.window)
            .await?;

        if total > self.budget.limit {
            return Err(AppError::RateLimited(
                "Too many reports, try again later".to_string(),
            ));
        }
        Ok(())
    }
}
