//! AI classifier adapter.
//!
//! [`ContentClassifier`] is the raw external capability (an `OpenAI`-style
//! moderation endpoint in production). [`AiModerator`] wraps it, bounds it
//! with a timeout and turns its category flags into a [`ClassifierVerdict`].
//! The adapter never fails: any error becomes an `UNCERTAIN` verdict so the
//! report lands in human review.

use crate::services::scoring::ScoringPolicy;
use agora_common::{AppError, AppResult};
use agora_db::entities::report::AiDecision;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const HATE_HARASSMENT: &[&str] = &[
    "hate",
    "hate/threatening",
    "harassment",
    "harassment/threatening",
];

const SEXUAL_VIOLENCE: &[&str] = &["sexual", "sexual/minors", "violence", "violence/graphic"];

const HATE_REASON: &str = "Hate/harassment detected";
const INAPPROPRIATE_REASON: &str = "Inappropriate content detected";
const UNCLEAR_REASON: &str = "Flagged but unclear";

/// Raw per-category output of a moderation model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModerationScores {
    /// Whether the model flagged the input at all.
    pub flagged: bool,
    /// Category name to flagged.
    #[serde(default)]
    pub categories: HashMap<String, bool>,
    /// Category name to score in `0.0..=1.0`.
    #[serde(default)]
    pub category_scores: HashMap<String, f64>,
}

impl ModerationScores {
    /// Family confidence if any category of the family is flagged.
    fn family_confidence(&self, family: &[&str]) -> Option<f64> {
        let fired = family
            .iter()
            .any(|c| self.categories.get(*c).copied().unwrap_or(false));
        if !fired {
            return None;
        }
        Some(
            family
                .iter()
                .filter_map(|c| self.category_scores.get(*c).copied())
                .fold(0.0, f64::max),
        )
    }
}

/// Normalized classifier output stored on the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    /// Deduplicated decisions.
    pub decisions: Vec<AiDecision>,
    /// Highest confidence over the families that fired.
    pub confidence: f64,
    /// Deduplicated human-readable reasons.
    pub reasons: Vec<String>,
}

impl ClassifierVerdict {
    /// Verdict used whenever classification fails.
    #[must_use]
    pub fn fail_open() -> Self {
        Self {
            decisions: vec![AiDecision::Uncertain],
            confidence: 0.0,
            reasons: Vec::new(),
        }
    }
}

/// External moderation model.
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    /// Score a piece of text.
    async fn moderate(&self, text: &str) -> AppResult<ModerationScores>;
}

/// Classifier used when no moderation endpoint is configured.
///
/// Every call fails, so every report goes to human review.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredClassifier;

#[async_trait]
impl ContentClassifier for UnconfiguredClassifier {
    async fn moderate(&self, _text: &str) -> AppResult<ModerationScores> {
        Err(AppError::ExternalService(
            "moderation endpoint not configured".to_string(),
        ))
    }
}

/// Classifier returning a preset result, optionally after a delay.
#[derive(Debug, Clone)]
pub struct FixedClassifier {
    result: Result<ModerationScores, String>,
    delay: Option<Duration>,
}

impl FixedClassifier {
    /// Always return these scores.
    #[must_use]
    pub const fn scores(scores: ModerationScores) -> Self {
        Self {
            result: Ok(scores),
            delay: None,
        }
    }

    /// Always fail with this message.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            delay: None,
        }
    }

    /// Wait before answering.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Scores with a single flagged category.
    #[must_use]
    pub fn flagged(category: &str, score: f64) -> Self {
        Self::scores(ModerationScores {
            flagged: true,
            categories: HashMap::from([(category.to_string(), true)]),
            category_scores: HashMap::from([(category.to_string(), score)]),
        })
    }
}

#[async_trait]
impl ContentClassifier for FixedClassifier {
    async fn moderate(&self, _text: &str) -> AppResult<ModerationScores> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone().map_err(AppError::ExternalService)
    }
}

/// `OpenAI` moderation endpoint client.
#[derive(Clone)]
pub struct OpenAiModerationClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiModerationClient {
    /// Create a new client.
    #[must_use]
    pub fn new(api_key: String, model: String, endpoint: String) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_key,
            model,
            endpoint,
        }
    }
}

#[async_trait]
impl ContentClassifier for OpenAiModerationClient {
    async fn moderate(&self, text: &str) -> AppResult<ModerationScores> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Moderation request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Moderation API error: {status} - {body}"
            )));
        }

        #[derive(Deserialize)]
        struct ModerationResponse {
            results: Vec<ModerationResult>,
        }

        #[derive(Deserialize)]
        struct ModerationResult {
            flagged: bool,
            #[serde(default)]
            categories: HashMap<String, Option<bool>>,
            #[serde(default)]
            category_scores: HashMap<String, Option<f64>>,
        }

        let parsed: ModerationResponse = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse moderation response: {e}"))
        })?;

        let result = parsed.results.into_iter().next().ok_or_else(|| {
            AppError::ExternalService("Moderation response had no results".to_string())
        })?;

        Ok(ModerationScores {
            flagged: result.flagged,
            categories: result
                .categories
                .into_iter()
                .filter_map(|(k, v)| v.map(|v| (k, v)))
                .collect(),
            category_scores: result
                .category_scores
                .into_iter()
                .filter_map(|(k, v)| v.map(|v| (k, v)))
                .collect(),
        })
    }
}

/// Timeout-bounded, fail-open classification.
#[derive(Clone)]
pub struct AiModerator {
    classifier: Arc<dyn ContentClassifier>,
    policy: ScoringPolicy,
    timeout: Duration,
}

impl AiModerator {
    /// Wrap a classifier.
    #[must_use]
    pub fn new(
        classifier: Arc<dyn ContentClassifier>,
        policy: ScoringPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            policy,
            timeout,
        }
    }

    /// Classify text. Never fails.
    pub async fn classify(&self, text: &str) -> ClassifierVerdict {
        match tokio::time::timeout(self.timeout, self.classifier.moderate(text)).await {
            Ok(Ok(scores)) => self.interpret(&scores),
            Ok(Err(e)) => {
                warn!(error = %e, "Classifier failed, routing to human review");
                ClassifierVerdict::fail_open()
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "Classifier timed out, routing to human review");
                ClassifierVerdict::fail_open()
            }
        }
    }

    /// Turn raw category flags into decisions, confidence and reasons.
    #[must_use]
    pub fn interpret(&self, scores: &ModerationScores) -> ClassifierVerdict {
        if !scores.flagged {
            return ClassifierVerdict {
                decisions: vec![AiDecision::Ignore],
                confidence: 0.0,
                reasons: Vec::new(),
            };
        }

        let mut decisions = BTreeSet::new();
        let mut reasons = Vec::new();
        let mut confidence: f64 = 0.0;

        for (family, reason) in [
            (HATE_HARASSMENT, HATE_REASON),
            (SEXUAL_VIOLENCE, INAPPROPRIATE_REASON),
        ] {
            let Some(c) = scores.family_confidence(family) else {
                continue;
            };
            confidence = confidence.max(c);
            decisions.insert(if self.policy.escalates(c) {
                AiDecision::BanUserPerm
            } else {
                AiDecision::BanUserTemp
            });
            decisions.insert(AiDecision::RemoveContent);
            if !reasons.iter().any(|r| r == reason) {
                reasons.push(reason.to_string());
            }
        }

        if decisions.is_empty() {
            decisions.insert(AiDecision::Uncertain);
            reasons.push(UNCLEAR_REASON.to_string());
        }

        debug!(?decisions, confidence, "Classifier verdict");

        ClassifierVerdict {
            decisions: decisions.into_iter().collect(),
            confidence,
            reasons,
        }
    }
}
