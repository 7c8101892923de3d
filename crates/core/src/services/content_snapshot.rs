//! Reads the text of reported content for classification.

use agora_common::{AppResult, CacheStore};
use agora_db::{ContentRef, ContentStore, entities::report::TargetType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Title and body of a content item as seen by the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub body: String,
}

impl ContentSnapshot {
    /// Text sent to the classifier.
    #[must_use]
    pub fn classification_text(&self, target_type: TargetType) -> String {
        match (target_type, &self.title) {
            (TargetType::Question, Some(title)) => {
                format!("Title: {title}\nBody: {}", self.body)
            }
            (TargetType::Question, None) => format!("Title: \nBody: {}", self.body),
            (TargetType::Answer | TargetType::Reply, _) => format!("Body: {}", self.body),
        }
    }
}

/// Cache-first reader over the content store.
#[derive(Clone)]
pub struct ContentSnapshotReader {
    cache: Arc<dyn CacheStore>,
    content: Arc<dyn ContentStore>,
}

impl ContentSnapshotReader {
    /// Create a new reader.
    #[must_use]
    pub fn new(cache: Arc<dyn CacheStore>, content: Arc<dyn ContentStore>) -> Self {
        Self { cache, content }
    }

    /// Load the reported content. Missing content yields empty strings; a failed
    /// store lookup is an error so the caller can retry.
    pub async fn read(&self, content: &ContentRef) -> AppResult<ContentSnapshot> {
        let key = content.cache_key();

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<ContentSnapshot>(&raw) {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => warn!(error = %e, key = %key, "Ignoring unreadable content cache entry"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, key = %key, "Content cache read failed"),
        }

        match self.content.find_content_meta(content).await {
            Ok(Some(meta)) => Ok(ContentSnapshot {
                title: meta.title,
                body: meta.body,
            }),
            Ok(None) => Ok(ContentSnapshot::default()),
            Err(e) => {
                warn!(error = %e, target_id = %content.target_id, "Content lookup failed");
                Err(e)
            }
        }
    }
}
