//! Core domain types for KeywordKit batches.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// BatchId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for batch identifiers (time-sortable).
///
/// Displays as 32 lowercase hex digits so it can double as a URL slug and
/// file name component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

impl BatchId {
    /// Generate a new time-sortable batch identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl std::str::FromStr for BatchId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Topic table
// ---------------------------------------------------------------------------

/// One topic label and the terms that select it.
///
/// `seeds` match anywhere in a keyword. `words` only match a whole
/// alphanumeric token, for short terms like `ai` that would otherwise hit
/// inside ordinary words ("email", "retail").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub label: String,
    pub seeds: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<String>,
}

impl Topic {
    pub fn new(label: impl Into<String>, seeds: &[&str]) -> Self {
        Self {
            label: label.into(),
            seeds: seeds.iter().map(|s| (*s).to_string()).collect(),
            words: Vec::new(),
        }
    }

    /// Add whole-word terms.
    pub fn with_words(mut self, words: &[&str]) -> Self {
        self.words.extend(words.iter().map(|w| (*w).to_string()));
        self
    }
}

/// Ordered topic vocabulary used by the classifier.
///
/// Declaration order is significant: when a keyword matches seeds of
/// several topics, the earliest declared topic wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicTable(pub Vec<Topic>);

impl TopicTable {
    pub fn new(topics: Vec<Topic>) -> Self {
        Self(topics)
    }

    pub fn topics(&self) -> &[Topic] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for TopicTable {
    fn default() -> Self {
        Self(vec![
            Topic::new(
                "ai",
                &["artificial intelligence", "machine learning", "llm", "gpt", "chatbot"],
            )
            .with_words(&["ai"]),
            Topic::new(
                "marketing",
                &["marketing", "seo", "advert", "campaign", "brand", "content", "social media"],
            ),
            Topic::new("sales", &["sales", "lead", "crm", "prospect", "funnel"]),
            Topic::new(
                "analytics",
                &["analytics", "metric", "dashboard", "kpi", "tracking"],
            ),
            Topic::new(
                "ecommerce",
                &["ecommerce", "e-commerce", "shop", "checkout", "product"],
            ),
        ])
    }
}

// ---------------------------------------------------------------------------
// Groups, outlines
// ---------------------------------------------------------------------------

/// A labeled cluster of keywords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Topic label, or a `misc-<char>` fallback label.
    pub label: String,
    /// Keywords in input order.
    pub items: Vec<String>,
}

/// One headed section of an outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub heading: String,
    pub bullets: Vec<String>,
}

/// Templated content skeleton for a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    pub title: String,
    pub sections: Vec<OutlineSection>,
}

// ---------------------------------------------------------------------------
// Batch record
// ---------------------------------------------------------------------------

/// Who asked for a batch and where replies should go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

/// Location and checksum of a rendered report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    pub batch_id: BatchId,
    pub path: PathBuf,
    pub page_count: usize,
    /// SHA-256 of the file contents, lowercase hex.
    pub sha256: String,
    pub size_bytes: usize,
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: BatchId,
    /// Normalized, deduplicated keywords in first-seen order.
    pub keywords: Vec<String>,
    /// Groups ordered by size (largest first).
    pub groups: Vec<Group>,
    /// Outline per group label.
    pub outlines: BTreeMap<String, Outline>,
    /// Post ideas per group label.
    pub post_ideas: BTreeMap<String, Vec<String>>,
    pub requester: Requester,
    pub artifact: ArtifactHandle,
    pub created_at: DateTime<Utc>,
}
