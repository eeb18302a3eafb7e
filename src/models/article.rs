use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the extraction service returned for a single link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub title: String,
    pub text: String,
    pub authors: Vec<String>,
    /// Authoritative URL for the document, possibly on another host.
    pub canonical: Option<String>,
    /// Publish date as reported by the service; often missing or malformed.
    pub published: Option<String>,
}

/// A stored article: the reference merged with its extracted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub source: String,
    pub host: String,
    pub link: String,
    pub source_published_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub source_title: Option<String>,
    pub title: Option<String>,
    pub canonical_link: Option<String>,
    pub body: String,
    pub authors: Vec<String>,
}

impl Article {
    /// Keys this article occupies in the dedup cache.
    pub fn dedup_keys(&self) -> Vec<String> {
        let mut keys = vec![self.link.clone()];
        if let Some(canonical) = &self.canonical_link {
            if canonical != &self.link {
                keys.push(canonical.clone());
            }
        }
        keys
    }
}
