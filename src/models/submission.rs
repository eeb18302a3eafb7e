use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A submission seen by the listener, waiting for its score and comments to settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedSubmission {
    pub permalink: String,
    pub created_at: DateTime<Utc>,
}

impl QueuedSubmission {
    pub fn new(permalink: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            permalink: permalink.into(),
            created_at,
        }
    }

    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds() as f64 / 3600.0
    }
}
