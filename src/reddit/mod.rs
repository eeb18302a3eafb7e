mod client;
mod driver;
mod harvester;
mod listener;
mod parse;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use client::{permalink_path, RedditClient};
pub use driver::{DiscussionDriver, DiscussionSettings};
pub use harvester::MORE_CHILDREN_LIMIT;
pub use listener::SubmissionListener;

/// Failure classes of the social platform API.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    #[error("rate limited by reddit")]
    RateLimited,

    #[error("reddit is busy (HTTP {0})")]
    Busy(u16),

    #[error("thread does not exist")]
    NotFound,

    #[error("{0}")]
    Other(String),
}

impl PlatformError {
    /// Worth retrying the same call after a pause.
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::RateLimited | PlatformError::Busy(_))
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        PlatformError::Other(e.to_string())
    }
}

impl From<serde_json::Error> for PlatformError {
    fn from(e: serde_json::Error) -> Self {
        PlatformError::Other(format!("malformed response: {e}"))
    }
}

/// A freshly posted submission as seen in a subreddit's "new" listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub fullname: String,
    pub permalink: String,
    pub created_at: DateTime<Utc>,
}
