use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Where a reference was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    RssFeed,
    RedditSubmission,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::RssFeed => "RSS Feed",
            Origin::RedditSubmission => "Reddit Submission",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A link to something worth enriching, before the extraction service has seen it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub title: String,
    pub link: String,
    pub origin: Origin,
    pub host: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl Reference {
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        origin: Origin,
        published_at: Option<DateTime<Utc>>,
    ) -> Self {
        let link = link.into().trim().to_string();
        let host = host_of(&link).unwrap_or_else(|| {
            tracing::warn!(link = %link, "Could not parse host from link");
            String::new()
        });

        Self {
            title: title.into(),
            link,
            origin,
            host,
            published_at,
        }
    }
}

/// Hostname of `link`, if it parses as an absolute URL with a host.
pub fn host_of(link: &str) -> Option<String> {
    Url::parse(link.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_parsed_from_link() {
        let r = Reference::new("T", " https://www.example.com/a/b?c=d ", Origin::RssFeed, None);
        assert_eq!(r.link, "https://www.example.com/a/b?c=d");
        assert_eq!(r.host, "www.example.com");
    }

    #[test]
    fn unparseable_link_leaves_host_empty() {
        let r = Reference::new("T", "not a url", Origin::RedditSubmission, None);
        assert_eq!(r.host, "");
        assert_eq!(r.origin.to_string(), "Reddit Submission");
    }
}
