use std::time::Duration;

use feed_rs::parser;
use futures::stream::{self, StreamExt};
use reqwest::Client;

use crate::config::FeedSource;
use crate::error::Result;
use crate::models::{Origin, Reference};

const FEED_TIMEOUT: Duration = Duration::from_secs(10);
const CONCURRENT_FETCHES: usize = 5;

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(FEED_TIMEOUT)
            .connect_timeout(FEED_TIMEOUT)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client })
    }

    pub async fn fetch_feed(&self, source: &FeedSource) -> Result<Vec<Reference>> {
        let response = self.client.get(&source.url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        parse_feed(&bytes)
    }

    /// Fetches every feed, a few at a time, keeping the configured order.
    /// Feeds that fail to download or parse are logged and skipped.
    pub async fn fetch_all(&self, feeds: &[FeedSource]) -> Vec<Reference> {
        let results: Vec<Vec<Reference>> = stream::iter(feeds)
            .map(|feed| async move {
                match self.fetch_feed(feed).await {
                    Ok(references) => {
                        tracing::debug!(feed = %feed.name, items = references.len(), "Fetched feed");
                        references
                    }
                    Err(e) => {
                        tracing::error!(feed = %feed.name, url = %feed.url, error = %e, "Skipping feed");
                        Vec::new()
                    }
                }
            })
            .buffered(CONCURRENT_FETCHES)
            .collect()
            .await;

        results.into_iter().flatten().collect()
    }
}

/// Maps the entries of an RSS or Atom document to references. A document
/// without a title or without any entries is not treated as a feed.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<Reference>> {
    let feed = parser::parse(bytes)?;

    if feed.title.is_none() {
        return Err(anyhow::anyhow!("feed has no title").into());
    }
    if feed.entries.is_empty() {
        return Err(anyhow::anyhow!("feed has no items").into());
    }

    let references = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry.links.first().map(|l| l.href.trim().to_string())?;
            if link.len() <= 1 {
                return None;
            }
            let title = entry.title.map(|t| t.content).unwrap_or_default();
            Some(Reference::new(
                title,
                link,
                Origin::RssFeed,
                entry.published.or(entry.updated),
            ))
        })
        .collect();

    Ok(references)
}
