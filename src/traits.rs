// Seams between the drivers and their collaborators.
//
// DedupCache   set of links already ingested (SQLite table in production)
// ArticleStore article rows plus the submission -> article link table
// ThreadStore  reddit submissions and their comments
// Extractor    remote article extraction service
// Platform     social platform API (threads, stub expansion, new posts)
//
// Drivers hold these as Arc<dyn Trait> so tests can swap in the mocks
// from `testing.rs`.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Article, Comment, DiscussionThread, ExtractedDocument, MoreStub, RootPost};
use crate::reddit::{NewPost, PlatformError};

#[async_trait]
pub trait DedupCache: Send + Sync {
    async fn is_member(&self, key: &str) -> Result<bool>;

    /// Marks a single key as seen. Ingestion goes through `claim` instead.
    #[allow(dead_code)]
    async fn add(&self, key: &str) -> Result<()>;

    /// Inserts every key if none of them is present yet, atomically.
    /// Returns `false` (and inserts nothing) when any key was already taken.
    async fn claim(&self, keys: &[String]) -> Result<bool>;

    /// Undoes a successful `claim` whose follow-up write failed.
    async fn release(&self, keys: &[String]) -> Result<()>;
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn insert_article(&self, article: &Article) -> Result<i64>;

    /// Article stored under `url` as either its link or its canonical link.
    async fn find_article_id(&self, url: &str) -> Result<Option<i64>>;

    async fn link_submission(&self, submission_id: i64, article_id: i64) -> Result<()>;
}

#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn insert_post(&self, post: &RootPost) -> Result<i64>;

    /// Stores all comments of one submission in a single transaction.
    async fn insert_comments(&self, comments: &[Comment], submission_id: i64) -> Result<()>;
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Never fails: an unreachable or empty-handed service yields `None`.
    async fn extract(&self, link: &str) -> Option<ExtractedDocument>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub limit: u32,
    pub depth: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            limit: 1_000,
            depth: 1_000,
        }
    }
}

#[async_trait]
pub trait Platform: Send + Sync {
    async fn fetch_thread(
        &self,
        permalink: &str,
        opts: FetchOptions,
    ) -> std::result::Result<DiscussionThread, PlatformError>;

    /// Resolves up to 100 truncated child ids of `link_id` (a `t3_` fullname).
    async fn expand_more(
        &self,
        link_id: &str,
        children: &[String],
    ) -> std::result::Result<(Vec<Comment>, Vec<MoreStub>), PlatformError>;

    /// Newest submissions of a subreddit, newest first.
    async fn new_posts(&self, subreddit: &str) -> std::result::Result<Vec<NewPost>, PlatformError>;
}
