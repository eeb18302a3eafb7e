// In-memory stand-ins for the trait seams, shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{Article, Comment, DiscussionThread, ExtractedDocument, MoreStub, RootPost};
use crate::reddit::{NewPost, PlatformError};
use crate::traits::{ArticleStore, DedupCache, Extractor, FetchOptions, Platform, ThreadStore};

type Expander = dyn Fn(&[String]) -> (Vec<Comment>, Vec<MoreStub>) + Send + Sync;
type FetchResult = std::result::Result<DiscussionThread, PlatformError>;

/// Scripted platform. Thread fetches replay a per-permalink script and keep
/// repeating its last entry; expansions echo one comment per requested id
/// unless an expander is installed.
pub struct MockPlatform {
    threads: Mutex<HashMap<String, VecDeque<FetchResult>>>,
    new_posts: Mutex<HashMap<String, Vec<NewPost>>>,
    expander: Option<Arc<Expander>>,
    fail_expansions: bool,
    expand_calls: Mutex<Vec<Vec<String>>>,
    fetch_calls: AtomicUsize,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            threads: Mutex::new(HashMap::new()),
            new_posts: Mutex::new(HashMap::new()),
            expander: None,
            fail_expansions: false,
            expand_calls: Mutex::new(Vec::new()),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_expander<F>(mut self, expander: F) -> Self
    where
        F: Fn(&[String]) -> (Vec<Comment>, Vec<MoreStub>) + Send + Sync + 'static,
    {
        self.expander = Some(Arc::new(expander));
        self
    }

    pub fn failing_expansions(mut self) -> Self {
        self.fail_expansions = true;
        self
    }

    pub fn with_thread(self, permalink: &str, script: Vec<FetchResult>) -> Self {
        self.threads
            .lock()
            .unwrap()
            .insert(permalink.to_string(), script.into());
        self
    }

    pub fn set_new_posts(&self, subreddit: &str, posts: Vec<NewPost>) {
        self.new_posts
            .lock()
            .unwrap()
            .insert(subreddit.to_string(), posts);
    }

    pub fn expand_calls(&self) -> Vec<Vec<String>> {
        self.expand_calls.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn fetch_thread(&self, permalink: &str, _opts: FetchOptions) -> FetchResult {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let mut threads = self.threads.lock().unwrap();
        let Some(script) = threads.get_mut(permalink) else {
            return Err(PlatformError::NotFound);
        };
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap_or(Err(PlatformError::NotFound))
        }
    }

    async fn expand_more(
        &self,
        _link_id: &str,
        children: &[String],
    ) -> std::result::Result<(Vec<Comment>, Vec<MoreStub>), PlatformError> {
        self.expand_calls.lock().unwrap().push(children.to_vec());
        if self.fail_expansions {
            return Err(PlatformError::Busy(503));
        }
        if let Some(expander) = &self.expander {
            return Ok(expander(children));
        }
        let comments = children
            .iter()
            .map(|id| Comment {
                id: id.clone(),
                ..Default::default()
            })
            .collect();
        Ok((comments, Vec::new()))
    }

    async fn new_posts(&self, subreddit: &str) -> std::result::Result<Vec<NewPost>, PlatformError> {
        Ok(self
            .new_posts
            .lock()
            .unwrap()
            .get(subreddit)
            .cloned()
            .unwrap_or_default())
    }
}

/// Extraction service answering from a fixed table of links.
pub struct MockExtractor {
    documents: HashMap<String, ExtractedDocument>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            documents: HashMap::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn on(mut self, link: &str, document: ExtractedDocument) -> Self {
        self.documents.insert(link.to_string(), document);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn extract(&self, link: &str) -> Option<ExtractedDocument> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.documents.get(link).cloned()
    }
}

#[derive(Default)]
pub struct MemoryDedupCache {
    keys: Mutex<HashSet<String>>,
}

impl MemoryDedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.lock().unwrap().contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl DedupCache for MemoryDedupCache {
    async fn is_member(&self, key: &str) -> Result<bool> {
        Ok(self.contains(key))
    }

    async fn add(&self, key: &str) -> Result<()> {
        self.keys.lock().unwrap().insert(key.to_string());
        Ok(())
    }

    async fn claim(&self, keys: &[String]) -> Result<bool> {
        let mut set = self.keys.lock().unwrap();
        if keys.iter().any(|k| set.contains(k)) {
            return Ok(false);
        }
        set.extend(keys.iter().cloned());
        Ok(true)
    }

    async fn release(&self, keys: &[String]) -> Result<()> {
        let mut set = self.keys.lock().unwrap();
        for key in keys {
            set.remove(key);
        }
        Ok(())
    }
}

/// Article and thread store kept in vectors; row ids are 1-based positions.
#[derive(Default)]
pub struct MemoryStore {
    articles: Mutex<Vec<Article>>,
    posts: Mutex<Vec<RootPost>>,
    comments: Mutex<Vec<(i64, Comment)>>,
    links: Mutex<Vec<(i64, i64)>>,
    failing_links: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_inserts_for(&self, link: &str) {
        self.failing_links.lock().unwrap().insert(link.to_string());
    }

    pub fn articles(&self) -> Vec<Article> {
        self.articles.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<RootPost> {
        self.posts.lock().unwrap().clone()
    }

    pub fn comments_of(&self, submission_id: i64) -> Vec<Comment> {
        self.comments
            .lock()
            .unwrap()
            .iter()
            .filter(|(sid, _)| *sid == submission_id)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn links(&self) -> Vec<(i64, i64)> {
        self.links.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn insert_article(&self, article: &Article) -> Result<i64> {
        if self.failing_links.lock().unwrap().contains(&article.link) {
            return Err(AppError::Other(anyhow::anyhow!("insert refused for {}", article.link)));
        }
        let mut articles = self.articles.lock().unwrap();
        articles.push(article.clone());
        Ok(articles.len() as i64)
    }

    async fn find_article_id(&self, url: &str) -> Result<Option<i64>> {
        let articles = self.articles.lock().unwrap();
        Ok(articles
            .iter()
            .position(|a| a.link == url || a.canonical_link.as_deref() == Some(url))
            .map(|i| i as i64 + 1))
    }

    async fn link_submission(&self, submission_id: i64, article_id: i64) -> Result<()> {
        let mut links = self.links.lock().unwrap();
        if !links.contains(&(submission_id, article_id)) {
            links.push((submission_id, article_id));
        }
        Ok(())
    }
}

#[async_trait]
impl ThreadStore for MemoryStore {
    async fn insert_post(&self, post: &RootPost) -> Result<i64> {
        let mut posts = self.posts.lock().unwrap();
        posts.push(post.clone());
        Ok(posts.len() as i64)
    }

    async fn insert_comments(&self, comments: &[Comment], submission_id: i64) -> Result<()> {
        self.comments
            .lock()
            .unwrap()
            .extend(comments.iter().map(|c| (submission_id, c.clone())));
        Ok(())
    }
}
