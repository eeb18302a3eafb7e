use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::config::{HarvestConfig, RedditConfig};
use crate::context::{RunContext, RunSummary};
use crate::ingest::{IngestionDriver, TaskOutcome};
use crate::models::{flatten, DiscussionThread, Origin, QueuedSubmission, Reference, RootPost};
use crate::policy::RejectReason;
use crate::traits::{ArticleStore, DedupCache, FetchOptions, Platform, ThreadStore};

use super::harvester::{should_harvest, HarvestLimits, MoreQueue};
use super::PlatformError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Pause before attempt `attempt + 1`; doubles every time.
    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiscussionSettings {
    /// Minimum `num_comments + score` for a thread to be kept.
    pub score_cutoff: i64,
    pub retry: RetryPolicy,
    pub harvest: HarvestLimits,
    pub fetch: FetchOptions,
    /// Fixed pause between task launches.
    pub launch_delay: Duration,
}

impl DiscussionSettings {
    pub fn from_config(reddit: &RedditConfig, harvest: HarvestConfig) -> Self {
        Self {
            score_cutoff: reddit.score_cutoff,
            retry: RetryPolicy {
                max_attempts: reddit.retry_max_attempts.max(1),
                base_delay: Duration::from_millis(reddit.retry_base_delay_ms),
            },
            harvest: harvest.into(),
            fetch: FetchOptions {
                limit: reddit.fetch_limit,
                depth: reddit.fetch_depth,
            },
            launch_delay: Duration::from_millis(reddit.launch_delay_ms),
        }
    }
}

/// What happened to one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Stored {
        submission_id: i64,
        comments: usize,
        article_id: Option<i64>,
    },
    /// Deleted, or too little engagement to bother.
    BelowGate,
    /// The thread could not be fetched.
    Unavailable,
    Failed,
}

enum FetchState {
    Fetching { attempt: u32 },
    Retry { attempt: u32, delay: Duration, error: PlatformError },
    NotFound,
    Error { attempt: u32, error: PlatformError },
    Fetched(DiscussionThread),
}

/// Fetches discussion threads, fills in truncated branches, stores the result
/// and ties each submission to the article it links to.
pub struct DiscussionDriver {
    platform: Arc<dyn Platform>,
    threads: Arc<dyn ThreadStore>,
    articles: Arc<dyn ArticleStore>,
    cache: Arc<dyn DedupCache>,
    ingest: Arc<IngestionDriver>,
    settings: DiscussionSettings,
}

impl DiscussionDriver {
    pub fn new(
        platform: Arc<dyn Platform>,
        threads: Arc<dyn ThreadStore>,
        articles: Arc<dyn ArticleStore>,
        cache: Arc<dyn DedupCache>,
        ingest: Arc<IngestionDriver>,
        settings: DiscussionSettings,
    ) -> Self {
        Self {
            platform,
            threads,
            articles,
            cache,
            ingest,
            settings,
        }
    }

    pub async fn run(self: &Arc<Self>, ctx: &RunContext, submissions: Vec<QueuedSubmission>) -> RunSummary {
        let attempted = submissions.len();
        let inserted = Arc::new(AtomicUsize::new(0));
        let rejected = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();

        for (i, submission) in submissions.into_iter().enumerate() {
            let driver = Arc::clone(self);
            let (inserted, rejected, failed) = (inserted.clone(), rejected.clone(), failed.clone());
            tasks.spawn(async move {
                let counter = match driver.process(&submission.permalink).await {
                    Outcome::Stored { .. } => inserted,
                    Outcome::BelowGate => rejected,
                    Outcome::Unavailable | Outcome::Failed => failed,
                };
                counter.fetch_add(1, Ordering::SeqCst);
            });

            if i + 1 < attempted {
                tokio::time::sleep(self.settings.launch_delay).await;
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(run = %ctx.name, error = %e, "Discussion task panicked");
                failed.fetch_add(1, Ordering::SeqCst);
            }
        }

        let summary = RunSummary {
            attempted,
            inserted: inserted.load(Ordering::SeqCst),
            rejected: rejected.load(Ordering::SeqCst),
            failed: failed.load(Ordering::SeqCst),
            duration: ctx.elapsed(),
        };
        summary.log(ctx);
        summary
    }

    /// Fetches a thread, retrying transient failures with exponential backoff.
    pub async fn fetch(&self, permalink: &str) -> Option<DiscussionThread> {
        let retry = self.settings.retry;
        let mut state = FetchState::Fetching { attempt: 1 };

        loop {
            state = match state {
                FetchState::Fetching { attempt } => {
                    match self.platform.fetch_thread(permalink, self.settings.fetch).await {
                        Ok(thread) => FetchState::Fetched(thread),
                        Err(PlatformError::NotFound) => FetchState::NotFound,
                        Err(error) if error.is_transient() && attempt < retry.max_attempts => {
                            FetchState::Retry {
                                attempt,
                                delay: retry.delay_after(attempt),
                                error,
                            }
                        }
                        Err(error) => FetchState::Error { attempt, error },
                    }
                }
                FetchState::Retry {
                    attempt,
                    delay,
                    error,
                } => {
                    tracing::info!(
                        permalink,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying thread fetch"
                    );
                    tokio::time::sleep(delay).await;
                    FetchState::Fetching {
                        attempt: attempt + 1,
                    }
                }
                FetchState::NotFound => {
                    tracing::debug!(permalink, "Thread not found");
                    return None;
                }
                FetchState::Error { attempt, error } => {
                    if error.is_transient() {
                        tracing::warn!(permalink, attempts = attempt, error = %error, "Giving up on thread");
                    } else {
                        tracing::warn!(permalink, error = %error, "Failed to fetch thread");
                    }
                    return None;
                }
                FetchState::Fetched(thread) => return Some(thread),
            };
        }
    }

    /// Whether a thread earned enough attention to be stored.
    fn passes_gate(&self, post: &RootPost) -> bool {
        !post.deleted && post.num_comments + post.score >= self.settings.score_cutoff
    }

    pub async fn process(&self, permalink: &str) -> Outcome {
        let Some(thread) = self.fetch(permalink).await else {
            return Outcome::Unavailable;
        };

        if !self.passes_gate(&thread.post) {
            tracing::debug!(
                permalink,
                score = thread.post.score,
                comments = thread.post.num_comments,
                deleted = thread.post.deleted,
                "Thread below engagement gate"
            );
            return Outcome::BelowGate;
        }

        let submission_id = match self.threads.insert_post(&thread.post).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(permalink, error = %e, "Failed to store submission");
                return Outcome::Failed;
            }
        };

        let mut comments = flatten(&thread.comments);
        if should_harvest(&thread, comments.len()) {
            let harvested = MoreQueue::new(&thread, self.settings.harvest)
                .harvest(self.platform.as_ref())
                .await;
            tracing::debug!(
                permalink,
                calls = harvested.calls_used,
                recovered = harvested.comments.len(),
                "Harvested truncated branches"
            );
            comments.extend(harvested.comments);
        }

        if let Err(e) = self.threads.insert_comments(&comments, submission_id).await {
            tracing::error!(permalink, submission_id, error = %e, "Failed to store comments");
            return Outcome::Failed;
        }

        let article_id = self.link_article(submission_id, &thread.post).await;

        tracing::info!(
            permalink,
            submission_id,
            comments = comments.len(),
            article = ?article_id,
            "Stored discussion"
        );
        Outcome::Stored {
            submission_id,
            comments: comments.len(),
            article_id,
        }
    }

    /// Cross-references the submission with the article behind its external
    /// link, ingesting the article first when it is not known yet.
    async fn link_article(&self, submission_id: i64, post: &RootPost) -> Option<i64> {
        let link = post.external_link()?;
        let reference = Reference::new(
            post.title.clone(),
            link,
            Origin::RedditSubmission,
            post.created_at,
        );

        let known = match self.cache.is_member(&reference.link).await {
            Ok(known) => known,
            Err(e) => {
                tracing::warn!(link = %reference.link, error = %e, "Dedup lookup failed");
                return None;
            }
        };

        let article_id = if known {
            self.existing_article(&reference.link).await
        } else {
            let link = reference.link.clone();
            let ingested = self.ingest.ingest_one(reference).await;
            match ingested.outcome {
                TaskOutcome::Inserted(id) => Some(id),
                // Someone else stored it under this link or its canonical one.
                TaskOutcome::Duplicate | TaskOutcome::Rejected(RejectReason::AlreadySeen) => {
                    match self.existing_article(&link).await {
                        Some(id) => Some(id),
                        None => match ingested.canonical.as_deref() {
                            Some(canonical) => self.existing_article(canonical).await,
                            None => None,
                        },
                    }
                }
                outcome => {
                    tracing::debug!(link = %link, ?outcome, "Submission link not ingested");
                    None
                }
            }
        }?;

        if let Err(e) = self.articles.link_submission(submission_id, article_id).await {
            tracing::error!(submission_id, article_id, error = %e, "Failed to link submission to article");
            return None;
        }
        Some(article_id)
    }

    async fn existing_article(&self, link: &str) -> Option<i64> {
        match self.articles.find_article_id(link).await {
            Ok(found) => {
                if found.is_none() {
                    tracing::debug!(link, "Known link has no stored article");
                }
                found
            }
            Err(e) => {
                tracing::warn!(link, error = %e, "Article lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::ingest::Politeness;
    use crate::models::{Comment, ExtractedDocument, MoreStub};
    use crate::policy::Blacklist;
    use crate::testing::{MemoryDedupCache, MemoryStore, MockExtractor, MockPlatform};

    const PERMALINK: &str = "/r/news/comments/abc/story/";
    const STORY: &str = "https://news.example.com/story";

    fn settings() -> DiscussionSettings {
        DiscussionSettings {
            score_cutoff: 5,
            retry: RetryPolicy {
                max_attempts: 4,
                base_delay: Duration::from_millis(1),
            },
            harvest: HarvestLimits {
                max_depth: 5,
                min_children: 3,
                max_calls: 15,
            },
            fetch: FetchOptions::default(),
            launch_delay: Duration::ZERO,
        }
    }

    fn post(num_comments: i64, score: i64) -> RootPost {
        RootPost {
            id: "abc".into(),
            fullname: "t3_abc".into(),
            title: "A story worth discussing".into(),
            url: STORY.into(),
            permalink: PERMALINK.into(),
            num_comments,
            score,
            ..Default::default()
        }
    }

    fn comment(id: &str, children: Vec<Comment>) -> Comment {
        Comment {
            id: id.into(),
            children,
            ..Default::default()
        }
    }

    fn thread(post: RootPost, comments: Vec<Comment>, more: Vec<MoreStub>) -> DiscussionThread {
        DiscussionThread { post, comments, more }
    }

    struct Fixture {
        driver: Arc<DiscussionDriver>,
        platform: Arc<MockPlatform>,
        store: Arc<MemoryStore>,
        cache: Arc<MemoryDedupCache>,
    }

    fn story(canonical: Option<&str>) -> ExtractedDocument {
        ExtractedDocument {
            title: "A story".into(),
            text: "Enough words to count as a real article body, honestly.".into(),
            canonical: canonical.map(str::to_string),
            ..Default::default()
        }
    }

    fn fixture(platform: MockPlatform) -> Fixture {
        fixture_with(platform, MockExtractor::new().on(STORY, story(None)))
    }

    fn fixture_with(platform: MockPlatform, extractor: MockExtractor) -> Fixture {
        let platform = Arc::new(platform);
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryDedupCache::new());
        let ingest = Arc::new(IngestionDriver::new(
            Arc::new(extractor),
            cache.clone(),
            store.clone(),
            Arc::new(Blacklist::default()),
            Politeness::none(),
        ));
        let driver = Arc::new(DiscussionDriver::new(
            platform.clone(),
            store.clone(),
            store.clone(),
            cache.clone(),
            ingest,
            settings(),
        ));
        Fixture {
            driver,
            platform,
            store,
            cache,
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let f = fixture(MockPlatform::new().with_thread(
            PERMALINK,
            vec![
                Err(PlatformError::RateLimited),
                Err(PlatformError::Busy(503)),
                Ok(thread(post(3, 10), vec![], vec![])),
            ],
        ));

        assert!(f.driver.fetch(PERMALINK).await.is_some());
        assert_eq!(f.platform.fetch_calls(), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let f = fixture(MockPlatform::new().with_thread(PERMALINK, vec![Err(PlatformError::Busy(502))]));

        assert!(f.driver.fetch(PERMALINK).await.is_none());
        assert_eq!(f.platform.fetch_calls(), 4);
    }

    #[tokio::test]
    async fn missing_and_broken_threads_are_not_retried() {
        let f = fixture(
            MockPlatform::new()
                .with_thread(PERMALINK, vec![Err(PlatformError::NotFound)])
                .with_thread("/r/x/comments/bad/", vec![Err(PlatformError::Other("bad json".into()))]),
        );

        assert_eq!(f.driver.process(PERMALINK).await, Outcome::Unavailable);
        assert_eq!(f.driver.process("/r/x/comments/bad/").await, Outcome::Unavailable);
        assert_eq!(f.platform.fetch_calls(), 2);
    }

    #[test]
    fn backoff_doubles() {
        let retry = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_secs(5),
        };
        assert_eq!(retry.delay_after(1), Duration::from_secs(5));
        assert_eq!(retry.delay_after(2), Duration::from_secs(10));
        assert_eq!(retry.delay_after(3), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn quiet_and_deleted_threads_are_skipped() {
        let mut deleted = post(100, 100);
        deleted.deleted = true;
        let f = fixture(
            MockPlatform::new()
                .with_thread(PERMALINK, vec![Ok(thread(post(2, 2), vec![], vec![]))])
                .with_thread("/r/x/comments/gone/", vec![Ok(thread(deleted, vec![], vec![]))]),
        );

        assert_eq!(f.driver.process(PERMALINK).await, Outcome::BelowGate);
        assert_eq!(f.driver.process("/r/x/comments/gone/").await, Outcome::BelowGate);
        assert!(f.store.posts().is_empty());
        assert!(f.store.articles().is_empty());
    }

    #[tokio::test]
    async fn thread_is_stored_and_linked_to_a_new_article() {
        let tree = vec![comment("a", vec![comment("a1", vec![])]), comment("b", vec![])];
        let f = fixture(MockPlatform::new().with_thread(PERMALINK, vec![Ok(thread(post(3, 4), tree, vec![]))]));

        let outcome = f.driver.process(PERMALINK).await;
        assert_eq!(
            outcome,
            Outcome::Stored {
                submission_id: 1,
                comments: 3,
                article_id: Some(1),
            }
        );
        assert!(f.platform.expand_calls().is_empty());
        assert_eq!(f.store.comments_of(1).len(), 3);
        assert_eq!(f.store.links(), vec![(1, 1)]);
        assert!(f.cache.contains(STORY));
    }

    #[tokio::test]
    async fn known_article_is_cross_referenced_without_reingesting() {
        let f = fixture(MockPlatform::new().with_thread(PERMALINK, vec![Ok(thread(post(3, 4), vec![], vec![]))]));
        f.driver.process(PERMALINK).await;

        // A second submission of the same link reuses the stored article.
        let mut again = post(10, 10);
        again.id = "def".into();
        again.fullname = "t3_def".into();
        let second = DiscussionDriver::new(
            Arc::new(MockPlatform::new().with_thread("/r/x/comments/def/", vec![Ok(thread(again, vec![], vec![]))])),
            f.store.clone(),
            f.store.clone(),
            f.cache.clone(),
            Arc::clone(&f.driver.ingest),
            settings(),
        );
        let outcome = second.process("/r/x/comments/def/").await;
        assert!(matches!(outcome, Outcome::Stored { submission_id: 2, article_id: Some(1), .. }));
        assert_eq!(f.store.articles().len(), 1);
        assert_eq!(f.store.links(), vec![(1, 1), (2, 1)]);
    }

    #[tokio::test]
    async fn mirror_link_is_linked_through_its_canonical() {
        const AMP: &str = "https://amp.example.com/story";
        const MOBILE: &str = "https://m.example.com/story";
        let mut mirror = post(3, 4);
        mirror.url = MOBILE.into();
        let f = fixture_with(
            MockPlatform::new().with_thread(PERMALINK, vec![Ok(thread(mirror, vec![], vec![]))]),
            MockExtractor::new()
                .on(AMP, story(Some(STORY)))
                .on(MOBILE, story(Some(STORY))),
        );

        // The feed run stored the article under a different mirror first.
        let first = f
            .driver
            .ingest
            .ingest_one(Reference::new("A story", AMP, Origin::RssFeed, None))
            .await;
        assert_eq!(first.outcome, TaskOutcome::Inserted(1));

        let outcome = f.driver.process(PERMALINK).await;
        assert_eq!(
            outcome,
            Outcome::Stored {
                submission_id: 1,
                comments: 0,
                article_id: Some(1),
            }
        );
        assert_eq!(f.store.articles().len(), 1);
        assert_eq!(f.store.links(), vec![(1, 1)]);
    }

    #[tokio::test]
    async fn self_posts_store_comments_without_article() {
        let mut selfpost = post(30, 30);
        selfpost.is_self = true;
        let f = fixture(MockPlatform::new().with_thread(PERMALINK, vec![Ok(thread(selfpost, vec![comment("a", vec![])], vec![]))]));

        let outcome = f.driver.process(PERMALINK).await;
        assert!(matches!(outcome, Outcome::Stored { comments: 1, article_id: None, .. }));
        assert!(f.store.links().is_empty());
        assert!(!f.cache.is_member(STORY).await.unwrap());
    }

    #[tokio::test]
    async fn incomplete_threads_are_harvested() {
        let root_stub = MoreStub {
            id: "m1".into(),
            parent_id: "t3_abc".into(),
            depth: 0,
            count: 12,
            children: (0..12).map(|i| format!("x{i}")).collect(),
        };
        let f = fixture(MockPlatform::new().with_thread(
            PERMALINK,
            vec![Ok(thread(post(50, 10), vec![comment("a", vec![])], vec![root_stub]))],
        ));

        let outcome = f.driver.process(PERMALINK).await;
        assert!(matches!(outcome, Outcome::Stored { comments: 13, .. }));
        assert_eq!(f.platform.expand_calls().len(), 1);
    }

    #[tokio::test]
    async fn run_counts_every_submission() {
        let f = fixture(
            MockPlatform::new()
                .with_thread(PERMALINK, vec![Ok(thread(post(3, 4), vec![], vec![]))])
                .with_thread("/r/x/comments/quiet/", vec![Ok(thread(post(0, 1), vec![], vec![]))]),
        );
        let now = Utc::now();
        let submissions = vec![
            QueuedSubmission::new(PERMALINK, now),
            QueuedSubmission::new("/r/x/comments/quiet/", now),
            QueuedSubmission::new("/r/x/comments/missing/", now),
        ];

        let summary = f.driver.run(&RunContext::new("reddit"), submissions).await;
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.failed, 1);
    }
}
