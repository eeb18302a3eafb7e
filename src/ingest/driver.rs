use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinSet;

use crate::context::{RunContext, RunSummary};
use crate::error::Result;
use crate::models::{Article, Reference};
use crate::policy::{accept, Blacklist, Decision, RejectReason};
use crate::traits::{ArticleStore, DedupCache, Extractor};

/// Random pause between task launches, drawn uniformly from `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct Politeness {
    min: Duration,
    max: Duration,
}

impl Politeness {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    #[cfg(test)]
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    fn pick(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let ms = rand::rng().random_range(self.min.as_millis() as u64..=self.max.as_millis() as u64);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Inserted(i64),
    Rejected(RejectReason),
    /// Another task claimed one of the article's keys first.
    Duplicate,
    /// The extraction service had nothing for this link.
    Empty,
    Failed,
}

/// Result of [`IngestionDriver::ingest_one`], with the canonical link the
/// extraction service reported so callers can find the stored copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingested {
    pub outcome: TaskOutcome,
    pub canonical: Option<String>,
}

impl Ingested {
    fn empty() -> Self {
        Self {
            outcome: TaskOutcome::Empty,
            canonical: None,
        }
    }
}

#[derive(Default)]
struct Tally {
    attempted: AtomicUsize,
    inserted: AtomicUsize,
    rejected: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn record(&self, outcome: TaskOutcome) {
        let counter = match outcome {
            TaskOutcome::Inserted(_) => &self.inserted,
            TaskOutcome::Rejected(_) | TaskOutcome::Duplicate => &self.rejected,
            TaskOutcome::Failed => &self.failed,
            TaskOutcome::Empty => return,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Turns references into stored articles, at most once per link and per
/// canonical link.
pub struct IngestionDriver {
    extractor: Arc<dyn Extractor>,
    cache: Arc<dyn DedupCache>,
    store: Arc<dyn ArticleStore>,
    blacklist: Arc<Blacklist>,
    politeness: Politeness,
}

impl IngestionDriver {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        cache: Arc<dyn DedupCache>,
        store: Arc<dyn ArticleStore>,
        blacklist: Arc<Blacklist>,
        politeness: Politeness,
    ) -> Self {
        Self {
            extractor,
            cache,
            store,
            blacklist,
            politeness,
        }
    }

    /// Launches one task per unseen reference, pacing launches with the
    /// politeness delay, and waits for all of them before summarising.
    pub async fn run(self: &Arc<Self>, ctx: &RunContext, references: Vec<Reference>) -> RunSummary {
        let tally = Arc::new(Tally::default());
        let mut tasks = JoinSet::new();
        let total = references.len();

        for (i, reference) in references.into_iter().enumerate() {
            match self.cache.is_member(&reference.link).await {
                Ok(true) => {
                    tracing::debug!(link = %reference.link, "Skipping known link");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(link = %reference.link, error = %e, "Dedup lookup failed, skipping");
                    continue;
                }
            }

            tracing::debug!(title = %reference.title, link = %reference.link, host = %reference.host, "Launching extraction");
            tally.attempted.fetch_add(1, Ordering::SeqCst);

            let driver = Arc::clone(self);
            let task_tally = Arc::clone(&tally);
            tasks.spawn(async move {
                let ingested = driver.ingest_one(reference).await;
                task_tally.record(ingested.outcome);
            });

            if i + 1 < total {
                tokio::time::sleep(self.politeness.pick()).await;
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(run = %ctx.name, error = %e, "Ingestion task panicked");
                tally.failed.fetch_add(1, Ordering::SeqCst);
            }
        }

        RunSummary {
            attempted: tally.attempted.load(Ordering::SeqCst),
            inserted: tally.inserted.load(Ordering::SeqCst),
            rejected: tally.rejected.load(Ordering::SeqCst),
            failed: tally.failed.load(Ordering::SeqCst),
            duration: ctx.elapsed(),
        }
    }

    /// Extracts, judges and stores a single reference.
    pub async fn ingest_one(&self, reference: Reference) -> Ingested {
        let Some(document) = self.extractor.extract(&reference.link).await else {
            tracing::debug!(link = %reference.link, "Nothing extracted");
            return Ingested::empty();
        };

        let canonical = document
            .canonical
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let mut candidates = vec![reference.link.clone()];
        candidates.extend(canonical.clone());
        let seen = match self.seen_among(&candidates).await {
            Ok(seen) => seen,
            Err(e) => {
                tracing::warn!(link = %reference.link, error = %e, "Dedup lookup failed");
                return Ingested {
                    outcome: TaskOutcome::Failed,
                    canonical,
                };
            }
        };

        let outcome = match accept(&reference, &document, &self.blacklist, |k| seen.contains(k)) {
            Decision::Reject(reason) => {
                tracing::info!(link = %reference.link, %reason, "Rejected article");
                TaskOutcome::Rejected(reason)
            }
            Decision::Accept { article, keys } => self.commit(&article, &keys).await,
        };
        Ingested { outcome, canonical }
    }

    async fn seen_among(&self, keys: &[String]) -> Result<HashSet<String>> {
        let mut seen = HashSet::new();
        for key in keys {
            if self.cache.is_member(key).await? {
                seen.insert(key.clone());
            }
        }
        Ok(seen)
    }

    /// Claims the article's keys, then stores it. Losing the claim means a
    /// concurrent task already owns the article, so this copy is dropped.
    async fn commit(&self, article: &Article, keys: &[String]) -> TaskOutcome {
        match self.cache.claim(keys).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(link = %article.link, "Lost dedup race, discarding");
                return TaskOutcome::Duplicate;
            }
            Err(e) => {
                tracing::warn!(link = %article.link, error = %e, "Dedup claim failed");
                return TaskOutcome::Failed;
            }
        }

        match self.store.insert_article(article).await {
            Ok(id) => TaskOutcome::Inserted(id),
            Err(e) => {
                tracing::error!(link = %article.link, error = %e, "Failed to insert article");
                if let Err(e) = self.cache.release(keys).await {
                    tracing::error!(link = %article.link, error = %e, "Failed to release dedup keys");
                }
                TaskOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractedDocument, Origin};
    use crate::testing::{MemoryDedupCache, MemoryStore, MockExtractor};

    const BODY: &str = "A body that is long enough not to look suspicious at all.";

    fn doc(title: &str, canonical: Option<&str>) -> ExtractedDocument {
        ExtractedDocument {
            title: title.to_string(),
            text: BODY.to_string(),
            authors: vec![],
            canonical: canonical.map(str::to_string),
            published: None,
        }
    }

    fn reference(link: &str) -> Reference {
        Reference::new("A reference title", link, Origin::RssFeed, None)
    }

    struct Fixture {
        driver: Arc<IngestionDriver>,
        cache: Arc<MemoryDedupCache>,
        store: Arc<MemoryStore>,
        extractor: Arc<MockExtractor>,
    }

    fn fixture(extractor: MockExtractor, blacklist: Blacklist) -> Fixture {
        let extractor = Arc::new(extractor);
        let cache = Arc::new(MemoryDedupCache::new());
        let store = Arc::new(MemoryStore::new());
        let driver = Arc::new(IngestionDriver::new(
            extractor.clone(),
            cache.clone(),
            store.clone(),
            Arc::new(blacklist),
            Politeness::none(),
        ));
        Fixture {
            driver,
            cache,
            store,
            extractor,
        }
    }

    #[tokio::test]
    async fn running_twice_stores_each_article_once() {
        let f = fixture(
            MockExtractor::new()
                .on("http://a.example/1", doc("First story", Some("http://a.example/1")))
                .on("http://a.example/2", doc("Second story", Some("http://c.example/2"))),
            Blacklist::default(),
        );
        let refs = vec![reference("http://a.example/1"), reference("http://a.example/2")];

        let first = f.driver.run(&RunContext::new("test"), refs.clone()).await;
        assert_eq!(first.attempted, 2);
        assert_eq!(first.inserted, 2);

        let second = f.driver.run(&RunContext::new("test"), refs).await;
        assert_eq!(second.attempted, 0);
        assert_eq!(second.inserted, 0);
        assert_eq!(f.store.articles().len(), 2);
        assert_eq!(f.extractor.calls(), 2);
        assert!(f.cache.contains("http://c.example/2"));
    }

    #[tokio::test]
    async fn racing_tasks_share_one_canonical_article() {
        // Two mirrors resolve to the same canonical link and extract concurrently.
        let f = fixture(
            MockExtractor::new()
                .with_delay(Duration::from_millis(50))
                .on("http://amp.a.example/y", doc("Shared story", Some("http://a.example/y")))
                .on("http://m.a.example/y", doc("Shared story", Some("http://a.example/y"))),
            Blacklist::default(),
        );
        let refs = vec![reference("http://amp.a.example/y"), reference("http://m.a.example/y")];

        let summary = f.driver.run(&RunContext::new("race"), refs).await;
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(f.store.articles().len(), 1);
    }

    #[tokio::test]
    async fn empty_body_writes_nothing_to_cache() {
        let mut empty = doc("A", None);
        empty.text = String::new();
        let f = fixture(
            MockExtractor::new().on("http://a.example/x", empty),
            Blacklist::default(),
        );

        let ingested = f.driver.ingest_one(reference("http://a.example/x")).await;
        assert_eq!(ingested.outcome, TaskOutcome::Rejected(RejectReason::EmptyBody));
        assert!(f.cache.is_empty());
        assert!(f.store.articles().is_empty());
    }

    #[tokio::test]
    async fn blacklisted_canonical_is_dropped() {
        let f = fixture(
            MockExtractor::new().on("http://a.example/y", doc("Valid Title", Some("http://b.example/y2"))),
            Blacklist::from_hosts(["b.example"]),
        );

        let summary = f
            .driver
            .run(&RunContext::new("test"), vec![reference("http://a.example/y")])
            .await;
        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.rejected, 1);
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn failed_extraction_and_failed_insert_do_not_abort_the_run() {
        let store = MemoryStore::new();
        store.fail_inserts_for("http://a.example/broken");
        let extractor = Arc::new(
            MockExtractor::new()
                .on("http://a.example/broken", doc("Broken story", None))
                .on("http://a.example/fine", doc("Fine story", None)),
        );
        let cache = Arc::new(MemoryDedupCache::new());
        let store = Arc::new(store);
        let driver = Arc::new(IngestionDriver::new(
            extractor,
            cache.clone(),
            store.clone(),
            Arc::new(Blacklist::default()),
            Politeness::none(),
        ));

        let refs = vec![
            reference("http://a.example/missing"),
            reference("http://a.example/broken"),
            reference("http://a.example/fine"),
        ];
        let summary = driver.run(&RunContext::new("test"), refs).await;
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.failed, 1);
        // The failed insert gave its key back for a later run.
        assert!(!cache.contains("http://a.example/broken"));
        assert!(cache.contains("http://a.example/fine"));
    }

    #[test]
    fn politeness_stays_in_range() {
        let p = Politeness::new(Duration::from_millis(1_000), Duration::from_millis(6_000));
        for _ in 0..100 {
            let d = p.pick();
            assert!(d >= Duration::from_millis(1_000) && d <= Duration::from_millis(6_000));
        }
        assert_eq!(Politeness::none().pick(), Duration::ZERO);
    }
}
