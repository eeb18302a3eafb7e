use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::db::SubmissionQueue;
use crate::error::Result;
use crate::models::QueuedSubmission;
use crate::traits::Platform;

const REMEMBERED_POSTS: usize = 5_000;

/// Polls subreddits for new submissions and queues each one once, so the
/// discussion run can pick it up after it has had time to collect comments.
pub struct SubmissionListener {
    platform: Arc<dyn Platform>,
    queue: SubmissionQueue,
    subreddits: Vec<String>,
    interval: Duration,
    recent: VecDeque<String>,
    seen: HashSet<String>,
}

impl SubmissionListener {
    pub fn new(
        platform: Arc<dyn Platform>,
        queue: SubmissionQueue,
        subreddits: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            platform,
            queue,
            subreddits,
            interval,
            recent: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// Forgets the oldest fullnames once the memory is full.
    fn remember(&mut self, fullname: &str) -> bool {
        if !self.seen.insert(fullname.to_string()) {
            return false;
        }
        self.recent.push_back(fullname.to_string());
        if self.recent.len() > REMEMBERED_POSTS {
            if let Some(old) = self.recent.pop_front() {
                self.seen.remove(&old);
            }
        }
        true
    }

    /// One pass over every subreddit; returns how many submissions were queued.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let mut queued = 0;

        for subreddit in self.subreddits.clone() {
            let mut posts = match self.platform.new_posts(&subreddit).await {
                Ok(posts) => posts,
                Err(e) => {
                    tracing::warn!(subreddit = %subreddit, error = %e, "Failed to list new posts");
                    continue;
                }
            };
            // Listings come newest first; queue oldest first.
            posts.reverse();

            for post in posts {
                if !self.remember(&post.fullname) {
                    continue;
                }
                self.queue
                    .push(&QueuedSubmission::new(post.permalink, post.created_at))
                    .await?;
                queued += 1;
            }
        }

        if queued > 0 {
            tracing::info!(queued, "Queued new submissions");
        }
        Ok(queued)
    }

    /// Polls until interrupted with Ctrl-C.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(
            subreddits = ?self.subreddits,
            interval_secs = self.interval.as_secs(),
            "Listening for new submissions"
        );
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await?;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Listener stopped");
                    return Ok(());
                }
            }
        }
    }
}
