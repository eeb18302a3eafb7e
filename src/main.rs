//! # link-harvester
//!
//! Collects news links from RSS feeds and reddit submissions, enriches each
//! one through an article extraction service, and stores every article once
//! no matter how many mirrors link to it. Reddit threads are stored with
//! their comment trees, recovering branches the API truncated.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `link-harvester news` | Ingest the configured RSS feeds |
//! | `link-harvester links` | Ingest external links of stored reddit submissions |
//! | `link-harvester reddit` | Harvest queued reddit threads that are old enough |
//! | `link-harvester listen` | Queue new submissions from the configured subreddits |
//! | `link-harvester queue-push <permalink>` | Queue one thread by hand |

mod config;
mod context;
mod db;
mod error;
mod ingest;
mod models;
mod policy;
mod reddit;
mod services;
mod sources;
#[cfg(test)]
mod testing;
mod traits;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::Config;
use context::RunContext;
use db::{Repository, SqliteDedupCache, SubmissionQueue};
use error::{AppError, Result};
use ingest::{IngestionDriver, Politeness};
use models::QueuedSubmission;
use policy::Blacklist;
use reddit::{permalink_path, DiscussionDriver, DiscussionSettings, RedditClient, SubmissionListener};
use services::NewspaperClient;

#[derive(Parser)]
#[command(name = "link-harvester", version, about = "Deduplicating news link ingestion and reddit thread harvesting")]
struct Cli {
    /// Path to the TOML configuration file. Defaults to the user config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest articles linked from the configured RSS feeds.
    News,

    /// Ingest the external links of stored reddit submissions.
    Links,

    /// Harvest queued reddit threads older than the lookback window.
    Reddit,

    /// Poll the configured subreddits and queue new submissions.
    Listen,

    /// Queue a single thread by permalink or URL.
    QueuePush {
        permalink: String,

        /// Make the thread eligible for the next `reddit` run right away.
        #[arg(long)]
        ready: bool,
    },
}

/// Everything the subcommands share, opened once at startup.
struct Services {
    repo: Arc<Repository>,
    cache: Arc<SqliteDedupCache>,
    queue: SubmissionQueue,
}

impl Services {
    async fn open(config: &Config) -> Result<Self> {
        let repo = Arc::new(Repository::new(&config.db_path).await?);
        let cache = Arc::new(SqliteDedupCache::new(repo.connection()));
        let queue = SubmissionQueue::new(repo.connection());
        tracing::debug!(db = %config.db_path, "Opened database");
        Ok(Self { repo, cache, queue })
    }

    fn ingestion_driver(&self, config: &Config) -> Result<Arc<IngestionDriver>> {
        let blacklist = match &config.blacklist_path {
            Some(path) => Blacklist::load(path)?,
            None => {
                tracing::warn!("No blacklist configured, accepting every host");
                Blacklist::default()
            }
        };
        let (min, max) = config.politeness();

        Ok(Arc::new(IngestionDriver::new(
            Arc::new(NewspaperClient::new(config.extraction_url.clone())?),
            self.cache.clone(),
            self.repo.clone(),
            Arc::new(blacklist),
            Politeness::new(min, max),
        )))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let services = Services::open(&config).await?;

    match cli.command {
        Commands::News => {
            let ctx = RunContext::new("news");
            let fetcher = sources::FeedFetcher::new(&config.reddit.user_agent)?;
            let references = fetcher.fetch_all(&config.feeds).await;
            let references = sources::drop_known(services.cache.as_ref(), references).await;

            let driver = services.ingestion_driver(&config)?;
            driver.run(&ctx, references).await.log(&ctx);
            tracing::info!(stored = services.repo.count_articles().await?, "Articles in store");
        }
        Commands::Links => {
            let ctx = RunContext::new("links");
            let references = sources::submission_references(&services.repo).await?;
            let references = sources::drop_known(services.cache.as_ref(), references).await;

            let driver = services.ingestion_driver(&config)?;
            driver.run(&ctx, references).await.log(&ctx);
            tracing::info!(stored = services.repo.count_articles().await?, "Articles in store");
        }
        Commands::Reddit => {
            let ctx = RunContext::new("reddit");
            let submissions = services
                .queue
                .pop_ready(config.reddit.lookback_hours, Utc::now())
                .await?;
            tracing::info!(ready = submissions.len(), "Popped queued submissions");

            let driver = Arc::new(DiscussionDriver::new(
                Arc::new(RedditClient::new(&config.reddit)?),
                services.repo.clone(),
                services.repo.clone(),
                services.cache.clone(),
                services.ingestion_driver(&config)?,
                DiscussionSettings::from_config(&config.reddit, config.harvest),
            ));
            driver.run(&ctx, submissions).await;
        }
        Commands::Listen => {
            if config.reddit.subreddits.is_empty() {
                return Err(AppError::Config("no subreddits configured to listen to".into()));
            }
            let mut listener = SubmissionListener::new(
                Arc::new(RedditClient::new(&config.reddit)?),
                services.queue.clone(),
                config.reddit.subreddits.clone(),
                Duration::from_secs(config.reddit.listen_interval_secs),
            );
            listener.run().await?;
        }
        Commands::QueuePush { permalink, ready } => {
            let path = permalink_path(&permalink)
                .ok_or_else(|| AppError::Config(format!("not a reddit thread permalink: {permalink}")))?;
            let mut created_at = Utc::now();
            if ready {
                created_at -= chrono::Duration::seconds((config.reddit.lookback_hours * 3600.0).ceil() as i64);
            }
            services
                .queue
                .push(&QueuedSubmission::new(path.clone(), created_at))
                .await?;
            tracing::info!(permalink = %path, pending = services.queue.len().await?, "Queued submission");
        }
    }

    Ok(())
}
