use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{Article, Comment, RootPost};
use crate::traits::{ArticleStore, ThreadStore};

use super::schema::SCHEMA;

/// A stored submission whose url points off-platform.
#[derive(Debug, Clone)]
pub struct SubmissionLink {
    pub title: String,
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
}

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Handle for the cache and queue, which live in the same database.
    pub fn connection(&self) -> Connection {
        self.conn.clone()
    }

    // Submission link operations

    pub async fn get_submission_links(&self) -> Result<Vec<SubmissionLink>> {
        let links = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT title, url, created_at FROM reddit_submissions
                       WHERE LENGTH(TRIM(url)) > 2
                       ORDER BY created_at ASC"#,
                )?;
                let links = stmt
                    .query_map([], |row| {
                        Ok(SubmissionLink {
                            title: row.get(0)?,
                            url: row.get::<_, String>(1)?.trim().to_string(),
                            created_at: row
                                .get::<_, Option<String>>(2)?
                                .and_then(|s| parse_datetime(&s)),
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(links)
            })
            .await?;
        Ok(links)
    }

    pub async fn count_articles(&self) -> Result<i64> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    #[cfg(test)]
    pub async fn count_comments(&self, submission_id: i64) -> Result<i64> {
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM reddit_comments WHERE submission_id = ?1",
                    params![submission_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ArticleStore for Repository {
    async fn insert_article(&self, article: &Article) -> Result<i64> {
        let link = article.link.clone();
        let article = article.clone();
        let authors = serde_json::to_string(&article.authors)?;
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO articles (source, host, link, source_published_at, published_at,
                                             source_title, title, canonical_link, body, authors)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
                    params![
                        article.source,
                        article.host,
                        article.link,
                        article.source_published_at.map(|dt| dt.to_rfc3339()),
                        article.published_at.map(|dt| dt.to_rfc3339()),
                        article.source_title,
                        article.title,
                        article.canonical_link,
                        article.body,
                        authors,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        tracing::info!(link = %link, article_id = id, "Inserted article");
        Ok(id)
    }

    async fn find_article_id(&self, url: &str) -> Result<Option<i64>> {
        let url = url.to_string();
        let id = self
            .conn
            .call(move |conn| {
                let id = conn
                    .query_row(
                        "SELECT id FROM articles WHERE link = ?1 OR canonical_link = ?1 ORDER BY id LIMIT 1",
                        params![url],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    async fn link_submission(&self, submission_id: i64, article_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO submission_articles (submission_id, article_id) VALUES (?1, ?2)",
                    params![submission_id, article_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ThreadStore for Repository {
    async fn insert_post(&self, post: &RootPost) -> Result<i64> {
        let (reddit_id, permalink) = (post.id.clone(), post.permalink.clone());
        let post = post.clone();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO reddit_submissions (reddit_id, title, url, permalink, created_at, author,
                                                       subreddit, subreddit_id, selftext, num_comments,
                                                       score, ups, downs, is_nsfw, is_self)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"#,
                    params![
                        post.id,
                        post.title,
                        post.url,
                        post.permalink,
                        post.created_at.map(|dt| dt.to_rfc3339()),
                        post.author,
                        post.subreddit,
                        post.subreddit_id,
                        post.selftext,
                        post.num_comments,
                        post.score,
                        post.ups,
                        post.downs,
                        post.nsfw,
                        post.is_self,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        tracing::info!(reddit_id = %reddit_id, permalink = %permalink, submission_id = id, "Inserted reddit submission");
        Ok(id)
    }

    async fn insert_comments(&self, comments: &[Comment], submission_id: i64) -> Result<()> {
        let comments = comments.to_vec();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        r#"INSERT INTO reddit_comments (submission_id, reddit_id, parent_id, created_at,
                                                        author, body, ups, downs, is_deleted)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
                    )?;
                    for comment in &comments {
                        stmt.execute(params![
                            submission_id,
                            comment.id,
                            comment.parent_id,
                            comment.created_at.map(|dt| dt.to_rfc3339()),
                            comment.author,
                            comment.body,
                            comment.ups,
                            comment.downs,
                            comment.deleted,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Naive timestamps are taken as UTC (SQLite "2026-01-11 12:34:56" or ISO "2026-01-11T12:34:56")
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    None
}
