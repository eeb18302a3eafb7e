pub const SCHEMA: &str = r#"
-- articles table
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data_entry_time TEXT NOT NULL DEFAULT (datetime('now')),
    source TEXT NOT NULL,
    host TEXT NOT NULL,
    link TEXT NOT NULL,
    source_published_at TEXT,
    published_at TEXT,
    source_title TEXT,
    title TEXT,
    canonical_link TEXT,
    body TEXT NOT NULL,
    authors TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_articles_link ON articles(link);
CREATE INDEX IF NOT EXISTS idx_articles_canonical_link ON articles(canonical_link);

-- reddit_submissions table
CREATE TABLE IF NOT EXISTS reddit_submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data_entry_time TEXT NOT NULL DEFAULT (datetime('now')),
    reddit_id TEXT NOT NULL,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    permalink TEXT NOT NULL,
    created_at TEXT,
    author TEXT NOT NULL,
    subreddit TEXT NOT NULL,
    subreddit_id TEXT NOT NULL,
    selftext TEXT NOT NULL,
    num_comments INTEGER NOT NULL,
    score INTEGER NOT NULL,
    ups INTEGER NOT NULL,
    downs INTEGER NOT NULL,
    is_nsfw INTEGER NOT NULL,
    is_self INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reddit_submissions_reddit_id ON reddit_submissions(reddit_id);

-- reddit_comments table
CREATE TABLE IF NOT EXISTS reddit_comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data_entry_time TEXT NOT NULL DEFAULT (datetime('now')),
    submission_id INTEGER NOT NULL REFERENCES reddit_submissions(id) ON DELETE CASCADE,
    reddit_id TEXT NOT NULL,
    parent_id TEXT NOT NULL,
    created_at TEXT,
    author TEXT NOT NULL,
    body TEXT NOT NULL,
    ups INTEGER NOT NULL,
    downs INTEGER NOT NULL,
    is_deleted INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reddit_comments_submission_id ON reddit_comments(submission_id);

-- submission_articles table (cross-reference between a thread and the article it links to)
CREATE TABLE IF NOT EXISTS submission_articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    submission_id INTEGER NOT NULL REFERENCES reddit_submissions(id) ON DELETE CASCADE,
    article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    UNIQUE(submission_id, article_id)
);

-- seen_links table (dedup cache)
CREATE TABLE IF NOT EXISTS seen_links (
    key TEXT PRIMARY KEY,
    added_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- submission_queue table (FIFO of submissions waiting for their lookback window)
CREATE TABLE IF NOT EXISTS submission_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    queued_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
