use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// JSON-RPC endpoint of the article extraction service.
    #[serde(default = "default_extraction_url")]
    pub extraction_url: String,

    /// Hosts that never make it into the article table, one per line.
    pub blacklist_path: Option<PathBuf>,

    #[serde(default = "default_politeness_min_ms")]
    pub politeness_min_ms: u64,

    #[serde(default = "default_politeness_max_ms")]
    pub politeness_max_ms: u64,

    #[serde(default)]
    pub feeds: Vec<FeedSource>,

    #[serde(default)]
    pub reddit: RedditConfig,

    #[serde(default)]
    pub harvest: HarvestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default)]
    pub subreddits: Vec<String>,

    /// Minimum `num_comments + score` for a thread to be stored.
    #[serde(default = "default_score_cutoff")]
    pub score_cutoff: i64,

    /// Queued submissions younger than this are left for a later run.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: f64,

    #[serde(default = "default_launch_delay_ms")]
    pub launch_delay_ms: u64,

    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,

    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,

    #[serde(default = "default_fetch_depth")]
    pub fetch_depth: u32,

    #[serde(default = "default_listen_interval_secs")]
    pub listen_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: i32,

    #[serde(default = "default_min_children")]
    pub min_children: usize,

    #[serde(default = "default_max_calls")]
    pub max_calls: usize,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("link-harvester");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("harvest.db").to_string_lossy().to_string()
}

fn default_extraction_url() -> String {
    "http://127.0.0.1:8090/rpc".to_string()
}

fn default_politeness_min_ms() -> u64 {
    1_000
}

fn default_politeness_max_ms() -> u64 {
    6_000
}

fn default_user_agent() -> String {
    "link-harvester/1.0".to_string()
}

fn default_score_cutoff() -> i64 {
    5
}

fn default_lookback_hours() -> f64 {
    24.0
}

fn default_launch_delay_ms() -> u64 {
    2_000
}

fn default_request_interval_ms() -> u64 {
    1_000
}

fn default_retry_max_attempts() -> u32 {
    4
}

fn default_retry_base_delay_ms() -> u64 {
    5_000
}

fn default_fetch_limit() -> u32 {
    1_000
}

fn default_fetch_depth() -> u32 {
    1_000
}

fn default_listen_interval_secs() -> u64 {
    60
}

fn default_max_depth() -> i32 {
    5
}

fn default_min_children() -> usize {
    3
}

fn default_max_calls() -> usize {
    15
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            client_id: None,
            client_secret: None,
            username: None,
            password: None,
            subreddits: Vec::new(),
            score_cutoff: default_score_cutoff(),
            lookback_hours: default_lookback_hours(),
            launch_delay_ms: default_launch_delay_ms(),
            request_interval_ms: default_request_interval_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            fetch_limit: default_fetch_limit(),
            fetch_depth: default_fetch_depth(),
            listen_interval_secs: default_listen_interval_secs(),
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            min_children: default_min_children(),
            max_calls: default_max_calls(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            extraction_url: default_extraction_url(),
            blacklist_path: None,
            politeness_min_ms: default_politeness_min_ms(),
            politeness_max_ms: default_politeness_max_ms(),
            feeds: Vec::new(),
            reddit: RedditConfig::default(),
            harvest: HarvestConfig::default(),
        }
    }
}

impl Config {
    /// Loads the config at `path`, or the default location when `None`.
    /// A missing file at the default location is created with defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else if path.is_some() {
            Err(AppError::Config(format!(
                "config file not found: {}",
                config_path.display()
            )))
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("link-harvester")
            .join("config.toml")
    }

    fn validate(&self) -> Result<()> {
        if self.politeness_min_ms > self.politeness_max_ms {
            return Err(AppError::Config(format!(
                "politeness_min_ms ({}) is greater than politeness_max_ms ({})",
                self.politeness_min_ms, self.politeness_max_ms
            )));
        }
        if self.reddit.retry_max_attempts == 0 {
            return Err(AppError::Config(
                "reddit.retry_max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn politeness(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.politeness_min_ms),
            Duration::from_millis(self.politeness_max_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
db_path = "/tmp/test.db"

[[feeds]]
name = "Example"
url = "https://example.com/rss"

[reddit]
subreddits = ["news"]
score_cutoff = 10
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.db_path, "/tmp/test.db");
        assert_eq!(config.feeds.len(), 1);
        assert_eq!(config.reddit.subreddits, vec!["news".to_string()]);
        assert_eq!(config.reddit.score_cutoff, 10);
        assert_eq!(config.reddit.retry_max_attempts, 4);
        assert_eq!(config.harvest.max_calls, 15);
        assert_eq!(config.politeness_min_ms, 1_000);
    }

    #[test]
    fn inverted_politeness_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "politeness_min_ms = 9000\npoliteness_max_ms = 10\n").unwrap();

        assert!(matches!(
            Config::load(Some(&path)),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
