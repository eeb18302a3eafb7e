use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::RedditConfig;
use crate::error::{AppError, Result};
use crate::models::{Comment, DiscussionThread, MoreStub};
use crate::traits::{FetchOptions, Platform};

use super::parse::{parse_more_children, parse_new_posts, parse_thread};
use super::{NewPost, PlatformError, MORE_CHILDREN_LIMIT};

const PUBLIC_API_URL: &str = "https://www.reddit.com";
const OAUTH_API_URL: &str = "https://oauth.reddit.com";
const ACCESS_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

static PERMALINK_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// Extracts the `/r/<sub>/comments/<id>/...` path from a permalink or full URL.
pub fn permalink_path(input: &str) -> Option<String> {
    let re = PERMALINK_RE
        .get_or_init(|| Regex::new(r"/r/[^/\s]+/comments/[a-z0-9]+(?:/[^/?#\s]*)?").ok())
        .as_ref()?;
    let found = re.find(input.trim())?.as_str();
    Some(format!("{}/", found.trim_end_matches('/')))
}

#[derive(Debug, Clone)]
struct Credentials {
    client_id: String,
    client_secret: String,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Reddit JSON API client. Uses OAuth when script-app credentials are
/// configured and the public endpoints otherwise. Requests are spaced at
/// least `request_interval` apart across all callers.
pub struct RedditClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    token: Mutex<Option<AccessToken>>,
    request_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RedditClient {
    pub fn new(config: &RedditConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.clone())
            .build()?;

        let credentials = match (
            &config.client_id,
            &config.client_secret,
            &config.username,
            &config.password,
        ) {
            (Some(id), Some(secret), Some(user), Some(pass)) => Some(Credentials {
                client_id: id.clone(),
                client_secret: secret.clone(),
                username: user.clone(),
                password: pass.clone(),
            }),
            (None, None, None, None) => None,
            _ => {
                return Err(AppError::Config(
                    "reddit credentials need client_id, client_secret, username and password".into(),
                ))
            }
        };

        let base_url = if credentials.is_some() {
            OAUTH_API_URL
        } else {
            PUBLIC_API_URL
        };

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            credentials,
            token: Mutex::new(None),
            request_interval: Duration::from_millis(config.request_interval_ms),
            last_request: Mutex::new(None),
        })
    }

    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let since = at.elapsed();
            if since < self.request_interval {
                tokio::time::sleep(self.request_interval - since).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn bearer_token(&self) -> std::result::Result<Option<String>, PlatformError> {
        let Some(creds) = &self.credentials else {
            return Ok(None);
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(Some(token.value.clone()));
            }
        }

        let response = self
            .client
            .post(ACCESS_TOKEN_URL)
            .basic_auth(&creds.client_id, Some(&creds.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", creds.username.as_str()),
                ("password", creds.password.as_str()),
            ])
            .send()
            .await?;

        if let Some(err) = classify(response.status()) {
            return Err(err);
        }

        let token: TokenResponse = response.json().await?;
        // Refresh a minute early so a token never expires mid-request.
        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(60));
        *cached = Some(AccessToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        tracing::debug!("Obtained reddit access token");
        Ok(Some(token.access_token))
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<String, PlatformError> {
        let token = self.bearer_token().await?;
        self.throttle().await;

        let mut request = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if let Some(err) = classify(response.status()) {
            return Err(err);
        }

        Ok(response.text().await?)
    }
}

/// Maps an HTTP status onto the platform error taxonomy; `None` on success.
fn classify(status: StatusCode) -> Option<PlatformError> {
    match status.as_u16() {
        200..=299 => None,
        429 => Some(PlatformError::RateLimited),
        code @ (500 | 502 | 503 | 504) => Some(PlatformError::Busy(code)),
        403 | 404 | 410 => Some(PlatformError::NotFound),
        code => Some(PlatformError::Other(format!("unexpected HTTP status {code}"))),
    }
}

#[async_trait]
impl Platform for RedditClient {
    async fn fetch_thread(
        &self,
        permalink: &str,
        opts: FetchOptions,
    ) -> std::result::Result<DiscussionThread, PlatformError> {
        let path = permalink_path(permalink)
            .ok_or_else(|| PlatformError::Other(format!("not a thread permalink: {permalink}")))?;

        let body = self
            .get(
                &format!("{}.json", path.trim_end_matches('/')),
                &[
                    ("raw_json", "1".to_string()),
                    ("limit", opts.limit.to_string()),
                    ("depth", opts.depth.to_string()),
                ],
            )
            .await?;

        parse_thread(&body)
    }

    async fn expand_more(
        &self,
        link_id: &str,
        children: &[String],
    ) -> std::result::Result<(Vec<Comment>, Vec<MoreStub>), PlatformError> {
        if children.len() > MORE_CHILDREN_LIMIT {
            return Err(PlatformError::Other(format!(
                "morechildren accepts at most {MORE_CHILDREN_LIMIT} ids, got {}",
                children.len()
            )));
        }

        let body = self
            .get(
                "/api/morechildren.json",
                &[
                    ("api_type", "json".to_string()),
                    ("raw_json", "1".to_string()),
                    ("link_id", link_id.to_string()),
                    ("children", children.join(",")),
                ],
            )
            .await?;

        parse_more_children(&body)
    }

    async fn new_posts(&self, subreddit: &str) -> std::result::Result<Vec<NewPost>, PlatformError> {
        let body = self
            .get(
                &format!("/r/{}/new.json", subreddit.trim().trim_start_matches("r/")),
                &[("limit", "100".to_string()), ("raw_json", "1".to_string())],
            )
            .await?;

        parse_new_posts(&body)
    }
}
