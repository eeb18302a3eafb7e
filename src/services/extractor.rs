use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::ExtractedDocument;
use crate::traits::Extractor;

const EXTRACT_METHOD: &str = "extractNewspaper";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: ExtractArgs<'a>,
    id: u64,
}

#[derive(Debug, Serialize)]
struct ExtractArgs<'a> {
    #[serde(rename = "Link")]
    link: &'a str,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<RawArticle>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawArticle {
    #[serde(rename = "Title", alias = "title", default)]
    title: String,
    #[serde(rename = "Text", alias = "text", default)]
    text: String,
    #[serde(rename = "Authors", alias = "authors", default)]
    authors: Option<Vec<String>>,
    #[serde(rename = "Canonical", alias = "canonical", default)]
    canonical: String,
    #[serde(rename = "PubDate", alias = "pubdate", default)]
    pub_date: String,
}

/// JSON-RPC client for the newspaper extraction service.
pub struct NewspaperClient {
    client: Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl NewspaperClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, link: &str) -> Result<RpcResponse> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: EXTRACT_METHOD,
            params: ExtractArgs { link },
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

/// Turns an RPC response into a document, treating errors, null results and
/// untitled results as "nothing extracted".
fn into_document(response: RpcResponse) -> Option<ExtractedDocument> {
    if let Some(error) = response.error.filter(|e| !e.is_null()) {
        tracing::debug!(error = %error, "Extraction service returned an error");
        return None;
    }

    let raw = response.result?;
    if raw.title.trim().chars().count() <= 1 {
        return None;
    }

    let non_empty = |s: String| {
        let s = s.trim().to_string();
        (!s.is_empty()).then_some(s)
    };

    Some(ExtractedDocument {
        title: raw.title,
        text: raw.text,
        authors: raw.authors.unwrap_or_default(),
        canonical: non_empty(raw.canonical),
        published: non_empty(raw.pub_date),
    })
}

#[async_trait]
impl Extractor for NewspaperClient {
    async fn extract(&self, link: &str) -> Option<ExtractedDocument> {
        match self.call(link).await {
            Ok(response) => into_document(response),
            Err(e) => {
                tracing::warn!(link = %link, error = %e, "Extraction call failed");
                None
            }
        }
    }
}
