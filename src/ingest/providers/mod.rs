// src/ingest/providers/mod.rs
pub mod newsapi;
pub mod rss;
pub mod tavily;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::ingest::types::{NewsArticle, NewsSource};

pub use newsapi::NewsApiSource;
pub use rss::RssSource;
pub use tavily::TavilySource;

const USER_AGENT: &str = concat!("alpha-news-cache/", env!("CARGO_PKG_VERSION"));

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, FetchError> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(4))
        .timeout(timeout)
        .build()?)
}

/// `"BTC" OR "Bitcoin"` style boolean query, duplicates removed case-insensitively.
pub(crate) fn or_query(terms: &[String]) -> String {
    let mut seen = std::collections::HashSet::new();
    terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode) -> FetchError {
    FetchError::Status {
        provider: provider.to_string(),
        status: status.as_u16(),
    }
}

/// Tries each source in order and returns the first successful answer.
/// An empty list is a success and stops the chain.
pub struct FallbackSource {
    chain: Vec<Arc<dyn NewsSource>>,
    name: String,
}

impl FallbackSource {
    pub fn new(chain: Vec<Arc<dyn NewsSource>>) -> Self {
        let name = chain.iter().map(|s| s.name()).collect::<Vec<_>>().join("+");
        Self { chain, name }
    }
}

#[async_trait]
impl NewsSource for FallbackSource {
    async fn fetch(&self, search_terms: &[String], hours_back: u32) -> Result<Vec<NewsArticle>, FetchError> {
        let mut last_err = FetchError::NotConfigured("news source");
        for source in &self.chain {
            match source.fetch(search_terms, hours_back).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    tracing::warn!(target: "orchestrator", error = ?e, provider = source.name(), "source failed, trying next");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
