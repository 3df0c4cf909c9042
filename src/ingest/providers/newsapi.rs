use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{http_client, or_query, status_error};
use crate::clock::SharedClock;
use crate::error::FetchError;
use crate::ingest::types::{NewsArticle, NewsSource};
use crate::temporal;

pub const DEFAULT_BASE_URL: &str = "https://newsapi.org/v2/everything";

#[derive(Debug, Deserialize)]
struct Resp {
    #[serde(default)]
    articles: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
    source: Option<ItemSource>,
}

#[derive(Debug, Deserialize)]
struct ItemSource {
    name: Option<String>,
}

/// newsapi.org `/v2/everything` client.
pub struct NewsApiSource {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    page_size: u32,
    clock: SharedClock,
}

impl NewsApiSource {
    pub fn new(api_key: impl Into<String>, timeout: Duration, clock: SharedClock) -> Result<Self, FetchError> {
        Ok(Self {
            http: http_client(timeout)?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: 20,
            clock,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_page_size(mut self, n: u32) -> Self {
        self.page_size = n.clamp(1, 100);
        self
    }

    pub(crate) fn parse_body(body: &str) -> Result<Vec<NewsArticle>, FetchError> {
        let resp: Resp = serde_json::from_str(body).map_err(|e| FetchError::Parse(format!("newsapi: {e}")))?;
        Ok(resp
            .articles
            .into_iter()
            .filter_map(|it| {
                let url = it.url.filter(|u| !u.is_empty())?;
                let raw = serde_json::json!({
                    "provider": "newsapi",
                    "description": it.description.clone(),
                });
                Some(NewsArticle {
                    title: it.title.unwrap_or_default(),
                    content: it.content.or(it.description).unwrap_or_default(),
                    url,
                    source_name: it.source.and_then(|s| s.name).unwrap_or_default(),
                    published_at: it.published_at,
                    raw,
                    ..Default::default()
                })
            })
            .collect())
    }
}

#[async_trait]
impl NewsSource for NewsApiSource {
    async fn fetch(&self, search_terms: &[String], hours_back: u32) -> Result<Vec<NewsArticle>, FetchError> {
        let from = temporal::window_start(self.clock.now(), hours_back);
        let resp = self
            .http
            .get(&self.base_url)
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", or_query(search_terms)),
                ("from", from.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
                ("sortBy", "publishedAt".to_string()),
                ("language", "en".to_string()),
                ("pageSize", self.page_size.to_string()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(status_error(self.name(), resp.status()));
        }
        let body = resp.text().await?;
        Self::parse_body(&body)
    }

    fn name(&self) -> &str {
        "newsapi"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_everything_response() {
        let body = r#"{
            "status": "ok",
            "totalResults": 2,
            "articles": [
                {"source": {"id": null, "name": "CoinDesk"}, "title": "BTC breaks out",
                 "description": "short", "url": "https://cd/1",
                 "publishedAt": "2024-01-15T11:00:00Z", "content": "long body"},
                {"source": {"name": "Nowhere"}, "title": "no link", "url": null}
            ]
        }"#;
        let got = NewsApiSource::parse_body(body).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].source_name, "CoinDesk");
        assert_eq!(got[0].content, "long body");
        assert_eq!(got[0].published_at.as_deref(), Some("2024-01-15T11:00:00Z"));
        assert_eq!(got[0].raw["provider"], "newsapi");
    }

    #[test]
    fn garbage_body_is_parse_error() {
        assert!(matches!(NewsApiSource::parse_body("<html>"), Err(FetchError::Parse(_))));
    }
}
