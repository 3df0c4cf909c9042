use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, or_query, status_error};
use crate::error::FetchError;
use crate::ingest::types::{NewsArticle, NewsSource};

pub const DEFAULT_BASE_URL: &str = "https://api.tavily.com/search";

#[derive(Serialize)]
struct Req<'a> {
    api_key: &'a str,
    query: String,
    topic: &'a str,
    days: u32,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct Resp {
    #[serde(default)]
    results: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    url: Option<String>,
    content: Option<String>,
    published_date: Option<String>,
    score: Option<f64>,
}

/// Tavily news search. Its window is in whole days, so `hours_back` rounds up.
pub struct TavilySource {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_results: u32,
}

impl TavilySource {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            http: http_client(timeout)?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_results: 10,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub(crate) fn parse_body(body: &str) -> Result<Vec<NewsArticle>, FetchError> {
        let resp: Resp = serde_json::from_str(body).map_err(|e| FetchError::Parse(format!("tavily: {e}")))?;
        Ok(resp
            .results
            .into_iter()
            .filter_map(|it| {
                let url = it.url.filter(|u| !u.is_empty())?;
                let source_name = host_of(&url);
                Some(NewsArticle {
                    title: it.title.unwrap_or_default(),
                    content: it.content.unwrap_or_default(),
                    source_name,
                    published_at: it.published_date,
                    raw: serde_json::json!({ "provider": "tavily", "score": it.score }),
                    url,
                    ..Default::default()
                })
            })
            .collect())
    }
}

fn host_of(url: &str) -> String {
    url.split("://")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .map(|h| h.trim_start_matches("www.").to_string())
        .unwrap_or_default()
}

#[async_trait]
impl NewsSource for TavilySource {
    async fn fetch(&self, search_terms: &[String], hours_back: u32) -> Result<Vec<NewsArticle>, FetchError> {
        let req = Req {
            api_key: &self.api_key,
            query: format!("{} crypto news", or_query(search_terms)),
            topic: "news",
            days: hours_back.div_ceil(24).max(1),
            max_results: self.max_results,
        };
        let resp = self.http.post(&self.base_url).json(&req).send().await?;
        if !resp.status().is_success() {
            return Err(status_error(self.name(), resp.status()));
        }
        let body = resp.text().await?;
        Self::parse_body(&body)
    }

    fn name(&self) -> &str {
        "tavily"
    }
}
