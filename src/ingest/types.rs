// src/ingest/types.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::temporal::TemporalScore;
use crate::tokens::TokenCategory;

/// Article record as returned by news collaborators and served to consumers.
///
/// `published_at` stays a raw string: providers disagree on formats and the
/// temporal scorer decides per article whether it is usable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NewsArticle {
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub url: String,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<TokenCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_relevance_score: Option<f64>,
    /// Original provider payload plus enrichment fields, if any.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub raw: serde_json::Value,
}

impl NewsArticle {
    pub fn hours_ago(&self) -> Option<f64> {
        self.temporal.as_ref().map(|t| t.hours_ago)
    }
}

/// News-fetch collaborator. Must be safe to call again for the same terms.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch(
        &self,
        search_terms: &[String],
        hours_back: u32,
    ) -> Result<Vec<NewsArticle>, FetchError>;
    fn name(&self) -> &str;
}

/// Stand-in for a source that has no credentials configured.
///
/// Fails instead of returning an empty list so that nothing gets cached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNewsSource;

#[async_trait]
impl NewsSource for NullNewsSource {
    async fn fetch(&self, _terms: &[String], _hours_back: u32) -> Result<Vec<NewsArticle>, FetchError> {
        Err(FetchError::NotConfigured("news source"))
    }

    fn name(&self) -> &str {
        "null"
    }
}
