//! Collaborator seams for phase 2: turning a raw article into enrichment
//! fields, and persisting those fields into downstream knowledge stores.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EnrichError;
use crate::store::RawArticle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl Sentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Bullish => "bullish",
            Sentiment::Bearish => "bearish",
            Sentiment::Neutral => "neutral",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bullish" | "positive" => Some(Sentiment::Bullish),
            "bearish" | "negative" => Some(Sentiment::Bearish),
            "neutral" => Some(Sentiment::Neutral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketImpact {
    High,
    Medium,
    Low,
}

impl MarketImpact {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Some(MarketImpact::High),
            "medium" | "moderate" => Some(MarketImpact::Medium),
            "low" => Some(MarketImpact::Low),
            _ => None,
        }
    }
}

/// What an enricher adds to a row. Merged into `raw_data` on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedFields {
    pub sentiment: Sentiment,
    /// -1.0 (bearish) ..= 1.0 (bullish).
    pub sentiment_score: f64,
    pub market_impact: MarketImpact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub enriched_by: String,
}

impl EnrichedFields {
    /// Copy the fields into `raw`, turning a non-object payload into one.
    pub fn merge_into(&self, raw: &serde_json::Value) -> serde_json::Value {
        let mut obj = match raw {
            serde_json::Value::Object(m) => m.clone(),
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut m = serde_json::Map::new();
                m.insert("original".into(), other.clone());
                m
            }
        };
        obj.insert("sentiment".into(), self.sentiment.as_str().into());
        obj.insert("sentiment_score".into(), self.sentiment_score.into());
        obj.insert(
            "market_impact".into(),
            serde_json::to_value(self.market_impact).unwrap_or(serde_json::Value::Null),
        );
        if let Some(s) = &self.summary {
            obj.insert("summary".into(), s.clone().into());
        }
        obj.insert("enriched_by".into(), self.enriched_by.clone().into());
        serde_json::Value::Object(obj)
    }
}

#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, article: &RawArticle) -> Result<EnrichedFields, EnrichError>;
    fn name(&self) -> &str;
}

/// Used when no enrichment backend is configured. Every call fails, so rows
/// stay out of the served set instead of being marked done with made-up data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledEnricher;

#[async_trait]
impl Enricher for DisabledEnricher {
    async fn enrich(&self, _article: &RawArticle) -> Result<EnrichedFields, EnrichError> {
        Err(EnrichError::NotConfigured)
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// What a knowledge sink managed to persist for one article.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkReceipt {
    pub embedded: bool,
    pub stored_vector: bool,
    pub stored_graph: bool,
}

/// Downstream vector/graph persistence for enriched articles.
#[async_trait]
pub trait KnowledgeSink: Send + Sync {
    async fn store(&self, article: &RawArticle, fields: &EnrichedFields) -> Result<SinkReceipt, EnrichError>;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl KnowledgeSink for NoopSink {
    async fn store(&self, _article: &RawArticle, _fields: &EnrichedFields) -> Result<SinkReceipt, EnrichError> {
        Ok(SinkReceipt::default())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> EnrichedFields {
        EnrichedFields {
            sentiment: Sentiment::Bearish,
            sentiment_score: -0.5,
            market_impact: MarketImpact::High,
            summary: None,
            enriched_by: "lexicon".into(),
        }
    }

    #[test]
    fn merge_keeps_provider_payload() {
        let merged = fields().merge_into(&json!({"provider": "newsapi"}));
        assert_eq!(merged["provider"], "newsapi");
        assert_eq!(merged["sentiment"], "bearish");
        assert_eq!(merged["market_impact"], "high");
        assert!(merged.get("summary").is_none());
    }

    #[test]
    fn merge_wraps_scalar_payload() {
        let merged = fields().merge_into(&json!("plain"));
        assert_eq!(merged["original"], "plain");
        assert_eq!(fields().merge_into(&serde_json::Value::Null)["sentiment"], "bearish");
    }

    #[test]
    fn sentiment_labels_accept_synonyms() {
        assert_eq!(Sentiment::parse(" Positive "), Some(Sentiment::Bullish));
        assert_eq!(Sentiment::parse("meh"), None);
        assert_eq!(MarketImpact::parse("Moderate"), Some(MarketImpact::Medium));
    }
}
