use std::collections::HashMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;

use super::enricher::{EnrichedFields, Enricher, MarketImpact, Sentiment};
use crate::error::EnrichError;
use crate::store::RawArticle;

static LEXICON: Lazy<HashMap<&'static str, i32>> = Lazy::new(|| {
    [
        ("surge", 3),
        ("surges", 3),
        ("rally", 3),
        ("rallies", 3),
        ("soar", 3),
        ("soars", 3),
        ("record", 2),
        ("inflows", 2),
        ("approval", 2),
        ("approved", 2),
        ("adoption", 2),
        ("breakout", 2),
        ("gain", 1),
        ("gains", 1),
        ("upgrade", 1),
        ("bullish", 3),
        ("partnership", 1),
        ("crash", -3),
        ("crashes", -3),
        ("plunge", -3),
        ("plunges", -3),
        ("hack", -3),
        ("hacked", -3),
        ("exploit", -3),
        ("outage", -2),
        ("stalls", -2),
        ("lawsuit", -2),
        ("ban", -2),
        ("outflows", -2),
        ("fraud", -3),
        ("bearish", -3),
        ("selloff", -2),
        ("drop", -1),
        ("drops", -1),
        ("loss", -1),
        ("losses", -1),
    ]
    .into_iter()
    .collect()
});

/// Words that push an article into the high-impact bucket regardless of tone.
const HIGH_IMPACT: &[&str] = &["etf", "sec", "hack", "exploit", "halving", "ban", "lawsuit", "outage", "fed"];

/// Offline keyword sentiment. Deterministic, no network.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconEnricher;

impl LexiconEnricher {
    /// Returns (score, token count). A negator in the previous 1..=3 tokens
    /// flips the sign of a lexicon hit.
    pub fn score_text(text: &str) -> (i32, usize) {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut score = 0;
        for i in 0..tokens.len() {
            let base = *LEXICON.get(tokens[i].as_str()).unwrap_or(&0);
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            score += if negated { -base } else { base };
        }
        (score, tokens.len())
    }
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not" | "no" | "never" | "isn't" | "wasn't" | "aren't" | "won't" | "can't" | "cannot" | "without"
    )
}

#[async_trait]
impl Enricher for LexiconEnricher {
    async fn enrich(&self, article: &RawArticle) -> Result<EnrichedFields, EnrichError> {
        let text = format!("{}. {}", article.title, article.content);
        let (score, n_tokens) = Self::score_text(&text);
        if n_tokens == 0 {
            return Err(EnrichError::EmptyInput);
        }

        let sentiment = match score {
            s if s >= 2 => Sentiment::Bullish,
            s if s <= -2 => Sentiment::Bearish,
            _ => Sentiment::Neutral,
        };
        let mentions_high = tokenize(&text).any(|t| HIGH_IMPACT.contains(&t.as_str()));
        let market_impact = if mentions_high || score.abs() >= 5 {
            MarketImpact::High
        } else if score.abs() >= 2 {
            MarketImpact::Medium
        } else {
            MarketImpact::Low
        };

        Ok(EnrichedFields {
            sentiment,
            sentiment_score: (f64::from(score) / 6.0).clamp(-1.0, 1.0),
            market_impact,
            summary: None,
            enriched_by: self.name().to_string(),
        })
    }

    fn name(&self) -> &str {
        "lexicon"
    }
}
