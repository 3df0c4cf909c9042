//! Low-latency read path over already-enriched rows.
//!
//! Never touches a network collaborator and never fails: store trouble shows
//! up as an empty page plus a warning.

use std::collections::BTreeMap;
use std::time::Instant;

use metrics::histogram;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::Sentiment;
use crate::clock::SharedClock;
use crate::ingest::types::NewsArticle;
use crate::metrics::{ensure_metrics_described, SERVE_LATENCY_MS};
use crate::store::ArticleStore;
use crate::temporal;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServeInsights {
    pub breaking_news_count: usize,
    /// Counts per sentiment label over the returned page.
    pub sentiment_distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizedNews {
    pub articles: Vec<NewsArticle>,
    pub count: usize,
    pub insights: ServeInsights,
}

#[derive(Clone)]
pub struct FastServe {
    articles: ArticleStore,
    clock: SharedClock,
}

impl FastServe {
    pub fn new(articles: ArticleStore, clock: SharedClock) -> Self {
        ensure_metrics_described();
        Self { articles, clock }
    }

    /// Newest-first page of processed rows published within `hours_back`.
    ///
    /// `crypto_symbols` filters the fetched page (exact match), so the result
    /// may hold fewer than `limit` articles.
    pub async fn get_optimized_news(
        &self,
        limit: u32,
        hours_back: u32,
        crypto_symbols: Option<&[String]>,
    ) -> OptimizedNews {
        let t0 = Instant::now();
        let now = self.clock.now();
        let cutoff = temporal::window_start(now, hours_back);

        let rows = match self.articles.fetch_processed_since(cutoff, limit).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(target: "serve", error = ?e, "store unavailable, serving empty page");
                histogram!(SERVE_LATENCY_MS).record(t0.elapsed().as_secs_f64() * 1_000.0);
                return OptimizedNews::default();
            }
        };

        let articles: Vec<NewsArticle> = rows
            .iter()
            .filter(|r| crypto_symbols.map_or(true, |syms| syms.iter().any(|s| s == &r.crypto_symbol)))
            .map(|r| {
                let mut a = r.to_news_article();
                temporal::enhance_in_place(&mut a, now);
                a
            })
            .collect();

        let insights = insights_for(&articles);
        histogram!(SERVE_LATENCY_MS).record(t0.elapsed().as_secs_f64() * 1_000.0);
        debug!(target: "serve", fetched = rows.len(), returned = articles.len(), "optimized news served");

        OptimizedNews {
            count: articles.len(),
            articles,
            insights,
        }
    }
}

fn insights_for(articles: &[NewsArticle]) -> ServeInsights {
    let mut dist: BTreeMap<String, usize> = [Sentiment::Bullish, Sentiment::Bearish, Sentiment::Neutral]
        .into_iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    for a in articles {
        if let Some(label) = a.raw.get("sentiment").and_then(|v| v.as_str()) {
            *dist.entry(label.to_ascii_lowercase()).or_default() += 1;
        }
    }
    ServeInsights {
        breaking_news_count: articles
            .iter()
            .filter(|a| a.temporal.is_some_and(|t| t.is_breaking))
            .count(),
        sentiment_distribution: dist,
    }
}
