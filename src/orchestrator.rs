//! Cache-first, portfolio-aware news fetch.
//!
//! For every token of every requested category: hash its search terms, serve
//! from the query cache when valid, otherwise call the news source under a
//! timeout and cache the result. Concurrent misses for the same hash are
//! collapsed so only one upstream call is made.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::error::FetchError;
use crate::ingest::types::{NewsArticle, NewsSource};
use crate::metrics::{ensure_metrics_described, CACHE_HITS, CACHE_MISSES, FETCH_ERRORS};
use crate::store::{query_hash, CachedQuery, NewsCache};
use crate::temporal;
use crate::tokens::{PortfolioToken, TokenCategory, TokenResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioNewsRequest {
    pub include_alpha: bool,
    pub include_opportunity: bool,
    pub include_personal: bool,
    pub hours_back: u32,
    pub max_articles_per_category: usize,
}

impl Default for PortfolioNewsRequest {
    fn default() -> Self {
        Self {
            include_alpha: true,
            include_opportunity: true,
            include_personal: true,
            hours_back: 24,
            max_articles_per_category: 10,
        }
    }
}

impl PortfolioNewsRequest {
    /// `hours_back` narrowed to [`temporal::MAX_HOURS_BACK`].
    pub fn window_hours(&self) -> u32 {
        self.hours_back.min(temporal::MAX_HOURS_BACK)
    }

    fn categories(&self) -> Vec<TokenCategory> {
        let mut out = Vec::with_capacity(3);
        if self.include_alpha {
            out.push(TokenCategory::AlphaPortfolio);
        }
        if self.include_opportunity {
            out.push(TokenCategory::Opportunity);
        }
        if self.include_personal {
            out.push(TokenCategory::Personal);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsMetadata {
    pub total_articles: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub categories_searched: Vec<TokenCategory>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioNews {
    pub categories: BTreeMap<TokenCategory, Vec<NewsArticle>>,
    pub metadata: NewsMetadata,
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub cache_ttl: chrono::Duration,
    pub fetch_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: chrono::Duration::hours(24),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Hit,
    Miss,
}

pub struct NewsOrchestrator {
    cache: NewsCache,
    source: Arc<dyn NewsSource>,
    resolver: Arc<TokenResolver>,
    clock: SharedClock,
    cfg: OrchestratorConfig,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl NewsOrchestrator {
    pub fn new(
        cache: NewsCache,
        source: Arc<dyn NewsSource>,
        resolver: Arc<TokenResolver>,
        clock: SharedClock,
        cfg: OrchestratorConfig,
    ) -> Self {
        ensure_metrics_described();
        Self {
            cache,
            source,
            resolver,
            clock,
            cfg,
            inflight: DashMap::new(),
        }
    }

    pub async fn get_portfolio_aware_news(&self, req: &PortfolioNewsRequest) -> PortfolioNews {
        let started = self.clock.now();
        let categories_searched = req.categories();
        let hours_back = req.window_hours();
        let mut categories = BTreeMap::new();
        let (mut hits, mut misses) = (0usize, 0usize);

        for category in &categories_searched {
            let tokens = self.resolver.tokens_for(*category).await;
            let per_token = join_all(
                tokens
                    .iter()
                    .map(|t| self.fetch_for_token(t, *category, hours_back, req.max_articles_per_category)),
            )
            .await;

            let mut merged = Vec::new();
            for (articles, lookup) in per_token {
                match lookup {
                    Lookup::Hit => hits += 1,
                    Lookup::Miss => misses += 1,
                }
                merged.extend(articles);
            }
            merged.sort_by(|a, b| cmp_hours_ago(a.hours_ago(), b.hours_ago()));
            merged.truncate(req.max_articles_per_category.saturating_mul(tokens.len()));

            debug!(target: "orchestrator", category = category.as_str(), tokens = tokens.len(), articles = merged.len(), "category resolved");
            categories.insert(*category, merged);
        }

        let total_articles = categories.values().map(Vec::len).sum();
        info!(target: "orchestrator", total_articles, cache_hits = hits, cache_misses = misses, "portfolio news assembled");

        PortfolioNews {
            categories,
            metadata: NewsMetadata {
                total_articles,
                cache_hits: hits,
                cache_misses: misses,
                categories_searched,
                timestamp: started,
            },
        }
    }

    async fn fetch_for_token(
        &self,
        token: &PortfolioToken,
        category: TokenCategory,
        hours_back: u32,
        max_articles: usize,
    ) -> (Vec<NewsArticle>, Lookup) {
        let hash = query_hash(&token.search_terms, hours_back);
        let (articles, lookup) = self.cached_or_fetch(&hash, token, hours_back).await;

        let now = self.clock.now();
        let tagged = articles
            .into_iter()
            .take(max_articles)
            .map(|mut a| {
                a.symbol = Some(token.symbol.clone());
                a.category = Some(category);
                temporal::enhance_in_place(&mut a, now);
                a
            })
            .collect();
        (tagged, lookup)
    }

    async fn cached_or_fetch(&self, hash: &str, token: &PortfolioToken, hours_back: u32) -> (Vec<NewsArticle>, Lookup) {
        if let Some(hit) = self.lookup(hash).await {
            return (hit, Lookup::Hit);
        }

        let lock = self.inflight.entry(hash.to_string()).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            // Another task may have filled the entry while we waited.
            match self.lookup(hash).await {
                Some(hit) => (hit, Lookup::Hit),
                None => (self.fetch_and_store(hash, token, hours_back).await, Lookup::Miss),
            }
        };
        // Map entry plus our clone: nobody else is waiting on this hash.
        self.inflight.remove_if(hash, |_, m| Arc::strong_count(m) <= 2);
        result
    }

    async fn lookup(&self, hash: &str) -> Option<Vec<NewsArticle>> {
        match self.cache.get(hash, self.clock.now()).await {
            Ok(Some(cached)) => {
                counter!(CACHE_HITS).increment(1);
                Some(cached.articles)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(target: "orchestrator", error = ?e, "cache read failed, treating as miss");
                None
            }
        }
    }

    async fn fetch_and_store(&self, hash: &str, token: &PortfolioToken, hours_back: u32) -> Vec<NewsArticle> {
        counter!(CACHE_MISSES).increment(1);
        let fetched = tokio::time::timeout(
            self.cfg.fetch_timeout,
            self.source.fetch(&token.search_terms, hours_back),
        )
        .await;

        let articles = match fetched {
            Ok(Ok(articles)) => articles,
            Ok(Err(e)) => {
                counter!(FETCH_ERRORS).increment(1);
                warn!(target: "orchestrator", error = ?e, symbol = %token.symbol, source = self.source.name(), "news fetch failed");
                return Vec::new();
            }
            Err(_) => {
                counter!(FETCH_ERRORS).increment(1);
                let e = FetchError::Timeout {
                    provider: self.source.name().to_string(),
                    secs: self.cfg.fetch_timeout.as_secs(),
                };
                warn!(target: "orchestrator", error = %e, symbol = %token.symbol, "news fetch timed out");
                return Vec::new();
            }
        };

        let entry = CachedQuery::new(
            token.search_terms.clone(),
            hours_back,
            articles,
            self.clock.now(),
            self.cfg.cache_ttl,
        );
        debug_assert_eq!(entry.query_hash, hash);
        if let Err(e) = self.cache.put(&entry).await {
            warn!(target: "orchestrator", error = ?e, symbol = %token.symbol, "could not cache fetched articles");
        }
        entry.articles
    }
}

/// Ascending by age; articles without a usable timestamp go last.
fn cmp_hours_ago(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
