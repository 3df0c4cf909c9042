// tests/common/mod.rs
//
// Shared fakes for integration tests: a controllable news source, a fixed
// clock and an in-memory service graph.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alpha_news_cache::analysis::{KnowledgeSink, LexiconEnricher, NoopSink};
use alpha_news_cache::config::AppConfig;
use alpha_news_cache::store::Database;
use alpha_news_cache::tokens::{Holding, NullPortfolio, PortfolioProvider, StaticPortfolio};
use alpha_news_cache::{Collaborators, FetchError, ManualClock, NewsArticle, NewsSource, Services};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
}

pub fn article(url: &str, title: &str, published: Option<DateTime<Utc>>) -> NewsArticle {
    NewsArticle {
        title: title.to_string(),
        content: format!("{title} body"),
        url: url.to_string(),
        source_name: "Fake Wire".to_string(),
        published_at: published.map(|t| t.to_rfc3339()),
        ..Default::default()
    }
}

/// Returns one article per search-term set, keyed on the first term, and
/// counts calls. Can be switched to fail or to stall.
pub struct FakeSource {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub delay: Option<Duration>,
    pub published: DateTime<Utc>,
    pub per_query: usize,
}

impl FakeSource {
    pub fn new(published: DateTime<Utc>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay: None,
            published,
            per_query: 1,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NewsSource for FakeSource {
    async fn fetch(&self, search_terms: &[String], hours_back: u32) -> Result<Vec<NewsArticle>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::Status {
                provider: "fake".into(),
                status: 503,
            });
        }
        let key = search_terms.first().cloned().unwrap_or_default();
        Ok((0..self.per_query)
            .map(|i| {
                article(
                    &format!("https://fake.example/{key}/{hours_back}/{i}"),
                    &format!("{key} rallies on record inflows #{i}"),
                    Some(self.published - chrono::Duration::hours(i as i64)),
                )
            })
            .collect())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.database_url = "sqlite::memory:".into();
    cfg.analysis.rate_limit_ms = 0;
    cfg.scheduler.enabled = false;
    cfg
}

pub struct Harness {
    pub services: Services,
    pub clock: Arc<ManualClock>,
    pub source: Arc<FakeSource>,
}

pub async fn harness_with(cfg: AppConfig, source: FakeSource, holdings: Vec<Holding>) -> Harness {
    let clock = Arc::new(ManualClock::new(t0()));
    let source = Arc::new(source);
    let db = Database::in_memory().await.expect("in-memory db");
    let portfolio: Arc<dyn PortfolioProvider> = if holdings.is_empty() {
        Arc::new(NullPortfolio)
    } else {
        Arc::new(StaticPortfolio::new(holdings))
    };
    let sink: Arc<dyn KnowledgeSink> = Arc::new(NoopSink);
    let collaborators = Collaborators {
        sources: vec![source.clone() as Arc<dyn NewsSource>],
        portfolio,
        enricher: Arc::new(LexiconEnricher),
        sink,
    };
    let services = Services::assemble(cfg, db, collaborators, clock.clone());
    Harness {
        services,
        clock,
        source,
    }
}

pub async fn harness() -> Harness {
    harness_with(test_config(), FakeSource::new(t0() - chrono::Duration::hours(1)), Vec::new()).await
}
