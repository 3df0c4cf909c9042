// tests/pipeline.rs
//
// Two-phase flow: ingest lands rows once per URL, analysis drains them in
// batches and marks each row done or failed independently.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alpha_news_cache::analysis::{
    AnalysisConfig, AnalysisPipeline, EnrichedFields, Enricher, KnowledgeSink, MarketImpact, RateLimit, Sentiment,
    SinkReceipt,
};
use alpha_news_cache::store::{Database, FailedRowPolicy, NewRawArticle, RawArticle};
use alpha_news_cache::{EnrichError, ManualClock};
use async_trait::async_trait;
use common::{harness, t0};
use tokio::time::Instant;

#[tokio::test]
async fn ingest_is_idempotent_per_url() {
    let h = harness().await;

    let first = h.services.pipeline.ingest(24).await;
    // 3 alpha + 4 opportunity symbols, one article each
    assert_eq!(first.total_new, 7);
    assert_eq!(first.by_source["fake"], 7);
    assert_eq!(first.errors, 0);

    let second = h.services.pipeline.ingest(24).await;
    assert_eq!(second.total_new, 0);
    assert_eq!(second.duplicates, 7);

    let counts = h.services.db.articles().count_by_status().await.unwrap();
    assert_eq!(counts.pending, 7);
}

#[tokio::test]
async fn ingest_counts_source_errors_without_aborting() {
    let h = harness().await;
    h.source.fail.store(true, Ordering::SeqCst);
    let report = h.services.pipeline.ingest(24).await;
    assert_eq!(report.total_new, 0);
    assert_eq!(report.errors, 7);
    assert_eq!(report.by_source["fake"], 0);
}

#[tokio::test]
async fn analysis_cycle_processes_everything_ingested() {
    let h = harness().await;
    h.services.pipeline.ingest(24).await;

    let report = h.services.pipeline.run_analysis_cycle(3).await;
    assert_eq!(report.total_processed, 7);
    assert_eq!(report.total_enriched, 7);
    assert_eq!(report.total_errors, 0);
    // 3 + 3 + 1
    assert_eq!(report.batches_processed, 3);

    let counts = h.services.db.articles().count_by_status().await.unwrap();
    assert_eq!((counts.pending, counts.done, counts.failed), (0, 7, 0));

    let again = h.services.pipeline.run_analysis_cycle(3).await;
    assert_eq!(again.total_processed, 0);
    assert_eq!(again.batches_processed, 0);
}

/// Fails for every URL containing "bad"; otherwise bullish.
struct Picky {
    calls: AtomicUsize,
}

#[async_trait]
impl Enricher for Picky {
    async fn enrich(&self, article: &RawArticle) -> Result<EnrichedFields, EnrichError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if article.url.contains("bad") {
            return Err(EnrichError::InvalidResponse("nope".into()));
        }
        Ok(EnrichedFields {
            sentiment: Sentiment::Bullish,
            sentiment_score: 0.8,
            market_impact: MarketImpact::Medium,
            summary: Some("up".into()),
            enriched_by: "picky".into(),
        })
    }

    fn name(&self) -> &str {
        "picky"
    }
}

struct CountingSink;

#[async_trait]
impl KnowledgeSink for CountingSink {
    async fn store(&self, _a: &RawArticle, _f: &EnrichedFields) -> Result<SinkReceipt, EnrichError> {
        Ok(SinkReceipt {
            embedded: true,
            stored_vector: true,
            stored_graph: false,
        })
    }

    fn name(&self) -> &str {
        "counting"
    }
}

fn raw(url: &str, hours_old: i64) -> NewRawArticle {
    NewRawArticle {
        source: "fake".into(),
        crypto_symbol: "BTC".into(),
        title: format!("title {url}"),
        content: String::new(),
        url: url.into(),
        source_name: String::new(),
        published_at: Some(t0() - chrono::Duration::hours(hours_old)),
        collected_at: t0(),
        raw_data: serde_json::json!({ "provider": "fake" }),
    }
}

async fn seeded(policy: FailedRowPolicy) -> (Database, AnalysisPipeline, Arc<Picky>) {
    let db = Database::in_memory().await.unwrap();
    let store = db.articles();
    for (url, h) in [("https://ok/1", 1), ("https://bad/2", 2), ("https://ok/3", 3), ("https://ok/4", 4)] {
        store.insert_if_new(&raw(url, h)).await.unwrap();
    }
    let enricher = Arc::new(Picky { calls: AtomicUsize::new(0) });
    let pipeline = AnalysisPipeline::new(
        db.articles(),
        enricher.clone(),
        Arc::new(CountingSink),
        Arc::new(ManualClock::new(t0())),
        AnalysisConfig {
            rate_limit: RateLimit::None,
            failed_rows: policy,
        },
    );
    (db, pipeline, enricher)
}

#[tokio::test]
async fn one_failure_does_not_abort_the_batch() {
    let (db, pipeline, _) = seeded(FailedRowPolicy::Skip).await;

    let report = pipeline.run_analysis_cycle(10).await;
    assert_eq!(report.batches_processed, 1);
    assert_eq!(report.total_processed, 4);
    assert_eq!(report.total_enriched, 3);
    assert_eq!(report.total_errors, 1);
    assert_eq!(report.total_embedded, 3);
    assert_eq!(report.total_stored_vector, 3);
    assert_eq!(report.total_stored_graph, 0);

    let store = db.articles();
    let bad = store.find_by_url("https://bad/2").await.unwrap().unwrap();
    assert!(!bad.processed());
    assert_eq!(bad.last_error.as_deref(), Some("invalid enrichment response: nope"));

    let ok = store.find_by_url("https://ok/1").await.unwrap().unwrap();
    assert!(ok.processed());
    assert_eq!(ok.raw_data["provider"], "fake");
    assert_eq!(ok.raw_data["sentiment"], "bullish");
    assert_eq!(ok.raw_data["summary"], "up");
}

#[tokio::test]
async fn skip_policy_never_reselects_failed_rows() {
    let (_db, pipeline, enricher) = seeded(FailedRowPolicy::Skip).await;
    pipeline.run_analysis_cycle(10).await;
    let report = pipeline.run_analysis_cycle(10).await;
    assert_eq!(report.total_processed, 0);
    assert_eq!(enricher.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn retry_policy_stops_after_max_attempts() {
    let (_db, pipeline, enricher) = seeded(FailedRowPolicy::Retry { max_attempts: 3 }).await;

    // Batches of 2: the failing row keeps coming back until its attempts run out.
    let report = pipeline.run_analysis_cycle(2).await;
    assert_eq!(report.total_enriched, 3);
    assert_eq!(report.total_errors, 3);
    assert_eq!(enricher.calls.load(Ordering::SeqCst), 6);

    let again = pipeline.run_analysis_cycle(2).await;
    assert_eq!(again.total_processed, 0);
}

/// Records when each row reached the enricher.
struct Stamped {
    seen: Mutex<Vec<Instant>>,
}

#[async_trait]
impl Enricher for Stamped {
    async fn enrich(&self, _article: &RawArticle) -> Result<EnrichedFields, EnrichError> {
        self.seen.lock().unwrap().push(Instant::now());
        Ok(EnrichedFields {
            sentiment: Sentiment::Neutral,
            sentiment_score: 0.0,
            market_impact: MarketImpact::Low,
            summary: None,
            enriched_by: "stamped".into(),
        })
    }

    fn name(&self) -> &str {
        "stamped"
    }
}

// Real tokio clock: with paused time the runtime may auto-advance past the
// sqlx acquire timeout while a query is on the sqlite worker thread.
#[tokio::test]
async fn fixed_delay_paces_rows_but_not_the_first() {
    const DELAY: Duration = Duration::from_millis(150);

    let db = Database::in_memory().await.unwrap();
    let store = db.articles();
    for (url, h) in [("https://r/1", 1), ("https://r/2", 2), ("https://r/3", 3)] {
        store.insert_if_new(&raw(url, h)).await.unwrap();
    }
    let enricher = Arc::new(Stamped { seen: Mutex::new(Vec::new()) });
    let pipeline = AnalysisPipeline::new(
        db.articles(),
        enricher.clone(),
        Arc::new(CountingSink),
        Arc::new(ManualClock::new(t0())),
        AnalysisConfig {
            rate_limit: RateLimit::FixedDelay(DELAY),
            failed_rows: FailedRowPolicy::Skip,
        },
    );

    let start = Instant::now();
    let report = pipeline.run_analysis_cycle(10).await;
    let elapsed = start.elapsed();
    assert_eq!(report.total_enriched, 3);

    let seen = enricher.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 3);
    assert!(seen[0] - start < DELAY, "first row waited {:?}", seen[0] - start);
    for w in seen.windows(2) {
        assert!(w[1] - w[0] >= DELAY, "rows {:?} apart", w[1] - w[0]);
    }
    assert!(elapsed >= DELAY * 2, "{elapsed:?}");
}
