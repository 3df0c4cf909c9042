use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const CACHE_HITS: &str = "news_cache_hits_total";
pub const CACHE_MISSES: &str = "news_cache_misses_total";
pub const FETCH_ERRORS: &str = "news_fetch_errors_total";
pub const INGEST_NEW: &str = "ingest_new_articles_total";
pub const INGEST_DUPLICATES: &str = "ingest_duplicates_total";
pub const ANALYSIS_PROCESSED: &str = "analysis_processed_total";
pub const ANALYSIS_ERRORS: &str = "analysis_errors_total";
pub const SERVE_LATENCY_MS: &str = "serve_latency_ms";
pub const RSS_PARSE_MS: &str = "rss_parse_ms";
pub const PIPELINE_LAST_RUN_TS: &str = "pipeline_last_run_ts";
pub const CACHE_TTL_SECS: &str = "news_cache_ttl_seconds";

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(CACHE_HITS, "Query cache lookups served from a valid entry.");
        describe_counter!(CACHE_MISSES, "Query cache lookups that fell through to a news source.");
        describe_counter!(FETCH_ERRORS, "News source failures and timeouts.");
        describe_counter!(INGEST_NEW, "Articles inserted into raw_articles.");
        describe_counter!(INGEST_DUPLICATES, "Fetched articles whose URL was already stored.");
        describe_counter!(ANALYSIS_PROCESSED, "Rows marked done by the analysis cycle.");
        describe_counter!(ANALYSIS_ERRORS, "Rows marked failed by the analysis cycle.");
        describe_histogram!(SERVE_LATENCY_MS, "Fast-serve query latency in milliseconds.");
        describe_histogram!(RSS_PARSE_MS, "RSS feed parse time in milliseconds.");
        describe_gauge!(PIPELINE_LAST_RUN_TS, "Unix ts when a pipeline job last ran, by job.");
        describe_gauge!(CACHE_TTL_SECS, "Configured query cache TTL in seconds.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Fails if another recorder is already global.
    pub fn init(cache_ttl_secs: u64) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_metrics_described();
        gauge!(CACHE_TTL_SECS).set(cache_ttl_secs as f64);
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
