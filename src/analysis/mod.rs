//! Phase 2 of the pipeline: batched enrichment of collected rows.
//!
//! Each selected row is enriched independently. Success merges the enrichment
//! fields into `raw_data` and marks the row done; failure marks it failed and
//! is counted, never aborting the batch.

pub mod ai_adapter;
pub mod enricher;
pub mod lexicon;

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::metrics::{ensure_metrics_described, ANALYSIS_ERRORS, ANALYSIS_PROCESSED, PIPELINE_LAST_RUN_TS};
use crate::store::{ArticleStore, FailedRowPolicy, RawArticle};

pub use ai_adapter::OpenAiEnricher;
pub use enricher::{
    DisabledEnricher, EnrichedFields, Enricher, KnowledgeSink, MarketImpact, NoopSink, Sentiment, SinkReceipt,
};
pub use lexicon::LexiconEnricher;

/// Pause inserted between rows to stay under upstream rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimit {
    None,
    FixedDelay(Duration),
}

impl Default for RateLimit {
    fn default() -> Self {
        RateLimit::FixedDelay(Duration::from_millis(500))
    }
}

impl RateLimit {
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            RateLimit::None
        } else {
            RateLimit::FixedDelay(Duration::from_millis(ms))
        }
    }

    pub async fn pause(&self) {
        if let RateLimit::FixedDelay(d) = self {
            tokio::time::sleep(*d).await;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub batches_processed: usize,
    pub total_processed: usize,
    pub total_enriched: usize,
    pub total_embedded: usize,
    pub total_stored_vector: usize,
    pub total_stored_graph: usize,
    pub total_errors: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisConfig {
    pub rate_limit: RateLimit,
    pub failed_rows: FailedRowPolicy,
}

pub struct AnalysisPipeline {
    articles: ArticleStore,
    enricher: Arc<dyn Enricher>,
    sink: Arc<dyn KnowledgeSink>,
    clock: SharedClock,
    cfg: AnalysisConfig,
}

enum RowOutcome {
    Done(SinkReceipt),
    /// Enriched and marked done, but the sink rejected it.
    DoneSinkFailed,
    Failed,
}

impl AnalysisPipeline {
    pub fn new(
        articles: ArticleStore,
        enricher: Arc<dyn Enricher>,
        sink: Arc<dyn KnowledgeSink>,
        clock: SharedClock,
        cfg: AnalysisConfig,
    ) -> Self {
        ensure_metrics_described();
        Self {
            articles,
            enricher,
            sink,
            clock,
            cfg,
        }
    }

    pub fn enricher_name(&self) -> &str {
        self.enricher.name()
    }

    /// Drain selectable rows in batches of `batch_size`, newest first.
    ///
    /// Stops after a batch shorter than `batch_size`. With
    /// [`FailedRowPolicy::Retry`] a failing row can come back in a later batch
    /// of the same cycle until its attempts run out.
    pub async fn run_analysis_cycle(&self, batch_size: u32) -> CycleReport {
        let batch_size = batch_size.max(1);
        let mut report = CycleReport::default();
        let mut first_row = true;

        loop {
            let batch = match self.articles.fetch_selectable(batch_size, self.cfg.failed_rows).await {
                Ok(b) => b,
                Err(e) => {
                    warn!(target: "analysis", error = ?e, "could not select rows");
                    report.total_errors += 1;
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }
            let short = batch.len() < batch_size as usize;
            report.batches_processed += 1;

            for row in &batch {
                if !first_row {
                    self.cfg.rate_limit.pause().await;
                }
                first_row = false;

                report.total_processed += 1;
                match self.process_row(row).await {
                    RowOutcome::Done(receipt) => {
                        report.total_enriched += 1;
                        report.total_embedded += usize::from(receipt.embedded);
                        report.total_stored_vector += usize::from(receipt.stored_vector);
                        report.total_stored_graph += usize::from(receipt.stored_graph);
                    }
                    RowOutcome::DoneSinkFailed => {
                        report.total_enriched += 1;
                        report.total_errors += 1;
                    }
                    RowOutcome::Failed => report.total_errors += 1,
                }
            }
            debug!(target: "analysis", batch = report.batches_processed, rows = batch.len(), "batch done");

            if short {
                break;
            }
        }

        counter!(ANALYSIS_PROCESSED).increment(report.total_enriched as u64);
        counter!(ANALYSIS_ERRORS).increment(report.total_errors as u64);
        gauge!(PIPELINE_LAST_RUN_TS, "job" => "analysis").set(self.clock.now().timestamp() as f64);
        info!(
            target: "analysis",
            enricher = self.enricher.name(),
            batches = report.batches_processed,
            processed = report.total_processed,
            enriched = report.total_enriched,
            errors = report.total_errors,
            "analysis cycle finished"
        );
        report
    }

    async fn process_row(&self, row: &RawArticle) -> RowOutcome {
        let fields = match self.enricher.enrich(row).await {
            Ok(f) => f,
            Err(e) => {
                warn!(target: "analysis", id = row.id, error = %e, enricher = self.enricher.name(), "enrichment failed");
                if let Err(se) = self.articles.mark_failed(row.id, &e.to_string(), self.clock.now()).await {
                    warn!(target: "analysis", id = row.id, error = ?se, "could not mark row failed");
                }
                return RowOutcome::Failed;
            }
        };

        let merged = fields.merge_into(&row.raw_data);
        if let Err(e) = self.articles.mark_done(row.id, &merged, self.clock.now()).await {
            warn!(target: "analysis", id = row.id, error = ?e, "could not mark row done");
            return RowOutcome::Failed;
        }

        match self.sink.store(row, &fields).await {
            Ok(receipt) => RowOutcome::Done(receipt),
            Err(e) => {
                warn!(target: "analysis", id = row.id, error = %e, sink = self.sink.name(), "knowledge sink failed");
                RowOutcome::DoneSinkFailed
            }
        }
    }
}
