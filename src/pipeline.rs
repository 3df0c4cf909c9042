//! Two-phase coordinator: fast collection into `raw_articles`, then slow
//! enrichment in batches. The phases share nothing but the store, so they can
//! run on independent schedules.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisPipeline, CycleReport};
use crate::ingest::{IngestReport, NewsIngestor};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub ingest: IngestReport,
    pub analysis: CycleReport,
}

#[derive(Clone)]
pub struct PipelineCoordinator {
    ingestor: Arc<NewsIngestor>,
    analysis: Arc<AnalysisPipeline>,
}

impl PipelineCoordinator {
    pub fn new(ingestor: Arc<NewsIngestor>, analysis: Arc<AnalysisPipeline>) -> Self {
        Self { ingestor, analysis }
    }

    /// Phase 1.
    pub async fn ingest(&self, hours_back: u32) -> IngestReport {
        self.ingestor.ingest(hours_back).await
    }

    /// Phase 2.
    pub async fn run_analysis_cycle(&self, batch_size: u32) -> CycleReport {
        self.analysis.run_analysis_cycle(batch_size).await
    }

    /// Both phases back to back.
    pub async fn run_once(&self, hours_back: u32, batch_size: u32) -> PipelineRun {
        let ingest = self.ingest(hours_back).await;
        let analysis = self.run_analysis_cycle(batch_size).await;
        PipelineRun { ingest, analysis }
    }
}
