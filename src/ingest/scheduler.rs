// src/ingest/scheduler.rs
use std::time::Duration;

use metrics::gauge;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clock::SharedClock;
use crate::metrics::PIPELINE_LAST_RUN_TS;
use crate::pipeline::PipelineCoordinator;
use crate::store::NewsCache;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerCfg {
    pub enabled: bool,
    pub ingest_interval_secs: u64,
    pub analysis_interval_secs: u64,
    pub sweep_interval_secs: u64,
    pub hours_back: u32,
    pub batch_size: u32,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            ingest_interval_secs: 15 * 60,
            analysis_interval_secs: 5 * 60,
            sweep_interval_secs: 60 * 60,
            hours_back: 24,
            batch_size: 10,
        }
    }
}

fn every(secs: u64) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker
}

/// Spawn the ingest, analysis and cache-sweep loops. Each loop runs its first
/// tick immediately.
pub fn spawn_pipeline_scheduler(
    cfg: SchedulerCfg,
    pipeline: PipelineCoordinator,
    cache: NewsCache,
    clock: SharedClock,
) -> Vec<JoinHandle<()>> {
    let ingest = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            let mut ticker = every(cfg.ingest_interval_secs);
            loop {
                ticker.tick().await;
                let report = pipeline.ingest(cfg.hours_back).await;
                info!(target: "ingest", total_new = report.total_new, errors = report.errors, "scheduled ingest tick");
            }
        })
    };

    let analysis = tokio::spawn(async move {
        let mut ticker = every(cfg.analysis_interval_secs);
        loop {
            ticker.tick().await;
            let report = pipeline.run_analysis_cycle(cfg.batch_size).await;
            info!(target: "analysis", enriched = report.total_enriched, errors = report.total_errors, "scheduled analysis tick");
        }
    });

    let sweep = tokio::spawn(async move {
        let mut ticker = every(cfg.sweep_interval_secs);
        loop {
            ticker.tick().await;
            let now = clock.now();
            match cache.sweep_expired(now).await {
                Ok(n) => info!(target: "cache", swept = n, "scheduled cache sweep"),
                Err(e) => warn!(target: "cache", error = ?e, "cache sweep failed"),
            }
            gauge!(PIPELINE_LAST_RUN_TS, "job" => "sweep").set(now.timestamp() as f64);
        }
    });

    vec![ingest, analysis, sweep]
}
