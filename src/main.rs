//! Alpha news cache service: binary entrypoint.
//! Boots the Axum HTTP server, the metrics exporter and the pipeline scheduler.

use alpha_news_cache::{
    clock::system_clock, config::AppConfig, ingest::scheduler::spawn_pipeline_scheduler, metrics::Metrics,
    router, Services,
};
use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `RUST_LOG` wins; otherwise info for this crate and warn for dependencies.
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("alpha_news_cache=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    // Shuttle may already have installed a subscriber.
    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        eprintln!("tracing subscriber already set; keeping the existing one");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load().context("loading configuration")?;
    let scheduler_cfg = cfg.scheduler;
    let ttl_secs = u64::try_from(cfg.cache.ttl_hours).unwrap_or(24) * 3600;

    let services = Services::build(cfg, system_clock()).await?;

    let mut app = router(services.clone());
    match Metrics::init(ttl_secs) {
        Ok(m) => app = app.merge(m.router()),
        Err(e) => warn!(error = ?e, "prometheus recorder not installed; /metrics disabled"),
    }

    if scheduler_cfg.enabled {
        let handles = spawn_pipeline_scheduler(
            scheduler_cfg,
            services.pipeline.clone(),
            services.cache.clone(),
            services.clock.clone(),
        );
        info!(tasks = handles.len(), "pipeline scheduler started");
    }

    Ok(app.into())
}
