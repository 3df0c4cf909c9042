use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::bootstrap::Services;
use crate::orchestrator::{PortfolioNews, PortfolioNewsRequest};
use crate::serve::OptimizedNews;
use crate::store::CacheStats;

pub fn router(services: Services) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/news/optimized", get(optimized_news))
        .route("/news/portfolio", get(portfolio_news))
        .route("/cache/stats", get(cache_stats))
        .route("/admin/cache/sweep", post(sweep_cache))
        .layer(CorsLayer::very_permissive())
        .with_state(services)
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn unavailable(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
}

#[derive(Debug, Default, Deserialize)]
struct OptimizedQuery {
    limit: Option<u32>,
    hours_back: Option<u32>,
    /// Comma-separated, e.g. `BTC,ETH`.
    symbols: Option<String>,
}

async fn optimized_news(State(s): State<Services>, Query(q): Query<OptimizedQuery>) -> Json<OptimizedNews> {
    let serve_cfg = s.cfg.serve;
    let limit = q.limit.unwrap_or(serve_cfg.default_limit).clamp(1, serve_cfg.max_limit);
    let hours_back = q
        .hours_back
        .unwrap_or(serve_cfg.default_hours_back)
        .min(serve_cfg.max_hours_back);
    let symbols: Option<Vec<String>> = q.symbols.map(|raw| {
        raw.split(',')
            .map(|t| t.trim().to_ascii_uppercase())
            .filter(|t| !t.is_empty())
            .collect()
    });

    Json(s.serve.get_optimized_news(limit, hours_back, symbols.as_deref()).await)
}

async fn portfolio_news(State(s): State<Services>, Query(req): Query<PortfolioNewsRequest>) -> Json<PortfolioNews> {
    Json(s.orchestrator.get_portfolio_aware_news(&req).await)
}

async fn cache_stats(State(s): State<Services>) -> Result<Json<CacheStats>, ApiError> {
    s.cache.stats(s.clock.now()).await.map(Json).map_err(|e| {
        warn!(target: "cache", error = ?e, "stats unavailable");
        unavailable(e)
    })
}

#[derive(Debug, Serialize)]
struct SweepResp {
    swept: u64,
}

async fn sweep_cache(State(s): State<Services>) -> Result<Json<SweepResp>, ApiError> {
    let swept = s.cache.sweep_expired(s.clock.now()).await.map_err(unavailable)?;
    Ok(Json(SweepResp { swept }))
}
