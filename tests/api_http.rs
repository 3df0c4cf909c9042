// tests/api_http.rs
//
// HTTP-level tests for the public Router without opening sockets, driven via
// tower::ServiceExt::oneshot.

mod common;

use http::{Request, StatusCode};
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    Router,
};
use tower::ServiceExt as _;

use alpha_news_cache::router;
use common::{harness, Harness};

const BODY_LIMIT: usize = 1024 * 1024;

async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

async fn call_json(app: Router, method: &str, uri: &str) -> (StatusCode, Json) {
    let (status, bytes) = call(app, method, uri).await;
    let v = serde_json::from_slice(&bytes).unwrap_or_else(|e| panic!("{uri}: invalid json ({e})"));
    (status, v)
}

fn app(h: &Harness) -> Router {
    router(h.services.clone())
}

#[tokio::test]
async fn health_is_ok() {
    let h = harness().await;
    let (status, body) = call(app(&h), "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap(), "ok");
}

#[tokio::test]
async fn optimized_news_applies_query_params() {
    let h = harness().await;
    h.services.pipeline.run_once(24, 50).await;

    let (status, v) = call_json(app(&h), "GET", "/news/optimized").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["count"], 7);
    assert!(v["insights"]["sentiment_distribution"].get("neutral").is_some());

    let (_, v) = call_json(app(&h), "GET", "/news/optimized?limit=2").await;
    assert_eq!(v["articles"].as_array().unwrap().len(), 2);

    let (_, v) = call_json(app(&h), "GET", "/news/optimized?symbols=btc,%20eth").await;
    assert_eq!(v["count"], 2);

    let first = &v["articles"][0];
    assert!(first["temporal"]["hours_ago"].as_f64().is_some());
    assert_eq!(first["temporal"]["time_category"], "breaking");
}

#[tokio::test]
async fn huge_hours_back_is_clamped_not_fatal() {
    let h = harness().await;
    h.services.pipeline.run_once(24, 50).await;

    let (status, v) = call_json(app(&h), "GET", "/news/optimized?hours_back=4294967295").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["count"], 7);

    let (status, v) = call_json(
        app(&h),
        "GET",
        "/news/portfolio?include_opportunity=false&include_personal=false&hours_back=4294967295",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["metadata"]["cache_misses"], 3);
}

#[tokio::test]
async fn portfolio_news_uses_request_defaults() {
    let h = harness().await;

    let (status, v) = call_json(app(&h), "GET", "/news/portfolio?include_opportunity=false&max_articles_per_category=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["categories"]["alpha_portfolio"].as_array().unwrap().len(), 3);
    assert!(v["categories"].get("opportunity").is_none());
    assert_eq!(v["metadata"]["cache_misses"], 3);
    assert_eq!(h.source.calls(), 3);

    let (_, v) = call_json(app(&h), "GET", "/news/portfolio?include_opportunity=false").await;
    assert_eq!(v["metadata"]["cache_hits"], 3);
    assert_eq!(h.source.calls(), 3);
}

#[tokio::test]
async fn cache_stats_and_sweep() {
    let h = harness().await;
    call_json(app(&h), "GET", "/news/portfolio?include_opportunity=false").await;

    let (status, v) = call_json(app(&h), "GET", "/cache/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["total"], 3);
    assert_eq!(v["active"], 3);
    assert!(v["top_5_by_hits"].is_array());

    h.clock.advance(chrono::Duration::hours(25));
    let (status, v) = call_json(app(&h), "POST", "/admin/cache/sweep").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["swept"], 3);

    let (_, v) = call_json(app(&h), "GET", "/cache/stats").await;
    assert_eq!(v["total"], 0);
}

#[tokio::test]
async fn cache_stats_reports_store_outage() {
    let h = harness().await;
    h.services.db.close().await;

    let (status, v) = call_json(app(&h), "GET", "/cache/stats").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(v["error"].as_str().unwrap().starts_with("database error"));
}

#[tokio::test]
async fn unknown_route_is_404() {
    let h = harness().await;
    let (status, _) = call(app(&h), "GET", "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
