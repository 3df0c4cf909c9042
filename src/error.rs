//! Error types shared across the cache, pipeline and serve layers.
//!
//! Library code returns these typed errors; configuration loading and the
//! binary use `anyhow` on top of them.

use thiserror::Error;

/// Timestamp parsing failure in the temporal scorer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("unparsable published_at timestamp: {0:?}")]
    Parse(String),
}

/// Durable store failure (SQLite or payload serialization).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("payload serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Failure of an external news or portfolio collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} returned status {status}")]
    Status { provider: String, status: u16 },
    #[error("{provider} timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },
    #[error("invalid payload: {0}")]
    Parse(String),
}

/// Failure of the enrichment (or knowledge sink) collaborator.
///
/// Always distinct from a successful result: an enricher never reports a
/// zero-valued success in place of an error.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("enrichment is not configured")]
    NotConfigured,
    #[error("article has no text to enrich")]
    EmptyInput,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("invalid enrichment response: {0}")]
    InvalidResponse(String),
    #[error("sink error: {0}")]
    Sink(String),
}
