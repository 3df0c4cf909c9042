//! Phase-1 landing table for collected articles.
//!
//! Rows are deduplicated by URL at insert time and move through
//! `pending → done | failed`. Nothing here deletes rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument, warn};

use crate::error::StoreError;
use crate::ingest::types::NewsArticle;
use crate::temporal::parse_published_at;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Done,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Done => "done",
            ProcessingStatus::Failed => "failed",
        }
    }

    // Unknown values are parked as failed so they are not picked up silently.
    fn from_db(s: &str) -> Self {
        match s {
            "pending" => ProcessingStatus::Pending,
            "done" => ProcessingStatus::Done,
            _ => ProcessingStatus::Failed,
        }
    }
}

/// Whether rows that failed enrichment become selectable again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FailedRowPolicy {
    Skip,
    Retry { max_attempts: u32 },
}

impl Default for FailedRowPolicy {
    fn default() -> Self {
        FailedRowPolicy::Retry { max_attempts: 3 }
    }
}

impl FailedRowPolicy {
    fn max_attempts(self) -> i64 {
        match self {
            FailedRowPolicy::Skip => 0,
            FailedRowPolicy::Retry { max_attempts } => i64::from(max_attempts),
        }
    }
}

/// Insert payload for `raw_articles`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRawArticle {
    pub source: String,
    pub crypto_symbol: String,
    pub title: String,
    pub content: String,
    pub url: String,
    pub source_name: String,
    pub published_at: Option<DateTime<Utc>>,
    pub collected_at: DateTime<Utc>,
    pub raw_data: serde_json::Value,
}

impl NewRawArticle {
    /// Build from a fetched article. Unparsable timestamps are stored as NULL.
    pub fn from_article(article: &NewsArticle, source: &str, symbol: &str, collected_at: DateTime<Utc>) -> Self {
        let published_at = article
            .published_at
            .as_deref()
            .and_then(|s| parse_published_at(s).ok());
        Self {
            source: source.to_string(),
            crypto_symbol: symbol.to_string(),
            title: article.title.clone(),
            content: article.content.clone(),
            url: article.url.clone(),
            source_name: article.source_name.clone(),
            published_at,
            collected_at,
            raw_data: article.raw.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    pub id: i64,
    pub source: String,
    pub crypto_symbol: String,
    pub title: String,
    pub content: String,
    pub url: String,
    pub source_name: String,
    pub published_at: Option<DateTime<Utc>>,
    pub collected_at: DateTime<Utc>,
    pub raw_data: serde_json::Value,
    pub status: ProcessingStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub attempts: i64,
    pub last_error: Option<String>,
}

impl RawArticle {
    pub fn processed(&self) -> bool {
        self.status == ProcessingStatus::Done
    }

    /// Serving shape; `published_at` goes back out as RFC 3339.
    pub fn to_news_article(&self) -> NewsArticle {
        NewsArticle {
            title: self.title.clone(),
            content: self.content.clone(),
            url: self.url.clone(),
            source_name: self.source_name.clone(),
            published_at: self.published_at.map(|t| t.to_rfc3339()),
            symbol: Some(self.crypto_symbol.clone()),
            raw: self.raw_data.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, FromRow)]
struct RawArticleRow {
    id: i64,
    source: String,
    crypto_symbol: String,
    title: String,
    content: String,
    url: String,
    source_name: String,
    published_at: Option<DateTime<Utc>>,
    collected_at: DateTime<Utc>,
    raw_data: String,
    status: String,
    processed_at: Option<DateTime<Utc>>,
    attempts: i64,
    last_error: Option<String>,
}

impl From<RawArticleRow> for RawArticle {
    fn from(r: RawArticleRow) -> Self {
        let raw_data = serde_json::from_str(&r.raw_data).unwrap_or_else(|e| {
            warn!(target: "store", id = r.id, error = %e, "raw_data is not valid JSON");
            serde_json::Value::Null
        });
        Self {
            id: r.id,
            source: r.source,
            crypto_symbol: r.crypto_symbol,
            title: r.title,
            content: r.content,
            url: r.url,
            source_name: r.source_name,
            published_at: r.published_at,
            collected_at: r.collected_at,
            raw_data,
            status: ProcessingStatus::from_db(&r.status),
            processed_at: r.processed_at,
            attempts: r.attempts,
            last_error: r.last_error,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub done: i64,
    pub failed: i64,
}

const COLUMNS: &str = "id, source, crypto_symbol, title, content, url, source_name, published_at, \
                       collected_at, raw_data, status, processed_at, attempts, last_error";

#[derive(Clone, Debug)]
pub struct ArticleStore {
    pool: SqlitePool,
}

impl ArticleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert unless the URL is already known. `Ok(true)` means a new row.
    #[instrument(skip(self, article), fields(url = %article.url))]
    pub async fn insert_if_new(&self, article: &NewRawArticle) -> Result<bool, StoreError> {
        let raw = serde_json::to_string(&article.raw_data)?;
        let res = sqlx::query(
            r#"
            INSERT INTO raw_articles (
                source, crypto_symbol, title, content, url, source_name,
                published_at, collected_at, raw_data, status
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(&article.source)
        .bind(&article.crypto_symbol)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.url)
        .bind(&article.source_name)
        .bind(article.published_at)
        .bind(article.collected_at)
        .bind(raw)
        .execute(&self.pool)
        .await?;

        let inserted = res.rows_affected() == 1;
        if !inserted {
            debug!(target: "store", "duplicate url");
        }
        Ok(inserted)
    }

    /// Next batch of rows eligible for enrichment, newest first.
    pub async fn fetch_selectable(&self, batch_size: u32, policy: FailedRowPolicy) -> Result<Vec<RawArticle>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM raw_articles \
             WHERE status = 'pending' OR (status = 'failed' AND attempts < ?1) \
             ORDER BY published_at DESC NULLS LAST, id ASC \
             LIMIT ?2"
        );
        let rows: Vec<RawArticleRow> = sqlx::query_as(&sql)
            .bind(policy.max_attempts())
            .bind(i64::from(batch_size))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(RawArticle::from).collect())
    }

    pub async fn mark_done(&self, id: i64, raw_data: &serde_json::Value, now: DateTime<Utc>) -> Result<(), StoreError> {
        let raw = serde_json::to_string(raw_data)?;
        sqlx::query(
            r#"
            UPDATE raw_articles
            SET status = 'done', processed_at = ?1, raw_data = ?2,
                attempts = attempts + 1, last_error = NULL
            WHERE id = ?3
            "#,
        )
        .bind(now)
        .bind(raw)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: i64, error: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE raw_articles
            SET status = 'failed', processed_at = ?1,
                attempts = attempts + 1, last_error = ?2
            WHERE id = ?3
            "#,
        )
        .bind(now)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Enriched rows published strictly after `cutoff`, newest first.
    pub async fn fetch_processed_since(&self, cutoff: DateTime<Utc>, limit: u32) -> Result<Vec<RawArticle>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM raw_articles \
             WHERE status = 'done' AND published_at > ?1 \
             ORDER BY published_at DESC, id ASC \
             LIMIT ?2"
        );
        let rows: Vec<RawArticleRow> = sqlx::query_as(&sql)
            .bind(cutoff)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(RawArticle::from).collect())
    }

    pub async fn find_by_url(&self, url: &str) -> Result<Option<RawArticle>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM raw_articles WHERE url = ?1");
        let row: Option<RawArticleRow> = sqlx::query_as(&sql).bind(url).fetch_optional(&self.pool).await?;
        Ok(row.map(RawArticle::from))
    }

    pub async fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM raw_articles GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            match ProcessingStatus::from_db(&status) {
                ProcessingStatus::Pending => counts.pending += n,
                ProcessingStatus::Done => counts.done += n,
                ProcessingStatus::Failed => counts.failed += n,
            }
        }
        Ok(counts)
    }
}
