//! Query cache: normalized news queries → cached article sets with a TTL.
//!
//! Expiry is lazy. `get` ignores rows with `expires_at <= now` but leaves them
//! in place; `sweep_expired` removes them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::ingest::types::NewsArticle;

/// Deterministic, order-insensitive signature of `(search_terms, hours_back)`.
///
/// Terms are trimmed, lowercased, deduplicated and sorted before hashing, so
/// `["BTC", "Bitcoin"]` and `["bitcoin", "btc"]` share one cache row.
pub fn query_hash<S: AsRef<str>>(search_terms: &[S], hours_back: u32) -> String {
    let mut terms: Vec<String> = search_terms
        .iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    terms.sort();
    terms.dedup();

    let mut hasher = Sha256::new();
    hasher.update(terms.join("\u{1f}").as_bytes());
    hasher.update(b"|");
    hasher.update(hours_back.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedQuery {
    pub query_hash: String,
    /// Order kept as given, for replaying the upstream query.
    pub search_terms: Vec<String>,
    pub hours_back: u32,
    pub articles: Vec<NewsArticle>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: i64,
    pub last_accessed: Option<DateTime<Utc>>,
}

impl CachedQuery {
    pub fn new(
        search_terms: Vec<String>,
        hours_back: u32,
        articles: Vec<NewsArticle>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            query_hash: query_hash(&search_terms, hours_back),
            search_terms,
            hours_back,
            articles,
            created_at: now,
            expires_at: now + ttl,
            hit_count: 0,
            last_accessed: None,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, FromRow)]
struct CacheRow {
    query_hash: String,
    search_terms: String,
    hours_back: i64,
    articles: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    hit_count: i64,
    last_accessed: Option<DateTime<Utc>>,
}

impl TryFrom<CacheRow> for CachedQuery {
    type Error = StoreError;

    fn try_from(r: CacheRow) -> Result<Self, Self::Error> {
        let hours_back =
            u32::try_from(r.hours_back).map_err(|_| StoreError::Corrupt(format!("hours_back {}", r.hours_back)))?;
        Ok(Self {
            query_hash: r.query_hash,
            search_terms: serde_json::from_str(&r.search_terms)?,
            hours_back,
            articles: serde_json::from_str(&r.articles)?,
            created_at: r.created_at,
            expires_at: r.expires_at,
            hit_count: r.hit_count,
            last_accessed: r.last_accessed,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopQuery {
    pub query_hash: String,
    pub search_terms: Vec<String>,
    pub hit_count: i64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CacheStats {
    pub total: i64,
    pub active: i64,
    pub expired: i64,
    pub total_hits: i64,
    pub avg_hits_per_query: f64,
    #[serde(rename = "top_5_by_hits")]
    pub top_queries: Vec<TopQuery>,
}

/// Handle to the `news_cache` table.
#[derive(Clone, Debug)]
pub struct NewsCache {
    pool: SqlitePool,
}

impl NewsCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Valid entry for `query_hash`, or `None` when absent or expired.
    ///
    /// A hit bumps `hit_count` and `last_accessed` in the same statement. A row
    /// whose payload no longer decodes is reported as a miss.
    pub async fn get(&self, query_hash: &str, now: DateTime<Utc>) -> Result<Option<CachedQuery>, StoreError> {
        let row: Option<CacheRow> = sqlx::query_as(
            r#"
            UPDATE news_cache
            SET hit_count = hit_count + 1, last_accessed = ?1
            WHERE query_hash = ?2 AND expires_at > ?1
            RETURNING query_hash, search_terms, hours_back, articles,
                      created_at, expires_at, hit_count, last_accessed
            "#,
        )
        .bind(now)
        .bind(query_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            debug!(target: "cache", %query_hash, "miss");
            return Ok(None);
        };

        match CachedQuery::try_from(row) {
            Ok(cached) => {
                debug!(target: "cache", %query_hash, hits = cached.hit_count, "hit");
                Ok(Some(cached))
            }
            Err(e) => {
                warn!(target: "cache", %query_hash, error = %e, "undecodable cached payload, treating as miss");
                Ok(None)
            }
        }
    }

    /// Upsert by `query_hash`, replacing any previous (possibly expired) entry.
    pub async fn put(&self, cached: &CachedQuery) -> Result<(), StoreError> {
        let terms = serde_json::to_string(&cached.search_terms)?;
        let articles = serde_json::to_string(&cached.articles)?;

        sqlx::query(
            r#"
            INSERT INTO news_cache (
                query_hash, search_terms, hours_back, articles,
                created_at, expires_at, hit_count, last_accessed
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(query_hash) DO UPDATE SET
                search_terms = excluded.search_terms,
                hours_back = excluded.hours_back,
                articles = excluded.articles,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at,
                hit_count = excluded.hit_count,
                last_accessed = excluded.last_accessed
            "#,
        )
        .bind(&cached.query_hash)
        .bind(terms)
        .bind(i64::from(cached.hours_back))
        .bind(articles)
        .bind(cached.created_at)
        .bind(cached.expires_at)
        .bind(cached.hit_count)
        .bind(cached.last_accessed)
        .execute(&self.pool)
        .await?;

        debug!(target: "cache", query_hash = %cached.query_hash, articles = cached.articles.len(), "stored");
        Ok(())
    }

    /// Aggregate view; expiry is evaluated against `now`, not write time.
    pub async fn stats(&self, now: DateTime<Utc>) -> Result<CacheStats, StoreError> {
        let (total, active, total_hits): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN expires_at > ?1 THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(hit_count), 0)
            FROM news_cache
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let top: Vec<(String, String, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT query_hash, search_terms, hit_count, expires_at
            FROM news_cache
            ORDER BY hit_count DESC, query_hash ASC
            LIMIT 5
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let top_queries = top
            .into_iter()
            .map(|(query_hash, terms, hit_count, expires_at)| TopQuery {
                query_hash,
                search_terms: serde_json::from_str(&terms).unwrap_or_default(),
                hit_count,
                active: now < expires_at,
            })
            .collect();

        Ok(CacheStats {
            total,
            active,
            expired: total - active,
            total_hits,
            avg_hits_per_query: if total > 0 {
                total_hits as f64 / total as f64
            } else {
                0.0
            },
            top_queries,
        })
    }

    /// Delete rows with `expires_at <= now`; returns how many went away.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM news_cache WHERE expires_at <= ?1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        let n = res.rows_affected();
        if n > 0 {
            debug!(target: "cache", swept = n, "expired entries removed");
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn art(url: &str) -> NewsArticle {
        NewsArticle {
            title: url.to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    fn entry(hash: &str, created: DateTime<Utc>) -> CachedQuery {
        CachedQuery {
            query_hash: hash.to_string(),
            search_terms: vec!["BTC".into(), "Bitcoin".into()],
            hours_back: 24,
            articles: vec![art("https://a"), art("https://b")],
            created_at: created,
            expires_at: created + Duration::hours(24),
            hit_count: 0,
            last_accessed: None,
        }
    }

    async fn cache() -> NewsCache {
        Database::in_memory().await.unwrap().news_cache()
    }

    #[test]
    fn hash_is_order_and_case_insensitive() {
        let a = query_hash(&["BTC", "Bitcoin", "btc"], 24);
        let b = query_hash(&["bitcoin", " BTC "], 24);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, query_hash(&["BTC", "Bitcoin"], 48));
        assert_ne!(a, query_hash(&["ETH"], 24));
    }

    #[tokio::test]
    async fn hit_within_ttl_then_expired_after() {
        let c = cache().await;
        c.put(&entry("abc", t0())).await.unwrap();

        let hit = c.get("abc", t0() + Duration::hours(1)).await.unwrap().expect("hit");
        assert_eq!(hit.articles.len(), 2);
        assert_eq!(hit.hit_count, 1);
        assert_eq!(hit.last_accessed, Some(t0() + Duration::hours(1)));

        assert!(c.get("abc", t0() + Duration::hours(25)).await.unwrap().is_none());
        // boundary: expires_at itself is already invalid
        assert!(c.get("abc", t0() + Duration::hours(24)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn repeated_get_is_content_stable() {
        let c = cache().await;
        c.put(&entry("abc", t0())).await.unwrap();
        let now = t0() + Duration::minutes(5);
        let first = c.get("abc", now).await.unwrap().unwrap();
        let second = c.get("abc", now).await.unwrap().unwrap();
        assert_eq!(first.articles, second.articles);
        assert_eq!(second.hit_count, first.hit_count + 1);
    }

    #[tokio::test]
    async fn absent_hash_is_miss() {
        let c = cache().await;
        assert!(c.get("nope", t0()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites_expired_entry() {
        let c = cache().await;
        c.put(&entry("abc", t0())).await.unwrap();
        let later = t0() + Duration::hours(30);
        assert!(c.get("abc", later).await.unwrap().is_none());

        let mut fresh = entry("abc", later);
        fresh.articles = vec![art("https://c")];
        c.put(&fresh).await.unwrap();

        let hit = c.get("abc", later + Duration::hours(1)).await.unwrap().unwrap();
        assert_eq!(hit.articles, vec![art("https://c")]);
        assert_eq!(hit.hit_count, 1);
    }

    #[tokio::test]
    async fn stats_reflect_expiry_at_call_time() {
        let c = cache().await;
        c.put(&entry("a", t0())).await.unwrap();
        c.put(&entry("b", t0() - Duration::hours(20))).await.unwrap();
        c.get("a", t0()).await.unwrap();
        c.get("a", t0()).await.unwrap();
        c.get("b", t0()).await.unwrap();

        let s = c.stats(t0()).await.unwrap();
        assert_eq!((s.total, s.active, s.expired, s.total_hits), (2, 2, 0, 3));
        assert!((s.avg_hits_per_query - 1.5).abs() < 1e-9);
        assert_eq!(s.top_queries[0].query_hash, "a");

        let s = c.stats(t0() + Duration::hours(10)).await.unwrap();
        assert_eq!((s.active, s.expired), (1, 1));
    }

    #[tokio::test]
    async fn stats_on_empty_cache() {
        let s = cache().await.stats(t0()).await.unwrap();
        assert_eq!(s, CacheStats::default());
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let c = cache().await;
        c.put(&entry("old", t0() - Duration::hours(48))).await.unwrap();
        c.put(&entry("new", t0())).await.unwrap();

        assert_eq!(c.sweep_expired(t0()).await.unwrap(), 1);
        assert_eq!(c.sweep_expired(t0()).await.unwrap(), 0);
        assert_eq!(c.stats(t0()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn malformed_payload_reads_as_miss() {
        let db = Database::in_memory().await.unwrap();
        let c = db.news_cache();
        c.put(&entry("abc", t0())).await.unwrap();
        sqlx::query("UPDATE news_cache SET articles = '{broken' WHERE query_hash = 'abc'")
            .execute(db.pool())
            .await
            .unwrap();
        assert!(c.get("abc", t0()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn out_of_range_window_reads_as_miss() {
        let db = Database::in_memory().await.unwrap();
        let c = db.news_cache();
        c.put(&entry("abc", t0())).await.unwrap();
        sqlx::query("UPDATE news_cache SET hours_back = -1 WHERE query_hash = 'abc'")
            .execute(db.pool())
            .await
            .unwrap();
        assert!(c.get("abc", t0()).await.unwrap().is_none());

        c.put(&entry("abc", t0())).await.unwrap();
        assert_eq!(c.get("abc", t0()).await.unwrap().unwrap().hours_back, 24);
    }

    #[test]
    fn hash_is_lowercase_hex() {
        let h = query_hash(&["BTC"], 24);
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
}
