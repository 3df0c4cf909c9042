//! SQLite-backed durable store.
//!
//! Three logical tables: `news_cache` (query results with TTL),
//! `portfolio_tokens` (resolved search terms) and `raw_articles` (phase-1
//! rows waiting for or done with enrichment). Natural keys are enforced by the
//! schema (`query_hash` primary key, `UNIQUE(url)`).

pub mod articles;
pub mod cache;
pub mod tokens;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::error::StoreError;

pub use articles::{ArticleStore, FailedRowPolicy, NewRawArticle, ProcessingStatus, RawArticle, StatusCounts};
pub use cache::{query_hash, CacheStats, CachedQuery, NewsCache, TopQuery};
pub use tokens::TokenStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS news_cache (
    query_hash TEXT PRIMARY KEY,
    search_terms TEXT NOT NULL,
    hours_back INTEGER NOT NULL,
    articles TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    hit_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT
);
CREATE INDEX IF NOT EXISTS idx_news_cache_expires ON news_cache (expires_at);

CREATE TABLE IF NOT EXISTS portfolio_tokens (
    symbol TEXT NOT NULL,
    token_type TEXT NOT NULL,
    search_terms TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    PRIMARY KEY (symbol, token_type)
);

CREATE TABLE IF NOT EXISTS raw_articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    crypto_symbol TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL UNIQUE,
    source_name TEXT NOT NULL DEFAULT '',
    published_at TEXT,
    collected_at TEXT NOT NULL,
    raw_data TEXT NOT NULL DEFAULT 'null',
    status TEXT NOT NULL DEFAULT 'pending',
    processed_at TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT
);
CREATE INDEX IF NOT EXISTS idx_raw_articles_status_published ON raw_articles (status, published_at)
"#;

/// Shared connection pool; cheap to clone.
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database at `database_url` and ensure the schema.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let in_memory = database_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
            if let Some(dir) = options.get_filename().parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(sqlx::Error::Io)?;
            }
        }

        // An in-memory database lives and dies with its single connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        let db = Self { pool };
        db.init_schema().await?;
        info!(target: "store", url = %redact(database_url), "database ready");
        Ok(db)
    }

    /// Fresh private in-memory database (tests, ephemeral runs).
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:").await
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        // sqlx executes one statement per query.
        for statement in SCHEMA.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn news_cache(&self) -> NewsCache {
        NewsCache::new(self.pool.clone())
    }

    pub fn articles(&self) -> ArticleStore {
        ArticleStore::new(self.pool.clone())
    }

    pub fn tokens(&self) -> TokenStore {
        TokenStore::new(self.pool.clone())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
