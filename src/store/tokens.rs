use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::error::StoreError;
use crate::tokens::{PortfolioToken, TokenCategory};

#[derive(Debug, FromRow)]
struct TokenRow {
    symbol: String,
    token_type: String,
    search_terms: String,
    last_updated: DateTime<Utc>,
}

/// Handle to `portfolio_tokens`, keyed by `(symbol, token_type)`.
#[derive(Clone, Debug)]
pub struct TokenStore {
    pool: SqlitePool,
}

impl TokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Swap the whole set of rows for `category` in one transaction.
    pub async fn replace_category(&self, category: TokenCategory, tokens: &[PortfolioToken]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM portfolio_tokens WHERE token_type = ?1")
            .bind(category.as_str())
            .execute(&mut *tx)
            .await?;

        for t in tokens {
            let terms = serde_json::to_string(&t.search_terms)?;
            sqlx::query(
                r#"
                INSERT INTO portfolio_tokens (symbol, token_type, search_terms, last_updated)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(symbol, token_type) DO UPDATE SET
                    search_terms = excluded.search_terms,
                    last_updated = excluded.last_updated
                "#,
            )
            .bind(&t.symbol)
            .bind(category.as_str())
            .bind(terms)
            .bind(t.last_updated)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Rows of `category`, optionally only those updated after `fresh_since`.
    pub async fn load_by_type(
        &self,
        category: TokenCategory,
        fresh_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PortfolioToken>, StoreError> {
        let rows: Vec<TokenRow> = match fresh_since {
            Some(cutoff) => {
                sqlx::query_as(
                    "SELECT symbol, token_type, search_terms, last_updated FROM portfolio_tokens \
                     WHERE token_type = ?1 AND last_updated > ?2 ORDER BY symbol",
                )
                .bind(category.as_str())
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT symbol, token_type, search_terms, last_updated FROM portfolio_tokens \
                     WHERE token_type = ?1 ORDER BY symbol",
                )
                .bind(category.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter()
            .map(|r| -> Result<PortfolioToken, StoreError> {
                Ok(PortfolioToken {
                    symbol: r.symbol,
                    category: TokenCategory::from_db(&r.token_type).unwrap_or(category),
                    search_terms: serde_json::from_str(&r.search_terms)?,
                    last_updated: r.last_updated,
                })
            })
            .collect()
    }
}
