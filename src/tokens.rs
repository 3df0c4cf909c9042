//! Portfolio-aware token resolution.
//!
//! Three categories feed the orchestrator: a fixed alpha list, a fixed
//! opportunity list (both from configuration) and the user's personal holdings,
//! which are pulled from a [`PortfolioProvider`] and cached in the store for 24h.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::error::FetchError;
use crate::store::TokenStore;

pub const PERSONAL_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenCategory {
    AlphaPortfolio,
    Opportunity,
    Personal,
}

impl TokenCategory {
    pub const ALL: [TokenCategory; 3] = [
        TokenCategory::AlphaPortfolio,
        TokenCategory::Opportunity,
        TokenCategory::Personal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TokenCategory::AlphaPortfolio => "alpha_portfolio",
            TokenCategory::Opportunity => "opportunity",
            TokenCategory::Personal => "personal",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "alpha_portfolio" => Some(TokenCategory::AlphaPortfolio),
            "opportunity" => Some(TokenCategory::Opportunity),
            "personal" => Some(TokenCategory::Personal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioToken {
    pub symbol: String,
    pub category: TokenCategory,
    pub search_terms: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: f64,
}

/// Source of the user's current holdings.
#[async_trait]
pub trait PortfolioProvider: Send + Sync {
    async fn get_holdings(&self) -> Result<Vec<Holding>, FetchError>;
    fn name(&self) -> &str;
}

/// Holdings fixed at construction (configuration or tests).
#[derive(Debug, Clone, Default)]
pub struct StaticPortfolio {
    holdings: Vec<Holding>,
}

impl StaticPortfolio {
    pub fn new(holdings: Vec<Holding>) -> Self {
        Self { holdings }
    }
}

#[async_trait]
impl PortfolioProvider for StaticPortfolio {
    async fn get_holdings(&self) -> Result<Vec<Holding>, FetchError> {
        Ok(self.holdings.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// No portfolio connected: the personal category is simply empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPortfolio;

#[async_trait]
impl PortfolioProvider for NullPortfolio {
    async fn get_holdings(&self) -> Result<Vec<Holding>, FetchError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "null"
    }
}

const KNOWN_NAMES: &[(&str, &str)] = &[
    ("BTC", "Bitcoin"),
    ("ETH", "Ethereum"),
    ("SOL", "Solana"),
    ("ADA", "Cardano"),
    ("DOT", "Polkadot"),
    ("AVAX", "Avalanche"),
    ("LINK", "Chainlink"),
    ("MATIC", "Polygon"),
    ("XRP", "Ripple"),
    ("DOGE", "Dogecoin"),
    ("BNB", "Binance Coin"),
];

pub fn full_name(symbol: &str) -> Option<&'static str> {
    KNOWN_NAMES
        .iter()
        .find(|(s, _)| s.eq_ignore_ascii_case(symbol))
        .map(|(_, name)| *name)
}

/// Ticker, lowercase ticker, and the full name when it is a known asset.
pub fn search_terms_for(symbol: &str) -> Vec<String> {
    let sym = symbol.trim().to_ascii_uppercase();
    let mut terms = vec![sym.clone(), sym.to_ascii_lowercase()];
    if let Some(name) = full_name(&sym) {
        terms.push(name.to_string());
    }
    terms
}

/// Symbol → search terms, as configured for the fixed categories.
pub type TokenMap = BTreeMap<String, Vec<String>>;

pub fn default_alpha_tokens() -> TokenMap {
    ["BTC", "ETH", "SOL"]
        .into_iter()
        .map(|s| (s.to_string(), search_terms_for(s)))
        .collect()
}

pub fn default_opportunity_tokens() -> TokenMap {
    ["AVAX", "LINK", "DOT", "MATIC"]
        .into_iter()
        .map(|s| (s.to_string(), search_terms_for(s)))
        .collect()
}

/// Last successful holdings pull, kept even when it produced no tokens.
#[derive(Debug, Default)]
struct PersonalSnapshot {
    tokens: Vec<PortfolioToken>,
    refreshed_at: Option<DateTime<Utc>>,
}

pub struct TokenResolver {
    store: TokenStore,
    portfolio: Arc<dyn PortfolioProvider>,
    clock: SharedClock,
    alpha: TokenMap,
    opportunity: TokenMap,
    last_personal: RwLock<PersonalSnapshot>,
}

impl TokenResolver {
    pub fn new(
        store: TokenStore,
        portfolio: Arc<dyn PortfolioProvider>,
        clock: SharedClock,
        alpha: TokenMap,
        opportunity: TokenMap,
    ) -> Self {
        Self {
            store,
            portfolio,
            clock,
            alpha,
            opportunity,
            last_personal: RwLock::new(PersonalSnapshot::default()),
        }
    }

    fn fixed(&self, map: &TokenMap, category: TokenCategory) -> Vec<PortfolioToken> {
        let now = self.clock.now();
        map.iter()
            .map(|(symbol, terms)| PortfolioToken {
                symbol: symbol.clone(),
                category,
                search_terms: if terms.is_empty() {
                    search_terms_for(symbol)
                } else {
                    terms.clone()
                },
                last_updated: now,
            })
            .collect()
    }

    /// Every configured symbol across the fixed categories plus the current
    /// personal set, deduplicated. Used by ingestion.
    pub async fn tracked_symbols(&self) -> Vec<PortfolioToken> {
        let mut seen = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        for category in TokenCategory::ALL {
            for t in self.tokens_for(category).await {
                if seen.insert(t.symbol.clone()) {
                    out.push(t);
                }
            }
        }
        out
    }

    /// Pull holdings and persist their search terms.
    ///
    /// Never fails: on provider or store trouble the previously known personal
    /// set is returned unchanged.
    pub async fn refresh_personal_tokens(&self) -> Vec<PortfolioToken> {
        let holdings = match self.portfolio.get_holdings().await {
            Ok(h) => h,
            Err(e) => {
                warn!(target: "tokens", error = ?e, provider = self.portfolio.name(), "holdings unavailable, keeping previous personal tokens");
                return self.previous_personal().await;
            }
        };

        let now = self.clock.now();
        let mut seen = std::collections::BTreeSet::new();
        let tokens: Vec<PortfolioToken> = holdings
            .into_iter()
            .filter(|h| h.quantity.is_finite() && h.quantity != 0.0)
            .map(|h| h.symbol.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .map(|symbol| PortfolioToken {
                search_terms: search_terms_for(&symbol),
                symbol,
                category: TokenCategory::Personal,
                last_updated: now,
            })
            .collect();

        if let Err(e) = self.store.replace_category(TokenCategory::Personal, &tokens).await {
            warn!(target: "tokens", error = ?e, "could not persist personal tokens");
        }
        info!(target: "tokens", count = tokens.len(), "personal tokens refreshed");

        *self.last_personal.write().await = PersonalSnapshot {
            tokens: tokens.clone(),
            refreshed_at: Some(now),
        };
        tokens
    }

    /// Persisted personal tokens younger than 24h; empty on store errors.
    pub async fn load_cached_personal_tokens(&self) -> Vec<PortfolioToken> {
        let cutoff = self.clock.now() - Duration::hours(PERSONAL_TTL_HOURS);
        match self.store.load_by_type(TokenCategory::Personal, Some(cutoff)).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(target: "tokens", error = ?e, "failed to load cached personal tokens");
                Vec::new()
            }
        }
    }

    pub async fn tokens_for(&self, category: TokenCategory) -> Vec<PortfolioToken> {
        match category {
            TokenCategory::AlphaPortfolio => self.fixed(&self.alpha, category),
            TokenCategory::Opportunity => self.fixed(&self.opportunity, category),
            TokenCategory::Personal => {
                let cached = self.load_cached_personal_tokens().await;
                if !cached.is_empty() {
                    debug!(target: "tokens", count = cached.len(), "using cached personal tokens");
                    return cached;
                }
                // An empty holdings pull is still a refresh.
                if let Some(tokens) = self.fresh_in_memory().await {
                    return tokens;
                }
                self.refresh_personal_tokens().await
            }
        }
    }

    async fn fresh_in_memory(&self) -> Option<Vec<PortfolioToken>> {
        let snap = self.last_personal.read().await;
        let refreshed_at = snap.refreshed_at?;
        (self.clock.now() - refreshed_at < Duration::hours(PERSONAL_TTL_HOURS)).then(|| snap.tokens.clone())
    }

    async fn previous_personal(&self) -> Vec<PortfolioToken> {
        let mem = self.last_personal.read().await.tokens.clone();
        if !mem.is_empty() {
            return mem;
        }
        self.store
            .load_by_type(TokenCategory::Personal, None)
            .await
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::Database;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Flaky {
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PortfolioProvider for Flaky {
        async fn get_holdings(&self) -> Result<Vec<Holding>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(FetchError::Parse("exchange down".into()));
            }
            Ok(vec![
                Holding { symbol: "btc".into(), quantity: 0.5 },
                Holding { symbol: "ADA".into(), quantity: 0.0 },
                Holding { symbol: "PEPE".into(), quantity: 1_000.0 },
            ])
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    async fn resolver(provider: Arc<dyn PortfolioProvider>, clock: Arc<ManualClock>) -> TokenResolver {
        let db = Database::in_memory().await.unwrap();
        TokenResolver::new(
            db.tokens(),
            provider,
            clock,
            default_alpha_tokens(),
            default_opportunity_tokens(),
        )
    }

    #[test]
    fn terms_include_known_full_name() {
        assert_eq!(search_terms_for("eth"), vec!["ETH", "eth", "Ethereum"]);
        assert_eq!(search_terms_for("PEPE"), vec!["PEPE", "pepe"]);
        assert_eq!(full_name("bnb"), Some("Binance Coin"));
    }

    #[tokio::test]
    async fn refresh_skips_zero_holdings() {
        let provider = Arc::new(Flaky { fail: AtomicBool::new(false), calls: AtomicUsize::new(0) });
        let r = resolver(provider, Arc::new(ManualClock::new(t0()))).await;

        let tokens = r.refresh_personal_tokens().await;
        let symbols: Vec<_> = tokens.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, ["BTC", "PEPE"]);
        assert_eq!(tokens[0].search_terms, vec!["BTC", "btc", "Bitcoin"]);
    }

    #[tokio::test]
    async fn provider_failure_keeps_previous_set() {
        let provider = Arc::new(Flaky { fail: AtomicBool::new(false), calls: AtomicUsize::new(0) });
        let r = resolver(provider.clone(), Arc::new(ManualClock::new(t0()))).await;

        let before = r.refresh_personal_tokens().await;
        provider.fail.store(true, Ordering::SeqCst);
        let after = r.refresh_personal_tokens().await;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn personal_cache_expires_after_a_day() {
        let provider = Arc::new(Flaky { fail: AtomicBool::new(false), calls: AtomicUsize::new(0) });
        let clock = Arc::new(ManualClock::new(t0()));
        let r = resolver(provider.clone(), clock.clone()).await;

        r.tokens_for(TokenCategory::Personal).await;
        r.tokens_for(TokenCategory::Personal).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::hours(25));
        assert!(r.load_cached_personal_tokens().await.is_empty());
        r.tokens_for(TokenCategory::Personal).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    struct Empty(AtomicUsize);

    #[async_trait]
    impl PortfolioProvider for Empty {
        async fn get_holdings(&self) -> Result<Vec<Holding>, FetchError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "empty"
        }
    }

    #[tokio::test]
    async fn empty_holdings_count_as_a_refresh() {
        let provider = Arc::new(Empty(AtomicUsize::new(0)));
        let clock = Arc::new(ManualClock::new(t0()));
        let r = resolver(provider.clone(), clock.clone()).await;

        for _ in 0..5 {
            assert!(r.tokens_for(TokenCategory::Personal).await.is_empty());
        }
        assert_eq!(provider.0.load(Ordering::SeqCst), 1);

        clock.advance(Duration::hours(23));
        r.tracked_symbols().await;
        assert_eq!(provider.0.load(Ordering::SeqCst), 1);

        clock.advance(Duration::hours(2));
        r.tokens_for(TokenCategory::Personal).await;
        assert_eq!(provider.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_pull_is_retried_on_next_call() {
        let provider = Arc::new(Flaky { fail: AtomicBool::new(true), calls: AtomicUsize::new(0) });
        let r = resolver(provider.clone(), Arc::new(ManualClock::new(t0()))).await;

        assert!(r.tokens_for(TokenCategory::Personal).await.is_empty());
        provider.fail.store(false, Ordering::SeqCst);
        assert_eq!(r.tokens_for(TokenCategory::Personal).await.len(), 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fixed_categories_come_from_config() {
        let r = resolver(Arc::new(NullPortfolio), Arc::new(ManualClock::new(t0()))).await;
        let alpha = r.tokens_for(TokenCategory::AlphaPortfolio).await;
        assert_eq!(alpha.len(), 3);
        assert!(alpha.iter().all(|t| t.category == TokenCategory::AlphaPortfolio));
        assert!(r.tokens_for(TokenCategory::Personal).await.is_empty());
        // BTC/ETH/SOL + AVAX/LINK/DOT/MATIC
        assert_eq!(r.tracked_symbols().await.len(), 7);
    }
}
