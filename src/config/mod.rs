//! Application configuration.
//!
//! Resolution order: `$NEWS_CACHE_CONFIG_PATH` (must exist when set), then
//! `config/news_cache.toml`, then built-in defaults. Secrets and the database
//! URL can be overridden from the environment afterwards.

pub mod ai;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::ingest::scheduler::SchedulerCfg;
use crate::store::FailedRowPolicy;
use crate::tokens::{default_alpha_tokens, default_opportunity_tokens, Holding, TokenMap};

pub use ai::{EnrichmentConfig, EnrichmentProvider};

pub const ENV_CONFIG_PATH: &str = "NEWS_CACHE_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/news_cache.toml";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_NEWSAPI_KEY: &str = "NEWSAPI_KEY";
pub const ENV_TAVILY_API_KEY: &str = "TAVILY_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheCfg {
    pub ttl_hours: i64,
    pub fetch_timeout_secs: u64,
}

impl Default for CacheCfg {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            fetch_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RssFeedCfg {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesCfg {
    pub newsapi_key: Option<String>,
    pub newsapi_page_size: u32,
    pub tavily_key: Option<String>,
    pub rss: Vec<RssFeedCfg>,
    pub request_timeout_secs: u64,
}

impl Default for SourcesCfg {
    fn default() -> Self {
        Self {
            newsapi_key: None,
            newsapi_page_size: 20,
            tavily_key: None,
            rss: Vec::new(),
            request_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokensCfg {
    pub alpha: TokenMap,
    pub opportunity: TokenMap,
    /// Static holdings; empty means no personal category.
    pub holdings: Vec<Holding>,
}

impl Default for TokensCfg {
    fn default() -> Self {
        Self {
            alpha: default_alpha_tokens(),
            opportunity: default_opportunity_tokens(),
            holdings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisCfg {
    pub batch_size: u32,
    /// 0 disables the pause between rows.
    pub rate_limit_ms: u64,
    pub failed_rows: FailedRowPolicy,
}

impl Default for AnalysisCfg {
    fn default() -> Self {
        Self {
            batch_size: 10,
            rate_limit_ms: 500,
            failed_rows: FailedRowPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeCfg {
    pub default_limit: u32,
    pub max_limit: u32,
    pub default_hours_back: u32,
    /// Requests asking for a wider window are narrowed to this.
    pub max_hours_back: u32,
}

impl Default for ServeCfg {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 200,
            default_hours_back: 24,
            max_hours_back: crate::temporal::MAX_HOURS_BACK,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub cache: CacheCfg,
    pub sources: SourcesCfg,
    pub tokens: TokensCfg,
    pub analysis: AnalysisCfg,
    pub enrichment: EnrichmentConfig,
    pub scheduler: SchedulerCfg,
    pub serve: ServeCfg,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/news_cache.db".to_string(),
            cache: CacheCfg::default(),
            sources: SourcesCfg::default(),
            tokens: TokensCfg::default(),
            analysis: AnalysisCfg::default(),
            enrichment: EnrichmentConfig::default(),
            scheduler: SchedulerCfg::default(),
            serve: ServeCfg::default(),
        }
    }
}

impl AppConfig {
    /// Load using the env var + file + defaults chain, then apply env overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = match resolve_path()? {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    /// Parse a TOML file without env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = non_empty_env(ENV_DATABASE_URL) {
            self.database_url = v;
        }
        if let Some(v) = non_empty_env(ENV_NEWSAPI_KEY) {
            self.sources.newsapi_key = Some(v);
        }
        if let Some(v) = non_empty_env(ENV_TAVILY_API_KEY) {
            self.sources.tavily_key = Some(v);
        }
        if let Some(v) = non_empty_env(ai::ENV_OPENAI_API_KEY) {
            self.enrichment.api_key = v;
        }
    }

    /// Replace zero or nonsensical values with defaults.
    pub fn sanitize(&mut self) {
        let d = Self::default();
        if self.database_url.trim().is_empty() {
            self.database_url = d.database_url;
        }
        if self.cache.ttl_hours <= 0 {
            self.cache.ttl_hours = d.cache.ttl_hours;
        }
        if self.cache.fetch_timeout_secs == 0 {
            self.cache.fetch_timeout_secs = d.cache.fetch_timeout_secs;
        }
        if self.sources.request_timeout_secs == 0 {
            self.sources.request_timeout_secs = d.sources.request_timeout_secs;
        }
        self.sources.newsapi_key = self.sources.newsapi_key.take().filter(|k| !k.trim().is_empty());
        self.sources.tavily_key = self.sources.tavily_key.take().filter(|k| !k.trim().is_empty());
        self.analysis.batch_size = self.analysis.batch_size.max(1);
        self.scheduler.batch_size = self.scheduler.batch_size.max(1);
        if self.serve.max_limit == 0 {
            self.serve.max_limit = d.serve.max_limit;
        }
        self.serve.default_limit = self.serve.default_limit.clamp(1, self.serve.max_limit);
        if self.serve.max_hours_back == 0 {
            self.serve.max_hours_back = d.serve.max_hours_back;
        }
        self.serve.max_hours_back = self.serve.max_hours_back.min(crate::temporal::MAX_HOURS_BACK);
        self.serve.default_hours_back = self.serve.default_hours_back.min(self.serve.max_hours_back);
        self.enrichment.sanitize();
    }
}

fn resolve_path() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(Some(pb));
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display()));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    Ok(default.exists().then_some(default))
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
