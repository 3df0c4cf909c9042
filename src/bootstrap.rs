//! Startup wiring: configuration → collaborators → services.
//!
//! Every collaborator has a null-object fallback, so a deployment without
//! credentials still boots and serves whatever the store already holds.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use crate::analysis::{
    AnalysisConfig, AnalysisPipeline, DisabledEnricher, Enricher, KnowledgeSink, LexiconEnricher, NoopSink,
    OpenAiEnricher, RateLimit,
};
use crate::clock::SharedClock;
use crate::config::{AppConfig, EnrichmentProvider};
use crate::ingest::providers::{FallbackSource, NewsApiSource, RssSource, TavilySource};
use crate::ingest::types::{NewsSource, NullNewsSource};
use crate::ingest::NewsIngestor;
use crate::orchestrator::{NewsOrchestrator, OrchestratorConfig};
use crate::pipeline::PipelineCoordinator;
use crate::serve::FastServe;
use crate::store::{Database, NewsCache};
use crate::tokens::{NullPortfolio, PortfolioProvider, StaticPortfolio, TokenResolver};

/// External collaborators, chosen from configuration or injected by tests.
pub struct Collaborators {
    /// Sources for ingestion, each queried per symbol.
    pub sources: Vec<Arc<dyn NewsSource>>,
    pub portfolio: Arc<dyn PortfolioProvider>,
    pub enricher: Arc<dyn Enricher>,
    pub sink: Arc<dyn KnowledgeSink>,
}

impl Collaborators {
    pub fn from_config(cfg: &AppConfig, clock: &SharedClock) -> Self {
        Self {
            sources: build_sources(cfg, clock),
            portfolio: build_portfolio(cfg),
            enricher: build_enricher(cfg),
            sink: Arc::new(NoopSink),
        }
    }

    /// The orchestrator's view: first source that answers wins.
    fn primary_source(&self) -> Arc<dyn NewsSource> {
        match self.sources.len() {
            0 => Arc::new(NullNewsSource),
            1 => self.sources[0].clone(),
            _ => Arc::new(FallbackSource::new(self.sources.clone())),
        }
    }
}

fn build_sources(cfg: &AppConfig, clock: &SharedClock) -> Vec<Arc<dyn NewsSource>> {
    let timeout = Duration::from_secs(cfg.sources.request_timeout_secs);
    let mut out: Vec<Arc<dyn NewsSource>> = Vec::new();

    if let Some(key) = &cfg.sources.newsapi_key {
        match NewsApiSource::new(key.clone(), timeout, clock.clone()) {
            Ok(s) => out.push(Arc::new(s.with_page_size(cfg.sources.newsapi_page_size))),
            Err(e) => warn!(error = ?e, provider = "newsapi", "source disabled"),
        }
    }
    if let Some(key) = &cfg.sources.tavily_key {
        match TavilySource::new(key.clone(), timeout) {
            Ok(s) => out.push(Arc::new(s)),
            Err(e) => warn!(error = ?e, provider = "tavily", "source disabled"),
        }
    }
    for feed in &cfg.sources.rss {
        match RssSource::from_url(feed.name.clone(), feed.url.clone(), timeout, clock.clone()) {
            Ok(s) => out.push(Arc::new(s)),
            Err(e) => warn!(error = ?e, provider = %feed.name, "rss feed disabled"),
        }
    }

    if out.is_empty() {
        warn!("no news sources configured; fetches will return nothing");
    }
    out
}

fn build_portfolio(cfg: &AppConfig) -> Arc<dyn PortfolioProvider> {
    if cfg.tokens.holdings.is_empty() {
        Arc::new(NullPortfolio)
    } else {
        Arc::new(StaticPortfolio::new(cfg.tokens.holdings.clone()))
    }
}

fn build_enricher(cfg: &AppConfig) -> Arc<dyn Enricher> {
    let e = &cfg.enrichment;
    match e.provider {
        EnrichmentProvider::Lexicon => Arc::new(LexiconEnricher),
        EnrichmentProvider::Disabled => Arc::new(DisabledEnricher),
        EnrichmentProvider::OpenAi => {
            match OpenAiEnricher::new(e.api_key.clone(), e.model.as_deref(), Duration::from_secs(e.timeout_secs)) {
                Ok(client) => Arc::new(client),
                Err(err) => {
                    // Safe diagnostics: key length only
                    warn!(error = %err, key_len = e.api_key.len(), "openai enricher unavailable, enrichment disabled");
                    Arc::new(DisabledEnricher)
                }
            }
        }
    }
}

/// Shared application services; cheap to clone into handlers.
#[derive(Clone)]
pub struct Services {
    pub cfg: Arc<AppConfig>,
    pub db: Database,
    pub cache: NewsCache,
    pub resolver: Arc<TokenResolver>,
    pub orchestrator: Arc<NewsOrchestrator>,
    pub pipeline: PipelineCoordinator,
    pub serve: FastServe,
    pub clock: SharedClock,
}

impl Services {
    /// Open the configured database and build collaborators from configuration.
    pub async fn build(cfg: AppConfig, clock: SharedClock) -> anyhow::Result<Self> {
        let db = Database::connect(&cfg.database_url)
            .await
            .with_context(|| format!("opening database {}", cfg.database_url.split('?').next().unwrap_or_default()))?;
        let collaborators = Collaborators::from_config(&cfg, &clock);
        Ok(Self::assemble(cfg, db, collaborators, clock))
    }

    pub fn assemble(cfg: AppConfig, db: Database, c: Collaborators, clock: SharedClock) -> Self {
        let cache = db.news_cache();
        let resolver = Arc::new(TokenResolver::new(
            db.tokens(),
            c.portfolio.clone(),
            clock.clone(),
            cfg.tokens.alpha.clone(),
            cfg.tokens.opportunity.clone(),
        ));

        let orchestrator = Arc::new(NewsOrchestrator::new(
            cache.clone(),
            c.primary_source(),
            resolver.clone(),
            clock.clone(),
            OrchestratorConfig {
                cache_ttl: chrono::Duration::hours(cfg.cache.ttl_hours),
                fetch_timeout: Duration::from_secs(cfg.cache.fetch_timeout_secs),
            },
        ));

        let ingestor = Arc::new(NewsIngestor::new(
            c.sources.clone(),
            db.articles(),
            resolver.clone(),
            clock.clone(),
        ));
        let analysis = Arc::new(AnalysisPipeline::new(
            db.articles(),
            c.enricher.clone(),
            c.sink.clone(),
            clock.clone(),
            AnalysisConfig {
                rate_limit: RateLimit::from_millis(cfg.analysis.rate_limit_ms),
                failed_rows: cfg.analysis.failed_rows,
            },
        ));

        info!(
            sources = ?ingestor.source_names(),
            enricher = analysis.enricher_name(),
            portfolio = c.portfolio.name(),
            "services assembled"
        );

        Self {
            serve: FastServe::new(db.articles(), clock.clone()),
            pipeline: PipelineCoordinator::new(ingestor, analysis),
            cfg: Arc::new(cfg),
            db,
            cache,
            resolver,
            orchestrator,
            clock,
        }
    }
}
