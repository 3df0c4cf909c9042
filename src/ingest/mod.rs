// src/ingest/mod.rs
//! Phase 1 of the pipeline: collect articles for every tracked symbol from
//! every configured source and land them in `raw_articles`, deduplicated by URL.

pub mod providers;
pub mod scheduler;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::ingest::types::{NewsArticle, NewsSource};
use crate::metrics::{ensure_metrics_described, FETCH_ERRORS, INGEST_DUPLICATES, INGEST_NEW, PIPELINE_LAST_RUN_TS};
use crate::store::{ArticleStore, NewRawArticle};
use crate::tokens::TokenResolver;

pub const MAX_TEXT_CHARS: usize = 1500;

/// Normalize article text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("static regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // “ ” « » ‘ ’ → ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("static regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }
    out
}

fn normalize_article(mut a: NewsArticle) -> Option<NewsArticle> {
    a.url = a.url.trim().to_string();
    a.title = normalize_text(&a.title);
    a.content = normalize_text(&a.content);
    if a.url.is_empty() || a.title.is_empty() {
        return None;
    }
    Some(a)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// New rows per source name.
    pub by_source: BTreeMap<String, usize>,
    pub total_new: usize,
    pub duplicates: usize,
    pub errors: usize,
}

pub struct NewsIngestor {
    sources: Vec<Arc<dyn NewsSource>>,
    articles: ArticleStore,
    resolver: Arc<TokenResolver>,
    clock: SharedClock,
}

impl NewsIngestor {
    pub fn new(
        sources: Vec<Arc<dyn NewsSource>>,
        articles: ArticleStore,
        resolver: Arc<TokenResolver>,
        clock: SharedClock,
    ) -> Self {
        ensure_metrics_described();
        Self {
            sources,
            articles,
            resolver,
            clock,
        }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// One pass over tracked symbols × sources. Source and store failures are
    /// counted in `errors` and never abort the pass.
    pub async fn ingest(&self, hours_back: u32) -> IngestReport {
        let mut report = IngestReport::default();
        for s in &self.sources {
            report.by_source.insert(s.name().to_string(), 0);
        }

        let tokens = self.resolver.tracked_symbols().await;
        for token in &tokens {
            for source in &self.sources {
                let fetched = match source.fetch(&token.search_terms, hours_back).await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(target: "ingest", error = ?e, provider = source.name(), symbol = %token.symbol, "provider error");
                        counter!(FETCH_ERRORS).increment(1);
                        report.errors += 1;
                        continue;
                    }
                };

                let collected_at = self.clock.now();
                for article in fetched.into_iter().filter_map(normalize_article) {
                    let row = NewRawArticle::from_article(&article, source.name(), &token.symbol, collected_at);
                    match self.articles.insert_if_new(&row).await {
                        Ok(true) => {
                            report.total_new += 1;
                            *report.by_source.entry(source.name().to_string()).or_default() += 1;
                        }
                        Ok(false) => report.duplicates += 1,
                        Err(e) => {
                            warn!(target: "ingest", error = ?e, provider = source.name(), "insert failed");
                            report.errors += 1;
                        }
                    }
                }
                debug!(target: "ingest", provider = source.name(), symbol = %token.symbol, "source done");
            }
        }

        counter!(INGEST_NEW).increment(report.total_new as u64);
        counter!(INGEST_DUPLICATES).increment(report.duplicates as u64);
        gauge!(PIPELINE_LAST_RUN_TS, "job" => "ingest").set(self.clock.now().timestamp() as f64);

        info!(
            target: "ingest",
            symbols = tokens.len(),
            total_new = report.total_new,
            duplicates = report.duplicates,
            errors = report.errors,
            "ingest pass finished"
        );
        report
    }
}
