use async_trait::async_trait;
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::{OffsetDateTime, UtcOffset};

use super::status_error;
use crate::clock::SharedClock;
use crate::error::FetchError;
use crate::ingest::normalize_text;
use crate::ingest::types::{NewsArticle, NewsSource};
use crate::metrics::RSS_PARSE_MS;
use crate::temporal;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// RFC 2822 `pubDate` → RFC 3339 UTC string; `None` when unparsable.
fn rfc2822_to_rfc3339(ts: &str) -> Option<String> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC))
        .and_then(|dt| dt.format(&Rfc3339).ok())
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

/// Generic crypto RSS feed. Items are kept when their title or description
/// mentions one of the search terms and they fall inside `hours_back`.
pub struct RssSource {
    name: String,
    mode: Mode,
    clock: SharedClock,
}

impl RssSource {
    pub fn from_fixture(name: impl Into<String>, xml: impl Into<String>, clock: SharedClock) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(xml.into()),
            clock,
        }
    }

    pub fn from_url(
        name: impl Into<String>,
        url: impl Into<String>,
        timeout: std::time::Duration,
        clock: SharedClock,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                client: super::http_client(timeout)?,
            },
            clock,
        })
    }

    fn parse_items(&self, xml: &str) -> Result<Vec<NewsArticle>, FetchError> {
        let t0 = std::time::Instant::now();
        let rss: Rss = from_str(&scrub_html_entities_for_xml(xml))
            .map_err(|e| FetchError::Parse(format!("{} rss: {e}", self.name)))?;

        let out = rss
            .channel
            .item
            .into_iter()
            .filter_map(|it| {
                let url = it.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty())?;
                Some(NewsArticle {
                    title: normalize_text(it.title.as_deref().unwrap_or_default()),
                    content: normalize_text(it.description.as_deref().unwrap_or_default()),
                    url,
                    source_name: self.name.clone(),
                    published_at: it.pub_date.as_deref().and_then(rfc2822_to_rfc3339),
                    raw: serde_json::json!({ "provider": "rss", "feed": self.name }),
                    ..Default::default()
                })
            })
            .collect();

        histogram!(RSS_PARSE_MS).record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }

    fn select(&self, items: Vec<NewsArticle>, search_terms: &[String], hours_back: u32) -> Vec<NewsArticle> {
        let cutoff = temporal::window_start(self.clock.now(), hours_back);
        let terms: Vec<String> = search_terms
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        items
            .into_iter()
            .filter(|a| {
                let text = format!("{} {}", a.title, a.content);
                terms.iter().any(|t| mentions(&text, t))
            })
            .filter(|a| {
                // Undated items are kept; the temporal scorer treats them as unknown recency.
                match a.published_at.as_deref().map(temporal::parse_published_at) {
                    Some(Ok(ts)) => ts > cutoff,
                    _ => true,
                }
            })
            .collect()
    }
}

/// Whole-word, case-insensitive match; multi-word terms match as a phrase.
fn mentions(text: &str, term_lower: &str) -> bool {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();
    let needle: Vec<&str> = term_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    if needle.is_empty() {
        return false;
    }
    words
        .windows(needle.len())
        .any(|w| w.iter().zip(&needle).all(|(a, b)| a == b))
}

#[async_trait]
impl NewsSource for RssSource {
    async fn fetch(&self, search_terms: &[String], hours_back: u32) -> Result<Vec<NewsArticle>, FetchError> {
        let items = match &self.mode {
            Mode::Fixture(s) => self.parse_items(s)?,
            Mode::Http { url, client } => {
                let resp = client.get(url).send().await?;
                if !resp.status().is_success() {
                    return Err(status_error(&self.name, resp.status()));
                }
                let body = resp.text().await?;
                self.parse_items(&body)?
            }
        };
        Ok(self.select(items, search_terms, hours_back))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// quick-xml only knows the five XML entities.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pub_date_converts_to_utc_rfc3339() {
        assert_eq!(
            rfc2822_to_rfc3339("Mon, 15 Jan 2024 13:00:00 +0100").as_deref(),
            Some("2024-01-15T12:00:00Z")
        );
        assert_eq!(rfc2822_to_rfc3339("last tuesday"), None);
    }

    #[test]
    fn mentions_is_whole_word() {
        assert!(mentions("Solana (SOL) climbs", "sol"));
        assert!(!mentions("a new solution", "sol"));
        assert!(mentions("Binance Coin listed", "binance coin"));
    }
}
