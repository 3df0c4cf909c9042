//! # Temporal relevance
//! Turns an article's publication time into recency/urgency scores and a
//! breaking / recent / historical bucket.
//!
//! Everything here is a pure function of `(published_at, now)`: no I/O, no
//! hidden state, same inputs give the same scores.
//!
//! - recency decays linearly over 168h, ×1.2 inside 24h
//! - urgency decays linearly over 48h, ×1.5 inside 2h
//! - both are capped at 1.0 and floored at 0.01 so nothing ties at zero

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TemporalError;
use crate::ingest::types::NewsArticle;

pub const RECENCY_HORIZON_HOURS: f64 = 168.0;
pub const URGENCY_HORIZON_HOURS: f64 = 48.0;
pub const BREAKING_MAX_HOURS: f64 = 2.0;
pub const RECENT_MAX_HOURS: f64 = 24.0;
pub const SCORE_FLOOR: f64 = 0.01;
/// Widest look-back window accepted from callers (one year).
pub const MAX_HOURS_BACK: u32 = 24 * 365;

const RECENT_BOOST: f64 = 1.2;
const BREAKING_BOOST: f64 = 1.5;
const BREAKING_SORT_BONUS: f64 = 1.2;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeCategory {
    Breaking,
    Recent,
    Historical,
}

impl TimeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeCategory::Breaking => "breaking",
            TimeCategory::Recent => "recent",
            TimeCategory::Historical => "historical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalScore {
    pub hours_ago: f64,
    pub days_ago: f64,
    pub recency_score: f64,
    pub urgency_score: f64,
    pub is_breaking: bool,
    pub is_recent: bool,
    pub is_historical: bool,
    pub time_category: TimeCategory,
}

/// Parse a provider timestamp into UTC.
///
/// Accepts RFC 3339 (offset normalized to UTC), naive ISO-8601 (read as UTC),
/// bare dates and RFC 2822.
pub fn parse_published_at(raw: &str) -> Result<DateTime<Utc>, TemporalError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(TemporalError::Parse(raw.to_string()));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = d.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    Err(TemporalError::Parse(raw.to_string()))
}

/// Score a publication time relative to `now`.
///
/// Timestamps in the future (clock skew between providers) count as 0h old.
pub fn score(published_at: DateTime<Utc>, now: DateTime<Utc>) -> TemporalScore {
    let elapsed_ms = (now - published_at).num_milliseconds() as f64;
    let hours_ago = (elapsed_ms / 3_600_000.0).max(0.0);

    let is_breaking = hours_ago <= BREAKING_MAX_HOURS;
    let is_recent = hours_ago <= RECENT_MAX_HOURS;
    let is_historical = hours_ago > RECENCY_HORIZON_HOURS;

    let mut recency = (1.0 - hours_ago / RECENCY_HORIZON_HOURS).max(SCORE_FLOOR);
    if is_recent {
        recency *= RECENT_BOOST;
    }
    let mut urgency = (1.0 - hours_ago / URGENCY_HORIZON_HOURS).max(SCORE_FLOOR);
    if is_breaking {
        urgency *= BREAKING_BOOST;
    }

    // Everything older than a day that is not flagged recent falls to the
    // lowest bucket so the category stays total.
    let time_category = if is_breaking {
        TimeCategory::Breaking
    } else if is_recent {
        TimeCategory::Recent
    } else {
        TimeCategory::Historical
    };

    TemporalScore {
        hours_ago,
        days_ago: hours_ago / 24.0,
        recency_score: recency.clamp(SCORE_FLOOR, 1.0),
        urgency_score: urgency.clamp(SCORE_FLOOR, 1.0),
        is_breaking,
        is_recent,
        is_historical,
        time_category,
    }
}

/// Parse + score in one step.
pub fn score_str(published_at: &str, now: DateTime<Utc>) -> Result<TemporalScore, TemporalError> {
    parse_published_at(published_at).map(|t| score(t, now))
}

/// Start of a `hours_back` window ending at `now`.
///
/// Saturates at the earliest representable instant instead of overflowing.
pub fn window_start(now: DateTime<Utc>, hours_back: u32) -> DateTime<Utc> {
    now.checked_sub_signed(chrono::Duration::hours(i64::from(hours_back)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Fill the temporal fields of `article` in place.
///
/// Returns `false` (article untouched) when `published_at` is absent or
/// unparsable; such articles have unknown recency.
pub fn enhance_in_place(article: &mut NewsArticle, now: DateTime<Utc>) -> bool {
    let Some(raw) = article.published_at.as_deref() else {
        return false;
    };
    match score_str(raw, now) {
        Ok(s) => {
            article.temporal = Some(s);
            true
        }
        Err(e) => {
            tracing::debug!(target: "temporal", error = %e, url = %article.url, "unknown recency");
            false
        }
    }
}

/// Copy of `article` with temporal fields added (unchanged if not scorable).
pub fn enhance(article: &NewsArticle, now: DateTime<Utc>) -> NewsArticle {
    let mut out = article.clone();
    enhance_in_place(&mut out, now);
    out
}

fn temporal_of(article: &NewsArticle, now: DateTime<Utc>) -> Option<TemporalScore> {
    article.temporal.or_else(|| {
        article
            .published_at
            .as_deref()
            .and_then(|raw| score_str(raw, now).ok())
    })
}

/// Keep articles with `recency_score >= min_recency_score` and, when given,
/// `hours_ago <= max_hours_ago`. Order is preserved; unknown recency is dropped.
pub fn filter_by_relevance(
    articles: Vec<NewsArticle>,
    min_recency_score: f64,
    max_hours_ago: Option<f64>,
    now: DateTime<Utc>,
) -> Vec<NewsArticle> {
    articles
        .into_iter()
        .filter_map(|mut a| {
            let t = temporal_of(&a, now)?;
            a.temporal = Some(t);
            let fresh_enough = max_hours_ago.map_or(true, |max| t.hours_ago <= max);
            (t.recency_score >= min_recency_score && fresh_enough).then_some(a)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceWeights {
    pub recency: f64,
    pub urgency: f64,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            recency: 0.4,
            urgency: 0.6,
        }
    }
}

/// Weighted temporal relevance of a single score, including the breaking bonus.
pub fn weighted_relevance(t: &TemporalScore, weights: RelevanceWeights) -> f64 {
    let base = t.recency_score * weights.recency + t.urgency_score * weights.urgency;
    if t.is_breaking {
        base * BREAKING_SORT_BONUS
    } else {
        base
    }
}

/// Sort descending by weighted temporal relevance.
///
/// Every article gets `temporal_relevance_score` written in place (0.0 for
/// unknown recency). The sort is stable, so equal scores keep input order.
pub fn sort_by_relevance(articles: &mut [NewsArticle], weights: RelevanceWeights, now: DateTime<Utc>) {
    for a in articles.iter_mut() {
        let t = temporal_of(a, now);
        a.temporal = t;
        a.temporal_relevance_score = Some(t.map(|t| weighted_relevance(&t, weights)).unwrap_or(0.0));
    }
    articles.sort_by(|a, b| {
        let sa = a.temporal_relevance_score.unwrap_or(0.0);
        let sb = b.temporal_relevance_score.unwrap_or(0.0);
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TemporalSummary {
    pub total: usize,
    pub breaking: usize,
    pub recent: usize,
    pub historical: usize,
    pub avg_recency: f64,
    pub avg_urgency: f64,
}

/// Aggregate bucket counts and average scores. Empty input yields zeros.
///
/// `recent` counts articles whose bucket is `recent` (breaking excluded).
pub fn summarize(articles: &[NewsArticle], now: DateTime<Utc>) -> TemporalSummary {
    let mut out = TemporalSummary {
        total: articles.len(),
        ..Default::default()
    };
    let mut scored = 0usize;
    let (mut sum_r, mut sum_u) = (0.0, 0.0);

    for t in articles.iter().filter_map(|a| temporal_of(a, now)) {
        scored += 1;
        sum_r += t.recency_score;
        sum_u += t.urgency_score;
        match t.time_category {
            TimeCategory::Breaking => out.breaking += 1,
            TimeCategory::Recent => out.recent += 1,
            TimeCategory::Historical => out.historical += 1,
        }
    }

    if scored > 0 {
        out.avg_recency = sum_r / scored as f64;
        out.avg_urgency = sum_u / scored as f64;
    }
    out
}
