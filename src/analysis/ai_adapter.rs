//! OpenAI-backed enricher (Chat Completions, JSON output).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::enricher::{EnrichedFields, Enricher, MarketImpact, Sentiment};
use crate::error::EnrichError;
use crate::store::RawArticle;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const MAX_INPUT_CHARS: usize = 4000;

const SYSTEM_PROMPT: &str = "You classify crypto market news. Reply with a JSON object only: \
{\"sentiment\": \"bullish\"|\"bearish\"|\"neutral\", \"sentiment_score\": number in [-1,1], \
\"market_impact\": \"high\"|\"medium\"|\"low\", \"summary\": one sentence, <=160 ASCII chars}.";

pub struct OpenAiEnricher {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiEnricher {
    pub fn new(api_key: impl Into<String>, model: Option<&str>, timeout: Duration) -> Result<Self, EnrichError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(EnrichError::NotConfigured);
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("alpha-news-cache/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            endpoint: ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: String,
}

#[derive(Deserialize)]
struct Verdict {
    sentiment: String,
    #[serde(default)]
    sentiment_score: Option<f64>,
    market_impact: String,
    #[serde(default)]
    summary: Option<String>,
}

/// Parse the model's JSON verdict into enrichment fields.
pub(crate) fn parse_verdict(content: &str, enriched_by: &str) -> Result<EnrichedFields, EnrichError> {
    // Some models wrap JSON in a fenced block.
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let v: Verdict =
        serde_json::from_str(trimmed).map_err(|e| EnrichError::InvalidResponse(format!("verdict json: {e}")))?;

    let sentiment = Sentiment::parse(&v.sentiment)
        .ok_or_else(|| EnrichError::InvalidResponse(format!("sentiment {:?}", v.sentiment)))?;
    let market_impact = MarketImpact::parse(&v.market_impact)
        .ok_or_else(|| EnrichError::InvalidResponse(format!("market_impact {:?}", v.market_impact)))?;
    let sentiment_score = v
        .sentiment_score
        .filter(|s| s.is_finite())
        .map(|s| s.clamp(-1.0, 1.0))
        .unwrap_or(match sentiment {
            Sentiment::Bullish => 0.5,
            Sentiment::Bearish => -0.5,
            Sentiment::Neutral => 0.0,
        });
    let summary = v.summary.map(|s| sanitize_summary(&s)).filter(|s| !s.is_empty());

    Ok(EnrichedFields {
        sentiment,
        sentiment_score,
        market_impact,
        summary,
        enriched_by: enriched_by.to_string(),
    })
}

#[async_trait]
impl Enricher for OpenAiEnricher {
    async fn enrich(&self, article: &RawArticle) -> Result<EnrichedFields, EnrichError> {
        let input: String = format!("{}\n\n{}", article.title, article.content)
            .chars()
            .take(MAX_INPUT_CHARS)
            .collect();
        if input.trim().is_empty() {
            return Err(EnrichError::EmptyInput);
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: &input,
                },
            ],
            temperature: 0.1,
            max_tokens: 200,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(EnrichError::Status(resp.status().as_u16()));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| EnrichError::InvalidResponse(e.to_string()))?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| EnrichError::InvalidResponse("no choices".into()))?;

        parse_verdict(content, self.name())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Single line, ASCII only, collapsed spaces, at most 160 chars.
pub fn sanitize_summary(input: &str) -> String {
    let mut out = String::with_capacity(160);
    let mut prev_space = false;
    for ch in input.chars() {
        let c = match ch {
            '\r' | '\n' | '\t' => ' ',
            c if c.is_ascii() => c,
            _ => ' ',
        };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
        if out.len() >= 160 {
            break;
        }
    }
    out.trim().to_string()
}
