// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::env;

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

fn default_timeout_secs() -> u64 {
    20
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentProvider {
    OpenAi,
    /// Offline keyword scoring.
    #[default]
    Lexicon,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default)]
    pub provider: EnrichmentProvider,
    #[serde(default)]
    pub model: Option<String>,
    /// "ENV" means: read from OPENAI_API_KEY.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            provider: EnrichmentProvider::default(),
            model: None,
            api_key: "ENV".to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EnrichmentConfig {
    /// Resolve `"ENV"` and normalise odd values. A missing key is left empty;
    /// startup then falls back to the disabled enricher.
    pub fn sanitize(&mut self) {
        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = env::var(ENV_OPENAI_API_KEY).unwrap_or_default();
        }
        self.api_key = self.api_key.trim().to_string();
        if self.timeout_secs == 0 {
            self.timeout_secs = default_timeout_secs();
        }
        self.model = self.model.take().filter(|m| !m.trim().is_empty());
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }
}
