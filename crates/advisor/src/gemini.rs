use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::domain::ClothingTags;
use tracing::debug;

use crate::{
    prompt::{parse_tags, recommendation_prompt, TAGGING_PROMPT},
    OutfitAdvisor, OutfitRequest,
};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct GeminiAdvisor {
    http: Client,
    config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiAdvisor {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build gemini http client")?;
        Ok(Self { http, config })
    }

    async fn generate(&self, parts: Vec<Part<'_>>) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let body: GenerateResponse = self
            .http
            .post(url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&GenerateRequest {
                contents: vec![Content { parts }],
            })
            .send()
            .await
            .context("gemini request failed")?
            .error_for_status()?
            .json()
            .await?;

        let text: String = body
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            return Err(anyhow!("gemini returned no text"));
        }
        debug!(chars = text.len(), model = %self.config.model, "gemini reply received");
        Ok(text)
    }
}

#[async_trait]
impl OutfitAdvisor for GeminiAdvisor {
    async fn recommend(&self, request: OutfitRequest<'_>) -> Result<String> {
        let prompt = recommendation_prompt(&request);
        self.generate(vec![Part::Text { text: &prompt }]).await
    }

    async fn tag_item(&self, image: &[u8], mime_type: &str) -> Result<ClothingTags> {
        let reply = self
            .generate(vec![
                Part::Text {
                    text: TAGGING_PROMPT,
                },
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type,
                        data: STANDARD.encode(image),
                    },
                },
            ])
            .await?;
        parse_tags(&reply)
    }
}

#[cfg(test)]
#[path = "tests/gemini_tests.rs"]
mod tests;
