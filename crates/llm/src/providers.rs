//! LLM provider adapters.
//!
//! Both providers speak the OpenAI chat-completions wire format, so one
//! adapter covers xAI ("grok") and the Baseten-hosted model ("gpt"). The
//! orchestrator only needs short plain-text answers, hence the narrow
//! trait.

use nd_domain::{Error, Result};
use serde_json::Value;

/// A provider that turns a (system, user) prompt pair into plain text.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Short tag identifying this provider in transcripts ("grok", "gpt").
    fn tag(&self) -> &'static str;
}

fn from_reqwest(e: reqwest::Error) -> Error {
    Error::Http(e.to_string())
}

/// Adapter for any OpenAI-compatible chat completions endpoint.
pub struct ChatCompletionsProvider {
    tag: &'static str,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl ChatCompletionsProvider {
    pub fn new(tag: &'static str, base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .map_err(from_reqwest)?;
        Ok(Self {
            tag,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        })
    }

    /// The xAI endpoint, raced first.
    pub fn xai(api_key: &str, model: &str) -> Result<Self> {
        Self::new("grok", "https://api.x.ai/v1", api_key, model)
    }

    /// The Baseten-hosted fallback model.
    pub fn baseten(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        Self::new("gpt", base_url, api_key, model)
    }
}

#[async_trait::async_trait]
impl CompletionProvider for ChatCompletionsProvider {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(Error::Config(format!("{} provider has no API key", self.tag)));
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Http(format!(
                "{} returned {status}: {detail}",
                self.tag
            )));
        }

        let payload: Value = response.json().await.map_err(from_reqwest)?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok(content)
    }

    fn tag(&self) -> &'static str {
        self.tag
    }
}
