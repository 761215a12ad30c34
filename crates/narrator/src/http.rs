//! HTTP narrator speaking the OpenAI-compatible chat-completions
//! protocol, which local model servers also expose.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use meditriage_common::{MeditriageError, ObservationSet, Result};

use crate::Narrator;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpNarratorConfig {
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

pub struct HttpNarrator {
    config: HttpNarratorConfig,
    client: reqwest::Client,
}

impl HttpNarrator {
    pub fn new(config: HttpNarratorConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Narrator for HttpNarrator {
    async fn synthesize(
        &self,
        system: &str,
        user: &str,
        observations: &ObservationSet,
    ) -> Result<String> {
        let evidence = serde_json::to_string_pretty(observations)?;
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("{user}\n\nOBSERVATIONS:\n{evidence}"),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!(endpoint = %self.config.endpoint, model = %self.config.model, "requesting synthesis");

        let mut builder = self.client.post(&self.config.endpoint).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| MeditriageError::Synthesis(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(MeditriageError::Synthesis(format!(
                "endpoint returned {status}: {excerpt}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| MeditriageError::Synthesis(format!("invalid response body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| MeditriageError::Synthesis("endpoint returned no choices".to_string()))
    }
}
