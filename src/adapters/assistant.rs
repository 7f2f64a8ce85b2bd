use crate::config::toml_config::AssistantConfig;
use crate::domain::model::ChatMessage;
use crate::domain::ports::{ChatBackend, RelayBackend};
use crate::utils::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Default, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

/// A local Ollama model behind its `/api/chat` endpoint.
pub struct OllamaClient {
    client: Client,
    url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &AssistantConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            url: config.ollama_url.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<Option<String>> {
        let body = OllamaRequest {
            model: &self.model,
            messages,
            stream: false,
        };
        let response = self.client.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            tracing::warn!("Ollama returned {}", response.status());
            return Ok(None);
        }

        let reply: OllamaResponse = response.json().await?;
        Ok(reply
            .message
            .map(|m| m.content)
            .filter(|content| !content.is_empty()))
    }
}

/// The OpenClaw agent's local web-chat endpoint.
pub struct OpenClawRelay {
    client: Client,
    url: String,
}

impl OpenClawRelay {
    pub fn new(config: &AssistantConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.relay_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            url: config.relay_url.clone(),
        })
    }
}

#[async_trait]
impl RelayBackend for OpenClawRelay {
    async fn ask(&self, message: &str) -> Result<String> {
        let body = serde_json::json!({ "message": message, "channel": "webchat" });
        let text = self.client.post(&self.url).json(&body).send().await?.text().await?;

        // A non-JSON reply means the relay is not the agent we expect.
        let parsed: Value = serde_json::from_str(&text)?;
        match parsed.get("response").and_then(Value::as_str) {
            Some(answer) if !answer.is_empty() => Ok(answer.to_string()),
            _ => Ok(text),
        }
    }
}
