//! Reqwest-based client for OpenAI-compatible Chat Completions.
//!
//! The pipeline consumes the external generation/fix/annotation services
//! through the [`ChatService`] trait; this module provides the production
//! implementation plus the message model, including multimodal parts for
//! the chart-annotation call.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::Config;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Inline JPEG bytes as a base64 data URL.
    pub fn jpeg(bytes: &[u8]) -> Self {
        let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self::ImageUrl { image_url: ImageUrl { url: format!("data:image/jpeg;base64,{}", b64) } }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: MessageContent::Text(content.into()) }
    }

    pub fn multimodal(role: Role, parts: Vec<ContentPart>) -> Self {
        Self { role, content: MessageContent::Parts(parts) }
    }
}

/// Request/response contract every external text service goes through.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl LlmClient {
    pub fn from_config(cfg: &Config, model_key: &str) -> Result<Self> {
        let timeout = cfg.get_u64("REQUEST_TIMEOUT").unwrap_or(120);
        let api_base_url = cfg.get("API_BASE_URL").unwrap_or_else(|| "default".into());
        let mut base_url = if api_base_url == "default" {
            "https://api.openai.com/v1".to_string()
        } else {
            api_base_url
        };
        let trimmed = base_url.trim_end_matches('/');
        if !trimmed.ends_with("/v1") && !trimmed.contains("/v1/") {
            base_url = format!("{}/v1", trimmed);
        } else {
            base_url = trimmed.to_string();
        }
        let api_key = cfg.get("OPENAI_API_KEY");
        let model = cfg.get(model_key).unwrap_or_else(|| "gpt-4o".into());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;

        Ok(Self { http, base_url, api_key, model, temperature: 0.2 })
    }
}

#[async_trait]
impl ChatService for LlmClient {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            let hv = HeaderValue::from_str(&format!("Bearer {}", key))?;
            headers.insert(AUTHORIZATION, hv);
        }

        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages,
            "stream": false,
        });

        let resp = self
            .http
            .post(url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .context("failed to send chat request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            anyhow::bail!("LLM error {}: {}", status, detail);
        }

        let completion: Completion = resp.json().await.context("malformed completion body")?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.is_empty() {
            anyhow::bail!("empty completion");
        }
        Ok(content)
    }
}

#[derive(Debug, Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multimodal_message_serializes_as_parts() {
        let msg = ChatMessage::multimodal(
            Role::User,
            vec![ContentPart::text("describe"), ContentPart::jpeg(&[0xff, 0xd8])],
        );
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"][0]["type"], "text");
        assert!(v["content"][1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn plain_message_serializes_as_string() {
        let msg = ChatMessage::new(Role::System, "hi");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["content"], "hi");
    }
}
