use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{ChatClient, ChatMessage, ChatRequest, http_client, read_json};
use crate::error::MemeError;

/// Request body for POST /chat/completions
#[derive(Serialize, Debug)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    modalities: &'a [String],
}

/// OpenRouter's OpenAI compatible chat completions API.
#[derive(Clone, Debug)]
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenRouterClient {
    /// Fails when no API key is available.
    pub fn new(api_key: Option<&str>, base_url: &str, timeout: Duration) -> Result<Self, MemeError> {
        let api_key = api_key.map(str::trim).unwrap_or_default();
        if api_key.is_empty() {
            return Err(MemeError::Config(
                "OpenRouter API key not provided. Set OPENROUTER_API_KEY.".to_string(),
            ));
        }
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, request: &ChatRequest) -> Result<Value, MemeError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            "POST {} model={} messages={}",
            url,
            request.model,
            request.messages.len()
        );
        let body = CompletionRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            modalities: &request.modalities,
        };
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        read_json(response, "OpenRouter").await
    }
}

/// Pulls `choices[0].message.content` out as text.
fn first_content(data: &Value) -> String {
    match data.pointer("/choices/0/message/content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl ChatClient for OpenRouterClient {
    async fn chat(&self, request: &ChatRequest) -> Result<String, MemeError> {
        let data = self.post(request).await?;
        Ok(first_content(&data))
    }

    async fn chat_raw(&self, request: &ChatRequest) -> Result<Value, MemeError> {
        let data = self.post(request).await?;
        if !data.is_object() {
            return Err(MemeError::InvalidResponse {
                message: "Unexpected response format from OpenRouter".to_string(),
                summary: format!("top_level={}", json_kind(&data)),
            });
        }
        Ok(data)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
